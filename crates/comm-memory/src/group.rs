//! Generation-counted in-process collectives.

use roibench_comm::{Collective, CommError, ReduceOp};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use tracing::trace;

/// Universe-wide state shared by every group spawned from one
/// [`MemoryUniverse`]. Abort is universe-wide, like the real substrate's
/// world abort.
struct UniverseState {
    aborted: Mutex<Option<i32>>,
    /// Groups whose waiters must be woken on abort.
    groups: Mutex<Vec<Weak<GroupState>>>,
}

impl UniverseState {
    fn aborted(&self) -> Option<i32> {
        *self.aborted.lock().unwrap()
    }

    fn register(&self, group: &Arc<GroupState>) {
        self.groups.lock().unwrap().push(Arc::downgrade(group));
    }

    fn abort(&self, code: i32) {
        {
            let mut aborted = self.aborted.lock().unwrap();
            if aborted.is_some() {
                return;
            }
            *aborted = Some(code);
        }
        // Snapshot the registry first: holding the registry lock while
        // taking group locks would invert the order split uses.
        let groups: Vec<Weak<GroupState>> = self.groups.lock().unwrap().clone();
        for group in groups {
            if let Some(group) = group.upgrade() {
                // Take the group lock so no waiter can miss the wakeup
                // between its abort check and its wait.
                let _inner = group.inner.lock().unwrap();
                group.cv.notify_all();
            }
        }
    }
}

/// Result of a completed split, kept until the participants pick it up.
struct SplitResult {
    /// old rank -> (subgroup state, new rank, subgroup node map)
    members: HashMap<usize, (Arc<GroupState>, usize, Arc<Vec<usize>>)>,
}

#[derive(Default)]
struct Inner {
    barrier_generation: u64,
    barrier_count: usize,

    reduce_generation: u64,
    reduce_count: usize,
    reduce_acc: u64,
    reduce_op: Option<ReduceOp>,
    reduce_root: Option<usize>,
    reduce_result: u64,

    split_generation: u64,
    split_count: usize,
    /// (old rank, color, key) deposits for the in-flight split.
    split_deposits: Vec<(usize, u32, usize)>,
    split_result: Option<Arc<SplitResult>>,
}

struct GroupState {
    size: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
}

/// Factory for an in-process SPMD group.
///
/// ```ignore
/// let (universe, ranks) = MemoryUniverse::new(4);
/// // hand each MemoryCollective to one rank thread
/// ```
pub struct MemoryUniverse {
    state: Arc<UniverseState>,
}

impl MemoryUniverse {
    /// A universe of `size` participants all co-located on one node.
    pub fn new(size: usize) -> (Self, Vec<MemoryCollective>) {
        Self::with_nodes(vec![0; size])
    }

    /// A universe with an explicit rank -> node assignment, so
    /// `split_shared` can exercise multi-node topologies in one process.
    pub fn with_nodes(node_of: Vec<usize>) -> (Self, Vec<MemoryCollective>) {
        let size = node_of.len();
        assert!(size > 0, "universe must have at least one participant");
        let state = Arc::new(UniverseState {
            aborted: Mutex::new(None),
            groups: Mutex::new(Vec::new()),
        });
        let group = Arc::new(GroupState {
            size,
            inner: Mutex::new(Inner::default()),
            cv: Condvar::new(),
        });
        state.register(&group);
        let node_of = Arc::new(node_of);
        let ranks = (0..size)
            .map(|rank| MemoryCollective {
                universe: Arc::clone(&state),
                group: Arc::clone(&group),
                rank,
                node_of: Arc::clone(&node_of),
            })
            .collect();
        (MemoryUniverse { state }, ranks)
    }

    /// The abort code, if any participant aborted.
    pub fn aborted(&self) -> Option<i32> {
        self.state.aborted()
    }
}

/// One participant's handle onto an in-process group.
pub struct MemoryCollective {
    universe: Arc<UniverseState>,
    group: Arc<GroupState>,
    rank: usize,
    /// Node id per rank of this group, indexed by group rank.
    node_of: Arc<Vec<usize>>,
}

impl MemoryCollective {
    /// The abort code, if the universe was aborted.
    pub fn aborted(&self) -> Option<i32> {
        self.universe.aborted()
    }

    fn check_abort(&self) -> Result<(), CommError> {
        match self.universe.aborted() {
            Some(code) => Err(CommError::Aborted { code }),
            None => Ok(()),
        }
    }

    /// Shared reduction path. `root_tag` is the root rank for a rooted
    /// reduce or `usize::MAX` for an allreduce; it doubles as the symmetry
    /// check between participants.
    fn reduce_inner(&self, value: u64, op: ReduceOp, root_tag: usize) -> Result<u64, CommError> {
        self.check_abort()?;
        let mut inner = self.group.inner.lock().unwrap();
        let generation = inner.reduce_generation;

        // A collective call must be issued with identical arguments by
        // every member.
        if inner.reduce_count == 0 {
            inner.reduce_op = Some(op);
            inner.reduce_root = Some(root_tag);
            inner.reduce_acc = value;
        } else {
            if inner.reduce_op != Some(op) || inner.reduce_root != Some(root_tag) {
                return Err(CommError::Substrate(format!(
                    "mismatched reduce arguments from rank {}",
                    self.rank
                )));
            }
            inner.reduce_acc = op.apply(inner.reduce_acc, value);
        }
        inner.reduce_count += 1;

        if inner.reduce_count == self.group.size {
            inner.reduce_result = inner.reduce_acc;
            inner.reduce_count = 0;
            inner.reduce_op = None;
            inner.reduce_root = None;
            inner.reduce_generation += 1;
            self.group.cv.notify_all();
        } else {
            while inner.reduce_generation == generation {
                if let Some(code) = self.universe.aborted() {
                    return Err(CommError::Aborted { code });
                }
                inner = self.group.cv.wait(inner).unwrap();
            }
        }

        Ok(inner.reduce_result)
    }

    fn split_inner(&self, color: u32, key: usize) -> Result<Box<dyn Collective>, CommError> {
        self.check_abort()?;
        let mut inner = self.group.inner.lock().unwrap();
        let generation = inner.split_generation;
        inner.split_deposits.push((self.rank, color, key));
        inner.split_count += 1;

        if inner.split_count == self.group.size {
            // Last arrival builds every subgroup and publishes the result.
            let mut by_color: HashMap<u32, Vec<(usize, usize)>> = HashMap::new();
            for &(rank, c, k) in &inner.split_deposits {
                by_color.entry(c).or_default().push((k, rank));
            }
            let mut members = HashMap::new();
            for (_, mut ranked) in by_color {
                ranked.sort_unstable();
                let state = Arc::new(GroupState {
                    size: ranked.len(),
                    inner: Mutex::new(Inner::default()),
                    cv: Condvar::new(),
                });
                self.universe.register(&state);
                let nodes: Arc<Vec<usize>> = Arc::new(
                    ranked
                        .iter()
                        .map(|&(_, old_rank)| self.node_of[old_rank])
                        .collect(),
                );
                for (new_rank, &(_, old_rank)) in ranked.iter().enumerate() {
                    members.insert(old_rank, (Arc::clone(&state), new_rank, Arc::clone(&nodes)));
                }
            }
            inner.split_result = Some(Arc::new(SplitResult { members }));
            inner.split_deposits.clear();
            inner.split_count = 0;
            inner.split_generation += 1;
            self.group.cv.notify_all();
        } else {
            while inner.split_generation == generation {
                if let Some(code) = self.universe.aborted() {
                    return Err(CommError::Aborted { code });
                }
                inner = self.group.cv.wait(inner).unwrap();
            }
        }

        let result = inner
            .split_result
            .as_ref()
            .expect("split result published by last arrival")
            .clone();
        drop(inner);

        let (state, new_rank, nodes) = result
            .members
            .get(&self.rank)
            .expect("every depositor has a subgroup entry")
            .clone();
        trace!(old_rank = self.rank, new_rank, color, "split complete");
        Ok(Box::new(MemoryCollective {
            universe: Arc::clone(&self.universe),
            group: state,
            rank: new_rank,
            node_of: nodes,
        }))
    }
}

impl Collective for MemoryCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.check_abort()?;
        let mut inner = self.group.inner.lock().unwrap();
        let generation = inner.barrier_generation;
        inner.barrier_count += 1;
        if inner.barrier_count == self.group.size {
            inner.barrier_count = 0;
            inner.barrier_generation += 1;
            self.group.cv.notify_all();
            return Ok(());
        }
        while inner.barrier_generation == generation {
            if let Some(code) = self.universe.aborted() {
                return Err(CommError::Aborted { code });
            }
            inner = self.group.cv.wait(inner).unwrap();
        }
        Ok(())
    }

    fn reduce_u64(&self, value: u64, op: ReduceOp, root: usize) -> Result<Option<u64>, CommError> {
        let result = self.reduce_inner(value, op, root)?;
        if self.rank == root {
            Ok(Some(result))
        } else {
            Ok(None)
        }
    }

    fn allreduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, CommError> {
        self.reduce_inner(value, op, usize::MAX)
    }

    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Collective>, CommError> {
        self.split_inner(color, key)
    }

    fn split_shared(&self, key: usize) -> Result<Box<dyn Collective>, CommError> {
        let node = self.node_of[self.rank] as u32;
        self.split_inner(node, key)
    }

    fn abort(&self, code: i32) {
        trace!(rank = self.rank, code, "abort requested");
        self.universe.abort(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Run `f` on every rank of a fresh universe, collecting results.
    fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(MemoryCollective) -> R + Send + Sync + 'static,
    {
        let (_, ranks) = MemoryUniverse::new(size);
        let f = Arc::new(f);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(c))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn reduce_sum_reaches_root_only() {
        let results = run_ranks(4, |c| c.reduce_u64(c.rank() as u64 + 1, ReduceOp::Sum, 0));
        let mut some = 0;
        for (rank, r) in results.into_iter().enumerate() {
            match r.unwrap() {
                Some(total) => {
                    assert_eq!(rank, 0);
                    assert_eq!(total, 1 + 2 + 3 + 4);
                    some += 1;
                }
                None => assert_ne!(rank, 0),
            }
        }
        assert_eq!(some, 1);
    }

    #[test]
    fn reduce_max_captures_straggler() {
        let results = run_ranks(3, |c| {
            let value = [7u64, 42, 3][c.rank()];
            c.reduce_u64(value, ReduceOp::Max, 1)
        });
        assert_eq!(results[1], Ok(Some(42)));
    }

    #[test]
    fn allreduce_is_visible_everywhere() {
        let results = run_ranks(3, |c| {
            let min = c.allreduce_u64(c.rank() as u64 + 10, ReduceOp::Min).unwrap();
            let sum = c.allreduce_u64(c.rank() as u64, ReduceOp::Sum).unwrap();
            (min, sum)
        });
        for r in results {
            assert_eq!(r, (10, 3));
        }
    }

    #[test]
    fn consecutive_reductions_do_not_bleed() {
        let results = run_ranks(2, |c| {
            let first = c.reduce_u64(10, ReduceOp::Sum, 0).unwrap();
            let second = c.reduce_u64(1, ReduceOp::Sum, 0).unwrap();
            (first, second)
        });
        assert_eq!(results[0], (Some(20), Some(2)));
        assert_eq!(results[1], (None, None));
    }

    #[test]
    fn barrier_releases_all() {
        let results = run_ranks(4, |c| c.barrier());
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[test]
    fn abort_unblocks_barrier_waiters() {
        let results = run_ranks(3, |c| {
            if c.rank() == 2 {
                c.abort(9);
                Ok(())
            } else {
                c.barrier()
            }
        });
        for (rank, r) in results.into_iter().enumerate() {
            if rank != 2 {
                assert_eq!(r, Err(CommError::Aborted { code: 9 }));
            }
        }
    }

    #[test]
    fn abort_fails_subsequent_collectives() {
        let (universe, ranks) = MemoryUniverse::new(1);
        let c = ranks.into_iter().next().unwrap();
        c.abort(3);
        assert_eq!(universe.aborted(), Some(3));
        assert_eq!(c.barrier(), Err(CommError::Aborted { code: 3 }));
        assert_eq!(
            c.reduce_u64(1, ReduceOp::Sum, 0),
            Err(CommError::Aborted { code: 3 })
        );
    }

    #[test]
    fn first_abort_code_wins() {
        let (universe, ranks) = MemoryUniverse::new(1);
        let c = ranks.into_iter().next().unwrap();
        c.abort(5);
        c.abort(6);
        assert_eq!(universe.aborted(), Some(5));
    }

    #[test]
    fn split_groups_by_color_ordered_by_key() {
        let results = run_ranks(4, |c| {
            let color = (c.rank() % 2) as u32;
            let sub = c.split(color, c.rank()).unwrap();
            (c.rank(), sub.rank(), sub.size())
        });
        // Ranks 0,2 -> color 0; ranks 1,3 -> color 1; key order preserves
        // world order within each subgroup.
        for (world, sub_rank, sub_size) in results {
            assert_eq!(sub_size, 2);
            assert_eq!(sub_rank, world / 2);
        }
    }

    #[test]
    fn split_shared_follows_node_assignment() {
        let (_, ranks) = MemoryUniverse::with_nodes(vec![0, 0, 1, 1, 1]);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let node = c.split_shared(c.rank()).unwrap();
                    (c.rank(), node.rank(), node.size())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (world, node_rank, node_size) in results {
            if world < 2 {
                assert_eq!(node_size, 2);
                assert_eq!(node_rank, world);
            } else {
                assert_eq!(node_size, 3);
                assert_eq!(node_rank, world - 2);
            }
        }
    }

    #[test]
    fn subgroup_collectives_are_independent() {
        let results = run_ranks(4, |c| {
            let sub = c.split((c.rank() % 2) as u32, c.rank()).unwrap();
            sub.reduce_u64(c.rank() as u64, ReduceOp::Sum, 0).unwrap()
        });
        // color 0 = ranks {0, 2} -> sum 2 at sub-rank 0 (world rank 0)
        // color 1 = ranks {1, 3} -> sum 4 at sub-rank 0 (world rank 1)
        assert_eq!(results[0], Some(2));
        assert_eq!(results[1], Some(4));
        assert_eq!(results[2], None);
        assert_eq!(results[3], None);
    }
}
