//! Process-group topology.
//!
//! Ranks are split twice: first into node-local groups via the substrate's
//! shared-resource primitive, then into the work group — the ranks whose
//! node-local rank falls below the configured per-node cap. Only work-group
//! members perform I/O and compression; everyone else idles after setup.
//!
//! The assignment rule itself is a pure function ([`derive_assignments`])
//! over a rank→node mapping, testable without any multi-process runtime;
//! [`Topology::derive`] applies the same rule through a live [`Collective`].

use crate::error::SetupError;
use roibench_comm::{Collective, ReduceOp};
use tracing::info;

/// Identity of one process within the run. Immutable after topology setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRank {
    pub global_rank: usize,
    pub global_size: usize,
    /// Node identifier: the global rank of the node's first member.
    pub node_id: usize,
    pub node_local_rank: usize,
    pub node_local_size: usize,
    /// Rank within the work group, `None` for non-members.
    pub work_rank: Option<usize>,
}

/// The work group's communicator handle.
pub struct WorkGroup {
    comm: Box<dyn Collective>,
}

impl WorkGroup {
    pub fn new(comm: Box<dyn Collective>) -> Self {
        WorkGroup { comm }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn comm(&self) -> &dyn Collective {
        self.comm.as_ref()
    }
}

/// Topology of one process, built once at startup.
pub struct Topology {
    pub identity: ProcessRank,
    /// The resolved per-node cap (a configured 0 becomes the node size).
    pub workers_per_node: usize,
    /// Present only on work-group members.
    pub work: Option<WorkGroup>,
}

impl Topology {
    /// Derive this process's groups from a live collective substrate.
    ///
    /// `workers_per_node == 0` resolves to "every rank on the node".
    /// Collective: every rank of `world` must call this at startup.
    pub fn derive(world: &dyn Collective, workers_per_node: usize) -> Result<Self, SetupError> {
        let node = world.split_shared(world.rank())?;
        let node_id = node.allreduce_u64(world.rank() as u64, ReduceOp::Min)? as usize;

        let resolved = if workers_per_node == 0 {
            node.size()
        } else {
            workers_per_node
        };
        let member = node.rank() < resolved;

        // Both colors produce a communicator; non-members drop theirs.
        let group = world.split(u32::from(member), world.rank())?;
        let work_rank = member.then(|| group.rank());

        let identity = ProcessRank {
            global_rank: world.rank(),
            global_size: world.size(),
            node_id,
            node_local_rank: node.rank(),
            node_local_size: node.size(),
            work_rank,
        };
        info!(
            global_rank = identity.global_rank,
            node_id = identity.node_id,
            node_local_rank = identity.node_local_rank,
            work_rank = ?identity.work_rank,
            workers_per_node = resolved,
            "topology derived"
        );

        Ok(Topology {
            identity,
            workers_per_node: resolved,
            work: member.then(|| WorkGroup::new(group)),
        })
    }

    pub fn is_worker(&self) -> bool {
        self.work.is_some()
    }
}

/// One rank's place in the two-stage split, as computed by
/// [`derive_assignments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankAssignment {
    pub global_rank: usize,
    pub node_id: usize,
    pub node_local_rank: usize,
    pub work_rank: Option<usize>,
}

/// Pure two-stage partition over a rank→node mapping.
///
/// Node-local ranks are dense per node in global-rank order; work ranks go
/// to exactly the ranks with node-local rank below the cap, again in
/// global-rank order. The same rule [`Topology::derive`] realizes through
/// the substrate's split primitives.
pub fn derive_assignments(node_of: &[usize], workers_per_node: usize) -> Vec<RankAssignment> {
    // Stage one: node-local ranks.
    let mut node_fill: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    let mut node_size: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    for &node in node_of {
        *node_size.entry(node).or_default() += 1;
    }

    let mut assignments: Vec<RankAssignment> = node_of
        .iter()
        .enumerate()
        .map(|(global_rank, &node)| {
            let slot = node_fill.entry(node).or_default();
            let node_local_rank = *slot;
            *slot += 1;
            RankAssignment {
                global_rank,
                node_id: node,
                node_local_rank,
                work_rank: None,
            }
        })
        .collect();

    // Stage two: the capped work group, ordered by global rank.
    let mut next_work_rank = 0;
    for a in &mut assignments {
        let cap = if workers_per_node == 0 {
            node_size[&a.node_id]
        } else {
            workers_per_node
        };
        if a.node_local_rank < cap {
            a.work_rank = Some(next_work_rank);
            next_work_rank += 1;
        }
    }
    assignments
}
