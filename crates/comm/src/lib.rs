//! Collective communication interface.
//!
//! Defines the [`Collective`] trait implemented by both the real MPI
//! substrate (`roibench-comm-mpi`) and the in-process backend
//! (`roibench-comm-memory`).
//!
//! The engine is SPMD: a fixed set of cooperating single-threaded
//! participants, each holding one `Collective` handle for every group it
//! belongs to. All cross-participant synchronization goes through explicit
//! collective calls — barrier, reduce, and the coordinated abort that keeps
//! peers from hanging in a later collective when one rank fails.

use thiserror::Error;

/// Errors from collective operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommError {
    /// The group was aborted (by this rank or a peer) while the operation
    /// was in flight. Carries the abort exit code.
    #[error("group aborted with code {code}")]
    Aborted { code: i32 },

    /// The underlying substrate failed.
    #[error("collective substrate error: {0}")]
    Substrate(String),
}

/// Reduction operator for [`Collective::reduce_u64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    /// Apply the operator to two operands.
    pub fn apply(&self, a: u64, b: u64) -> u64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
        }
    }
}

/// A communicator over a fixed group of participants.
///
/// Every operation except `rank`/`size` is **collective**: each member of
/// the group must invoke it, regardless of having useful work, or the peers
/// deadlock. The engine upholds this by issuing empty-selection reads and
/// zero-valued reductions on ranks that have run out of events.
pub trait Collective {
    /// This participant's rank within the group, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of participants in the group.
    fn size(&self) -> usize;

    /// Block until every member of the group has entered the barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// Reduce `value` across the group with `op`.
    ///
    /// The `root` rank observes `Some(global)`; every other rank observes
    /// `None`. Returning ownership of the result to the root alone keeps
    /// non-root ranks from reading a value that was never theirs.
    fn reduce_u64(&self, value: u64, op: ReduceOp, root: usize) -> Result<Option<u64>, CommError>;

    /// Reduce `value` across the group with `op`; every rank observes the
    /// global result.
    fn allreduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, CommError>;

    /// Split the group into subgroups by `color`; members with equal color
    /// land in the same subgroup, ordered by `key`.
    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Collective>, CommError>;

    /// Split into groups of participants that share a node (the
    /// shared-resource grouping primitive), ordered by `key`.
    fn split_shared(&self, key: usize) -> Result<Box<dyn Collective>, CommError>;

    /// Terminate the whole group with `code`.
    ///
    /// Peers currently blocked in (or about to enter) a collective call
    /// observe [`CommError::Aborted`] instead of hanging. Abort is the only
    /// mid-run cancellation path; it is deliberately not recoverable.
    fn abort(&self, code: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_op_apply() {
        assert_eq!(ReduceOp::Sum.apply(3, 4), 7);
        assert_eq!(ReduceOp::Max.apply(3, 4), 4);
        assert_eq!(ReduceOp::Max.apply(9, 4), 9);
        assert_eq!(ReduceOp::Min.apply(9, 4), 4);
    }
}
