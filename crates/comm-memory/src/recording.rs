//! Recording wrapper for collective operations.
//!
//! Wraps any [`Collective`] and logs every operation, so tests can assert
//! on the collective protocol a component actually issued (which reductions
//! ran, in what order, whether an abort was raised).

use roibench_comm::{Collective, CommError, ReduceOp};
use std::sync::{Arc, Mutex};

/// One recorded collective operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectiveOp {
    Barrier,
    Reduce {
        value: u64,
        op: ReduceOp,
        root: usize,
    },
    Allreduce {
        value: u64,
        op: ReduceOp,
    },
    Split {
        color: u32,
    },
    SplitShared,
    Abort {
        code: i32,
    },
}

/// A [`Collective`] that records operations before delegating to an inner
/// backend.
pub struct RecordingCollective<C> {
    inner: C,
    ops: Arc<Mutex<Vec<CollectiveOp>>>,
}

impl<C: Collective> RecordingCollective<C> {
    pub fn new(inner: C) -> Self {
        RecordingCollective {
            inner,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the operation log; clones observe later recordings.
    pub fn ops_handle(&self) -> Arc<Mutex<Vec<CollectiveOp>>> {
        Arc::clone(&self.ops)
    }

    /// Snapshot of the operations recorded so far.
    pub fn ops(&self) -> Vec<CollectiveOp> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: CollectiveOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl<C: Collective> Collective for RecordingCollective<C> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.record(CollectiveOp::Barrier);
        self.inner.barrier()
    }

    fn reduce_u64(&self, value: u64, op: ReduceOp, root: usize) -> Result<Option<u64>, CommError> {
        self.record(CollectiveOp::Reduce { value, op, root });
        self.inner.reduce_u64(value, op, root)
    }

    fn allreduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, CommError> {
        self.record(CollectiveOp::Allreduce { value, op });
        self.inner.allreduce_u64(value, op)
    }

    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Collective>, CommError> {
        self.record(CollectiveOp::Split { color });
        self.inner.split(color, key)
    }

    fn split_shared(&self, key: usize) -> Result<Box<dyn Collective>, CommError> {
        self.record(CollectiveOp::SplitShared);
        self.inner.split_shared(key)
    }

    fn abort(&self, code: i32) {
        self.record(CollectiveOp::Abort { code });
        self.inner.abort(code);
    }
}
