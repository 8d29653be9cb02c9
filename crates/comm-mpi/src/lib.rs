//! MPI-backed collective substrate.
//!
//! Wraps the `mpi` crate (rsmpi) behind the [`Collective`] trait so the
//! engine runs unchanged on a real multi-process launch:
//!
//! ```bash
//! mpiexec -n 8 roibench --mpi ...
//! ```
//!
//! The process must initialize MPI exactly once via [`MpiRuntime::init`]
//! and keep the runtime alive for the duration of the run; MPI is finalized
//! when the runtime is dropped.

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;
use roibench_comm::{Collective, CommError, ReduceOp};
use tracing::trace;

fn system_operation(op: ReduceOp) -> SystemOperation {
    match op {
        ReduceOp::Sum => SystemOperation::sum(),
        ReduceOp::Max => SystemOperation::max(),
        ReduceOp::Min => SystemOperation::min(),
    }
}

/// Owns the MPI environment. Dropping it finalizes MPI.
pub struct MpiRuntime {
    universe: Universe,
}

impl MpiRuntime {
    /// Initialize MPI. Returns `None` if MPI was already initialized.
    pub fn init() -> Option<Self> {
        mpi::initialize().map(|universe| MpiRuntime { universe })
    }

    /// The world communicator.
    pub fn world(&self) -> MpiCollective {
        MpiCollective {
            comm: self.universe.world(),
        }
    }
}

/// A [`Collective`] over one MPI communicator.
pub struct MpiCollective {
    comm: SimpleCommunicator,
}

impl Collective for MpiCollective {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.comm.barrier();
        Ok(())
    }

    fn reduce_u64(&self, value: u64, op: ReduceOp, root: usize) -> Result<Option<u64>, CommError> {
        let root_process = self.comm.process_at_rank(root as i32);
        if self.rank() == root {
            let mut global = 0u64;
            root_process.reduce_into_root(&value, &mut global, system_operation(op));
            Ok(Some(global))
        } else {
            root_process.reduce_into(&value, system_operation(op));
            Ok(None)
        }
    }

    fn allreduce_u64(&self, value: u64, op: ReduceOp) -> Result<u64, CommError> {
        let mut global = 0u64;
        self.comm
            .all_reduce_into(&value, &mut global, system_operation(op));
        Ok(global)
    }

    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Collective>, CommError> {
        let comm = self
            .comm
            .split_by_color_with_key(Color::with_value(color as i32), key as i32)
            .ok_or_else(|| CommError::Substrate("communicator split yielded no group".into()))?;
        trace!(rank = comm.rank(), size = comm.size(), color, "split communicator");
        Ok(Box::new(MpiCollective { comm }))
    }

    fn split_shared(&self, key: usize) -> Result<Box<dyn Collective>, CommError> {
        // MPI_Comm_split_type(MPI_COMM_TYPE_SHARED): ranks that can share
        // memory, i.e. ranks on the same node.
        let comm = self.comm.split_shared(key as i32);
        trace!(
            rank = comm.rank(),
            size = comm.size(),
            "split node-local communicator"
        );
        Ok(Box::new(MpiCollective { comm }))
    }

    fn abort(&self, code: i32) {
        // Terminates every process connected to this communicator's job.
        self.comm.abort(code);
    }
}
