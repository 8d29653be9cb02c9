//! In-process collective backend.
//!
//! Runs an SPMD group as threads inside one process: every participant gets
//! a [`MemoryCollective`] handle and the barrier/reduce/split operations are
//! implemented with generation-counted condvars. This is the substrate used
//! by tests and by the harness's default (non-MPI) mode — the engine code
//! path is identical to a real multi-process run.
//!
//! Abort semantics mirror the real substrate: aborting any group terminates
//! the whole universe, and peers blocked in any collective call wake up with
//! [`CommError::Aborted`] instead of hanging.

mod group;
mod recording;

pub use group::{MemoryCollective, MemoryUniverse};
pub use recording::{CollectiveOp, RecordingCollective};
