//! Runner wiring for roibench.
//!
//! Composes the engine with concrete collaborators:
//!
//! - [`generate_store`]: a seeded synthetic event store
//! - [`load_codec_options`]: the declarative codec option tree plus the
//!   fixed injected metrics pair
//! - [`run_rank`]: the per-rank routine (topology, setup barrier, pipeline)
//! - [`run_in_process`]: the default mode, one rank thread per participant
//!   over the in-process collective
//!
//! The `roibench` binary layers CLI/TOML configuration on top; with the
//! `mpi` feature it drives the same [`run_rank`] over a real MPI world.

mod generate;
mod options;
mod runner;

pub use generate::{generate_store, SyntheticConfig};
pub use options::load_codec_options;
pub use runner::{run_in_process, run_rank, HarnessError, InProcessOptions};
