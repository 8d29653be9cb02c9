//! Distributed chunked event-processing engine.
//!
//! This crate holds the core of roibench:
//!
//! - [`Topology`]: node-local and work-eligible process groups derived from
//!   a flat rank space
//! - [`chunk_for`]: deterministic work partitioning across iterations
//! - [`build_peak_index`]: the sparse-peak-to-dense-coordinate transform
//! - [`EventPipeline`]: the per-chunk stage machine composing reads, peak
//!   indexing, compression, optional decompression, writes and accumulation
//! - [`MetricsAccumulator`]/[`RunReport`]: collective reduction of byte and
//!   time counters into global ratio/bandwidth figures
//! - [`SetupError`]/[`ChunkError`]: the failure taxonomy and the
//!   coordinated-abort protocol
//!
//! # Architecture
//!
//! The engine is SPMD and synchronous: each participant runs the same
//! per-iteration sequence and meets its peers only at explicit collective
//! points (slab reads/writes, timing reductions, the terminal aggregation).
//! All collaborator I/O goes through the trait seams in `roibench-store`,
//! `roibench-codec` and `roibench-comm`, so the whole engine runs unchanged
//! over the in-memory backends in tests and over MPI in production.

mod aggregate;
mod config;
mod diagnostics;
mod error;
mod partition;
mod peaks;
mod pipeline;
mod topology;

pub use aggregate::{reduce_totals, MetricsAccumulator, RunReport, REPORT_RANK};
pub use config::{DatasetPaths, DebugConfig, RunConfig};
pub use diagnostics::{basename, DiagnosticsSink};
pub use error::{ChunkError, SetupError};
pub use partition::chunk_for;
pub use peaks::{build_peak_index, PeakCountError};
pub use pipeline::{ChunkStage, EventPipeline, PipelineStatus};
pub use topology::{derive_assignments, ProcessRank, RankAssignment, Topology, WorkGroup};
