//! Failure taxonomy and escalation rules.
//!
//! Two kinds of fatal error, distinguished by what the rest of the group
//! must do about them:
//!
//! - [`SetupError`]: raised before the pipeline starts. The process reports
//!   locally and exits; no peer is blocked in a collective yet, so no group
//!   coordination is required.
//! - [`ChunkError`]: any collaborator fault while a chunk is in flight.
//!   Peers are (or soon will be) parked in collective reads or reductions,
//!   so the failing rank must trigger a group-wide abort or the run
//!   livelocks. Validation faults (selection/buffer mismatches, corrupt
//!   peak counts) are folded in here and never auto-corrected.
//!
//! Nothing is retried at this layer; transient and permanent failures are
//! deliberately not distinguished.

use roibench_codec::CodecError;
use roibench_comm::CommError;
use roibench_store::StoreError;
use roibench_types::{CapacityExceeded, EventChunk};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal pre-pipeline error; process-local, non-collective exit.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error("dataset {path}: {detail}")]
    BadDataset { path: String, detail: String },

    #[error("attribute {name} on {path} declares {actual}, dataset shape implies {expected}")]
    BadAttribute {
        path: String,
        name: String,
        expected: u64,
        actual: u64,
    },
}

/// Fatal mid-run error; triggers a coordinated abort of the work group.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("store fault on chunk {chunk}: {source}")]
    Store {
        chunk: EventChunk,
        #[source]
        source: StoreError,
    },

    #[error("codec fault on chunk {chunk}: {source}")]
    Codec {
        chunk: EventChunk,
        #[source]
        source: CodecError,
    },

    /// A peak count outside `[0, max_peaks]` means the index stream no
    /// longer describes the position matrices. Truncating would silently
    /// bias the compressor, so this is data corruption, not a warning.
    #[error(
        "corrupt peak count on chunk {chunk}: event offset {event_offset} \
         declares {count} peaks, bound is {max_peaks}"
    )]
    CorruptPeakCount {
        chunk: EventChunk,
        event_offset: u64,
        count: i64,
        max_peaks: u64,
    },

    #[error("buffer fault on chunk {chunk}: {source}")]
    Buffer {
        chunk: EventChunk,
        #[source]
        source: CapacityExceeded,
    },

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error("failed to write diagnostic record {path}: {source}")]
    Diagnostics {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChunkError {
    /// Exit code propagated through the coordinated abort: the failing
    /// collaborator's code when it has one, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChunkError::Codec { source, .. } => source.exit_code(),
            ChunkError::Comm(CommError::Aborted { code }) => *code,
            _ => 1,
        }
    }
}
