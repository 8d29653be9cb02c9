//! Run configuration for the engine.

use crate::error::SetupError;
use std::path::PathBuf;

/// Store paths of the four input streams.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    /// Frame images, shape `[events, rows, cols]`, f32.
    pub frames: String,
    /// Peak x positions, shape `[events, max_peaks]`, f64.
    pub peak_x: String,
    /// Peak y positions, shape `[events, max_peaks]`, f64.
    pub peak_y: String,
    /// Peaks per event, shape `[events]`, i64.
    pub peak_count: String,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        DatasetPaths {
            frames: "/data/frames".to_string(),
            peak_x: "/peaks/x".to_string(),
            peak_y: "/peaks/y".to_string(),
            peak_count: "/peaks/count".to_string(),
        }
    }
}

/// Per-chunk diagnostic record settings.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Directory the JSON documents are written to.
    pub dir: PathBuf,
    /// Source artifact path; only its basename enters the file name.
    pub source: String,
    /// Codec config file path; only its basename enters the file name.
    pub config: String,
}

/// Engine configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Events per chunk, per rank, per iteration. Must be at least 1.
    pub chunk_size: u64,

    /// First event to process.
    pub start_event: u64,

    /// Number of events to persist, counted from event 0. `None` means all
    /// events. Only meaningful with `persist_output`.
    pub write_events: Option<u64>,

    /// Work-group cap per node; 0 admits every rank on the node.
    pub workers_per_node: usize,

    /// Enable the decompress + write stages against an output store.
    pub persist_output: bool,

    /// Input stream locations.
    pub paths: DatasetPaths,

    /// When set, one diagnostic JSON document is written per chunk.
    pub debug: Option<DebugConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            chunk_size: 1,
            start_event: 0,
            write_events: None,
            workers_per_node: 0,
            persist_output: false,
            paths: DatasetPaths::default(),
            debug: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.chunk_size == 0 {
            return Err(SetupError::Config("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = RunConfig {
            chunk_size: 0,
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(SetupError::Config(_))));
    }
}
