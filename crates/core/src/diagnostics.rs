//! Per-chunk diagnostic records.
//!
//! In debug mode the pipeline writes one JSON document per chunk with the
//! codec's own metrics. The file name is a compatibility contract for
//! downstream tooling:
//!
//! ```text
//! {source-name}-{config-name}-{chunk-start}-{chunk-end}.json
//! ```

use crate::config::DebugConfig;
use roibench_types::EventChunk;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Final path component of `path`.
///
/// Unlike `Path::file_name`, this keeps the contract downstream parsers
/// rely on: an empty path and a bare `/` map to themselves, and trailing
/// slashes are stripped before taking the last component.
pub fn basename(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        return path;
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Writes one diagnostic document per chunk into a configured directory.
pub struct DiagnosticsSink {
    dir: PathBuf,
    source_name: String,
    config_name: String,
}

impl DiagnosticsSink {
    pub fn new(config: &DebugConfig) -> Self {
        DiagnosticsSink {
            dir: config.dir.clone(),
            source_name: basename(&config.source).to_string(),
            config_name: basename(&config.config).to_string(),
        }
    }

    /// The document path for a chunk.
    pub fn record_path(&self, chunk: &EventChunk) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}-{}.json",
            self.source_name,
            self.config_name,
            chunk.start,
            chunk.end()
        ))
    }

    /// Write the codec metrics record for one chunk.
    pub fn write_chunk(
        &self,
        chunk: &EventChunk,
        metrics: &serde_json::Value,
    ) -> std::io::Result<PathBuf> {
        let path = self.record_path(chunk);
        let mut file = fs::File::create(&path)?;
        file.write_all(metrics.to_string().as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basename_handles_plain_and_nested_paths() {
        assert_eq!(basename("run0042.cxi"), "run0042.cxi");
        assert_eq!(basename("/data/lcls/run0042.cxi"), "run0042.cxi");
        assert_eq!(basename("share/fast.json"), "fast.json");
    }

    #[test]
    fn basename_edge_cases() {
        assert_eq!(basename(""), "");
        assert_eq!(basename("/"), "/");
        assert_eq!(basename("/data/runs/"), "runs");
        assert_eq!(basename("///"), "/");
    }

    #[test]
    fn record_name_contract() {
        let sink = DiagnosticsSink::new(&DebugConfig {
            dir: PathBuf::from("/tmp/debug"),
            source: "/data/run0042.cxi".to_string(),
            config: "share/fast.json".to_string(),
        });
        let chunk = EventChunk::new(6, 3);
        assert_eq!(
            sink.record_path(&chunk),
            PathBuf::from("/tmp/debug/run0042.cxi-fast.json-6-9.json")
        );
    }

    #[test]
    fn writes_metrics_document() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticsSink::new(&DebugConfig {
            dir: dir.path().to_path_buf(),
            source: "events.cxi".to_string(),
            config: "lz4.json".to_string(),
        });
        let chunk = EventChunk::new(0, 2);
        let path = sink
            .write_chunk(&chunk, &json!({"size": {"compressed_bytes": 10}}))
            .unwrap();

        assert!(path.ends_with("events.cxi-lz4.json-0-2.json"));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["size"]["compressed_bytes"], 10);
    }
}
