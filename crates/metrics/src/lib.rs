//! Metrics facade for roibench.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and
//! default no-op implementations. A global singleton recorder is accessed
//! via `recorder()`, and convenience free functions delegate to it.
//!
//! The benchmark is a batch job, so no scrape endpoint ships in-tree; the
//! facade keeps the seam for embedders that want one.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! roibench_metrics::record_chunk_compressed(raw_bytes, compressed_bytes, secs);
//! ```
//!
//! At startup, optionally install a backend:
//! ```ignore
//! roibench_metrics::set_global_recorder(Box::new(MyRecorder));
//! ```

use std::sync::OnceLock;

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Pipeline ─────────────────────────────────────────────────────

    /// Record a chunk's slabs read from the store.
    fn record_chunk_read(&self, events: u64, bytes: u64, latency_secs: f64) {}

    /// Record a chunk compressed.
    fn record_chunk_compressed(&self, raw_bytes: u64, compressed_bytes: u64, latency_secs: f64) {}

    /// Record a chunk decompressed into scratch.
    fn record_chunk_decompressed(&self, bytes: u64, latency_secs: f64) {}

    /// Record a chunk's restored sub-range written to the output store.
    fn record_chunk_written(&self, events: u64, bytes: u64, latency_secs: f64) {}

    /// Record one iteration completed (all ranks' chunks plus reductions).
    fn record_iteration(&self, base: u64) {}

    // ── Run ──────────────────────────────────────────────────────────

    /// Set the current iteration base gauge.
    fn set_iteration_base(&self, base: u64) {}

    /// Record a coordinated abort, with the exit code.
    fn record_abort(&self, code: i32) {}

    /// Record the terminal totals on the reporting rank.
    fn record_run_totals(&self, raw_bytes: u64, compressed_bytes: u64, wallclock_secs: f64) {}
}

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a global metrics recorder.
///
/// Can only be called once. Subsequent calls are silently ignored.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

/// Get the global metrics recorder.
///
/// Returns a no-op recorder if none has been installed.
#[inline]
fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

/// Record a chunk's slabs read from the store.
#[inline]
pub fn record_chunk_read(events: u64, bytes: u64, latency_secs: f64) {
    recorder().record_chunk_read(events, bytes, latency_secs);
}

/// Record a chunk compressed.
#[inline]
pub fn record_chunk_compressed(raw_bytes: u64, compressed_bytes: u64, latency_secs: f64) {
    recorder().record_chunk_compressed(raw_bytes, compressed_bytes, latency_secs);
}

/// Record a chunk decompressed into scratch.
#[inline]
pub fn record_chunk_decompressed(bytes: u64, latency_secs: f64) {
    recorder().record_chunk_decompressed(bytes, latency_secs);
}

/// Record a chunk's restored sub-range written to the output store.
#[inline]
pub fn record_chunk_written(events: u64, bytes: u64, latency_secs: f64) {
    recorder().record_chunk_written(events, bytes, latency_secs);
}

/// Record one iteration completed.
#[inline]
pub fn record_iteration(base: u64) {
    recorder().record_iteration(base);
}

/// Set the current iteration base gauge.
#[inline]
pub fn set_iteration_base(base: u64) {
    recorder().set_iteration_base(base);
}

/// Record a coordinated abort.
#[inline]
pub fn record_abort(code: i32) {
    recorder().record_abort(code);
}

/// Record the terminal totals on the reporting rank.
#[inline]
pub fn record_run_totals(raw_bytes: u64, compressed_bytes: u64, wallclock_secs: f64) {
    recorder().record_run_totals(raw_bytes, compressed_bytes, wallclock_secs);
}
