//! Metrics accumulation and the terminal reduction.
//!
//! Each rank keeps running byte totals; per-iteration compress/decompress
//! latencies are reduced across the work group with **max** (capturing the
//! straggler that gates the iteration) and the maxima are summed at the
//! reporting rank (capturing total stall time across the run, not just the
//! last iteration's cost). At run end one sum-reduction per byte counter
//! produces the global figures.

use roibench_comm::{Collective, CommError, ReduceOp};

/// The rank that receives reductions and prints the report.
pub const REPORT_RANK: usize = 0;

/// Per-rank running totals. Monotonic non-decreasing through the run.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
    /// Sum over iterations of the group-wide compress-time maximum.
    /// Accumulated on the reporting rank only.
    pub compress_ms_sum_of_maxima: u64,
    /// As above, for decompression.
    pub decompress_ms_sum_of_maxima: u64,
}

impl MetricsAccumulator {
    pub fn add_chunk(&mut self, raw_bytes: u64, compressed_bytes: u64) {
        self.raw_bytes += raw_bytes;
        self.compressed_bytes += compressed_bytes;
    }

    pub fn add_compress_maximum(&mut self, ms: u64) {
        self.compress_ms_sum_of_maxima += ms;
    }

    pub fn add_decompress_maximum(&mut self, ms: u64) {
        self.decompress_ms_sum_of_maxima += ms;
    }
}

/// Global figures, produced on [`REPORT_RANK`] by [`reduce_totals`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub global_raw_bytes: u64,
    pub global_compressed_bytes: u64,
    pub wallclock_ms: u64,
    pub compress_ms: u64,
    /// `None` when output persistence was disabled: without a decompress
    /// stage there is no decompression figure to report, and printing a
    /// zero would read as a measurement.
    pub decompress_ms: Option<u64>,
}

/// `numerator / denominator`, or `None` on a zero denominator (for example
/// a run that processed zero events).
fn checked_div(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

impl RunReport {
    /// Global compression ratio, raw over compressed.
    pub fn ratio(&self) -> Option<f64> {
        checked_div(self.global_raw_bytes, self.global_compressed_bytes)
    }

    /// GB/s against summed compress stall time.
    pub fn compress_bandwidth_gbps(&self) -> Option<f64> {
        checked_div(self.global_raw_bytes, self.compress_ms).map(|v| v * 1e-6)
    }

    /// GB/s against total wallclock.
    pub fn wallclock_bandwidth_gbps(&self) -> Option<f64> {
        checked_div(self.global_raw_bytes, self.wallclock_ms).map(|v| v * 1e-6)
    }

    /// GB/s against summed decompress stall time; `None` without output
    /// persistence.
    pub fn decompress_bandwidth_gbps(&self) -> Option<f64> {
        let ms = self.decompress_ms?;
        checked_div(self.global_raw_bytes, ms).map(|v| v * 1e-6)
    }

    /// The key=value report block printed by the reporting rank.
    pub fn render(&self) -> String {
        fn figure(value: Option<f64>) -> String {
            match value {
                Some(v) => format!("{}", v),
                None => "unavailable".to_string(),
            }
        }

        let mut out = String::new();
        out.push_str(&format!("global_cr={}\n", figure(self.ratio())));
        out.push_str(&format!("wallclock_ms={}\n", self.wallclock_ms));
        out.push_str(&format!("compress_ms={}\n", self.compress_ms));
        out.push_str(&format!(
            "compress_bandwidth_GBps={}\n",
            figure(self.compress_bandwidth_gbps())
        ));
        out.push_str(&format!(
            "wallclock_bandwidth_GBps={}\n",
            figure(self.wallclock_bandwidth_gbps())
        ));
        if self.decompress_ms.is_some() {
            out.push_str(&format!(
                "decompress_bandwidth_GBps={}\n",
                figure(self.decompress_bandwidth_gbps())
            ));
        }
        out
    }
}

/// Terminal reduction: sum the byte counters to [`REPORT_RANK`] and
/// assemble the report there. Collective: every work-group member must
/// call this exactly once, after its last iteration.
pub fn reduce_totals(
    acc: &MetricsAccumulator,
    comm: &dyn Collective,
    wallclock_ms: u64,
    persist_output: bool,
) -> Result<Option<RunReport>, CommError> {
    let raw = comm.reduce_u64(acc.raw_bytes, ReduceOp::Sum, REPORT_RANK)?;
    let compressed = comm.reduce_u64(acc.compressed_bytes, ReduceOp::Sum, REPORT_RANK)?;

    match (raw, compressed) {
        (Some(global_raw_bytes), Some(global_compressed_bytes)) => Ok(Some(RunReport {
            global_raw_bytes,
            global_compressed_bytes,
            wallclock_ms,
            compress_ms: acc.compress_ms_sum_of_maxima,
            decompress_ms: persist_output.then_some(acc.decompress_ms_sum_of_maxima),
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roibench_comm_memory::MemoryUniverse;
    use std::thread;

    #[test]
    fn accumulator_is_monotonic() {
        let mut acc = MetricsAccumulator::default();
        acc.add_chunk(100, 40);
        acc.add_chunk(0, 0);
        acc.add_chunk(50, 20);
        assert_eq!(acc.raw_bytes, 150);
        assert_eq!(acc.compressed_bytes, 60);
    }

    #[test]
    fn totals_are_exact_sums_across_ranks() {
        let (_, ranks) = MemoryUniverse::new(3);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let mut acc = MetricsAccumulator::default();
                    // Rank r contributes raw=(r+1)*1000, compressed=(r+1)*100.
                    let r = c.rank() as u64 + 1;
                    acc.add_chunk(r * 1000, r * 100);
                    reduce_totals(&acc, &c, 50, false).unwrap()
                })
            })
            .collect();
        let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let root = reports[0].as_ref().expect("root holds the report");
        assert_eq!(root.global_raw_bytes, 6000);
        assert_eq!(root.global_compressed_bytes, 600);
        assert_eq!(root.ratio(), Some(10.0));
        assert!(reports[1].is_none());
        assert!(reports[2].is_none());
    }

    #[test]
    fn zero_denominators_are_unavailable() {
        let report = RunReport {
            global_raw_bytes: 0,
            global_compressed_bytes: 0,
            wallclock_ms: 0,
            compress_ms: 0,
            decompress_ms: Some(0),
        };
        assert_eq!(report.ratio(), None);
        assert_eq!(report.compress_bandwidth_gbps(), None);
        assert_eq!(report.wallclock_bandwidth_gbps(), None);
        assert_eq!(report.decompress_bandwidth_gbps(), None);

        let rendered = report.render();
        assert!(rendered.contains("global_cr=unavailable"));
        assert!(rendered.contains("compress_bandwidth_GBps=unavailable"));
    }

    #[test]
    fn decompress_figure_is_omitted_without_persistence() {
        let report = RunReport {
            global_raw_bytes: 1000,
            global_compressed_bytes: 500,
            wallclock_ms: 10,
            compress_ms: 5,
            decompress_ms: None,
        };
        assert_eq!(report.decompress_bandwidth_gbps(), None);
        assert!(!report.render().contains("decompress_bandwidth_GBps"));
    }

    #[test]
    fn bandwidth_units_are_gb_per_second() {
        // 1e9 bytes in 1000 ms is 1 GB/s.
        let report = RunReport {
            global_raw_bytes: 1_000_000_000,
            global_compressed_bytes: 1,
            wallclock_ms: 1000,
            compress_ms: 1000,
            decompress_ms: None,
        };
        assert_eq!(report.compress_bandwidth_gbps(), Some(1.0));
        assert_eq!(report.wallclock_bandwidth_gbps(), Some(1.0));
    }
}
