//! Sparse-peak-to-dense-coordinate transform.
//!
//! Each event carries a peak count and up to `max_peaks` (x, y) positions
//! in fixed-width rows. The codec wants one flat ordered coordinate list
//! instead: grouped by event in chunk order, peak index ascending, each
//! entry tagged with the chunk-local event offset.

use roibench_types::{PeakCoordinate, PeakIndex};
use thiserror::Error;

/// A peak count outside `[0, max_peaks]`.
///
/// Out-of-range counts mean the count stream and the position matrices no
/// longer describe the same data; truncation would silently feed the codec
/// wrong regions, so the transform refuses.
#[derive(Debug, Error)]
#[error("event offset {event_offset} declares {count} peaks, bound is {max_peaks}")]
pub struct PeakCountError {
    pub event_offset: u64,
    pub count: i64,
    pub max_peaks: u64,
}

/// Flatten per-event peak lists into one ordered coordinate stream.
///
/// `counts` holds one entry per event in the chunk; `xs`/`ys` are the
/// position matrices in storage order (`[event][max_peaks]`, row-major) and
/// must cover `counts.len() * max_peaks` entries. Positions are truncated
/// to integer pixel coordinates.
///
/// The output is pre-sized to `max_peaks * counts.len()` so pushing never
/// reallocates mid-chunk.
pub fn build_peak_index(
    counts: &[i64],
    xs: &[f64],
    ys: &[f64],
    max_peaks: u64,
) -> Result<PeakIndex, PeakCountError> {
    debug_assert_eq!(xs.len(), counts.len() * max_peaks as usize);
    debug_assert_eq!(ys.len(), counts.len() * max_peaks as usize);

    let mut index = PeakIndex::with_capacity(counts.len() * max_peaks as usize);
    for (event, &count) in counts.iter().enumerate() {
        if count < 0 || count as u64 > max_peaks {
            return Err(PeakCountError {
                event_offset: event as u64,
                count,
                max_peaks,
            });
        }
        let row = event * max_peaks as usize;
        for peak in 0..count as usize {
            index.push(PeakCoordinate {
                x: xs[row + peak] as u64,
                y: ys[row + peak] as u64,
                event_offset: event as u64,
            });
        }
    }
    Ok(index)
}
