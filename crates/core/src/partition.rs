//! Deterministic work partitioning.
//!
//! Pure function, no I/O, no shared state: every rank computes its own
//! chunk from `(iteration_base, work_rank)` alone, and the chunks of one
//! iteration tile the iteration's event extent with no gaps or overlap.

use roibench_types::EventChunk;

/// The chunk `work_rank` owns in the iteration starting at
/// `iteration_base`.
///
/// `start = iteration_base + work_rank * chunk_size`;
/// `count = clamp(total_events - start, 0, chunk_size)`.
pub fn chunk_for(
    iteration_base: u64,
    chunk_size: u64,
    work_rank: usize,
    total_events: u64,
) -> EventChunk {
    let start = iteration_base + work_rank as u64 * chunk_size;
    let count = total_events.saturating_sub(start).min(chunk_size);
    EventChunk::new(start, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_tiling() {
        // total_events=10, chunk_size=3, work_size=2:
        //   base 0: rank0=[0,3), rank1=[3,6)
        //   base 6: rank0=[6,9), rank1=[9,10)
        assert_eq!(chunk_for(0, 3, 0, 10), EventChunk::new(0, 3));
        assert_eq!(chunk_for(0, 3, 1, 10), EventChunk::new(3, 3));
        assert_eq!(chunk_for(6, 3, 0, 10), EventChunk::new(6, 3));
        assert_eq!(chunk_for(6, 3, 1, 10), EventChunk::new(9, 1));
    }

    #[test]
    fn count_is_always_within_chunk_size() {
        for total in 0..40u64 {
            for chunk_size in 1..6u64 {
                for rank in 0..5usize {
                    for base in (0..total.max(1)).step_by(chunk_size as usize) {
                        let c = chunk_for(base, chunk_size, rank, total);
                        assert!(c.count <= chunk_size);
                    }
                }
            }
        }
    }

    #[test]
    fn ranks_tile_the_iteration_without_gaps_or_overlap() {
        for total in 0..50u64 {
            for chunk_size in 1..5u64 {
                for work_size in 1..4usize {
                    let stride = chunk_size * work_size as u64;
                    let mut covered = Vec::new();
                    let mut base = 0;
                    while base < total {
                        for rank in 0..work_size {
                            let c = chunk_for(base, chunk_size, rank, total);
                            // Chunks within one iteration stay inside the
                            // iteration's extent.
                            assert!(c.end() <= (base + stride).min(total) || c.is_empty());
                            covered.extend(c.start..c.end());
                        }
                        base += stride;
                    }
                    let expected: Vec<u64> = (0..total).collect();
                    assert_eq!(covered, expected, "total={total} chunk={chunk_size} ws={work_size}");
                }
            }
        }
    }

    #[test]
    fn rank_past_the_end_gets_an_empty_chunk() {
        let c = chunk_for(6, 3, 3, 10);
        assert_eq!(c.start, 15);
        assert!(c.is_empty());
    }
}
