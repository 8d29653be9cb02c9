//! Synthetic event generation.
//!
//! Builds a seeded in-memory store shaped like a real acquisition: noisy
//! frames with bright spots at the generated peak positions, plus the
//! matching position/count streams. Deterministic per seed, so every
//! process of an MPI launch generates an identical replica.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roibench_core::DatasetPaths;
use roibench_store::{Dataset, EventStore, Selection};
use roibench_store_memory::MemoryStore;
use roibench_types::{ScalarType, Shape};
use tracing::info;

/// Synthetic dataset parameters.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub events: u64,
    pub rows: u64,
    pub cols: u64,
    pub max_peaks: u64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            events: 64,
            rows: 128,
            cols: 128,
            max_peaks: 16,
            seed: 1,
        }
    }
}

/// Generate the input store at the configured dataset paths.
pub fn generate_store(config: &SyntheticConfig, paths: &DatasetPaths) -> MemoryStore {
    let store = MemoryStore::new();
    store.create_dataset(
        &paths.frames,
        Shape::new(vec![config.events, config.rows, config.cols]),
        ScalarType::F32,
    );
    store.create_dataset(
        &paths.peak_x,
        Shape::new(vec![config.events, config.max_peaks]),
        ScalarType::F64,
    );
    store.create_dataset(
        &paths.peak_y,
        Shape::new(vec![config.events, config.max_peaks]),
        ScalarType::F64,
    );
    store.create_dataset(
        &paths.peak_count,
        Shape::new(vec![config.events]),
        ScalarType::I64,
    );
    store.set_attribute_u64(&paths.peak_x, "max_peaks", config.max_peaks);

    if config.events == 0 {
        return store;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let pixels = (config.rows * config.cols) as usize;
    let mut frames = vec![0f32; config.events as usize * pixels];
    let mut counts = vec![0i64; config.events as usize];
    let mut xs = vec![0f64; (config.events * config.max_peaks) as usize];
    let mut ys = vec![0f64; (config.events * config.max_peaks) as usize];

    for event in 0..config.events as usize {
        let frame = &mut frames[event * pixels..(event + 1) * pixels];
        for value in frame.iter_mut() {
            *value = rng.gen_range(0.0..20.0);
        }

        let count = rng.gen_range(0..=config.max_peaks);
        counts[event] = count as i64;
        for peak in 0..count as usize {
            let col = rng.gen_range(0..config.cols);
            let row = rng.gen_range(0..config.rows);
            xs[event * config.max_peaks as usize + peak] = col as f64;
            ys[event * config.max_peaks as usize + peak] = row as f64;
            // Bragg-spot-like intensity on top of the background.
            frame[(row * config.cols + col) as usize] += rng.gen_range(500.0..4000.0);
        }
    }

    write_values(&store, &paths.frames, &frames, |v| v.to_ne_bytes());
    write_values(&store, &paths.peak_count, &counts, |v| v.to_ne_bytes());
    write_values(&store, &paths.peak_x, &xs, |v| v.to_ne_bytes());
    write_values(&store, &paths.peak_y, &ys, |v| v.to_ne_bytes());

    info!(
        events = config.events,
        rows = config.rows,
        cols = config.cols,
        max_peaks = config.max_peaks,
        seed = config.seed,
        "generated synthetic event store"
    );
    store
}

fn write_values<T: Copy, const N: usize>(
    store: &MemoryStore,
    path: &str,
    values: &[T],
    to_bytes: impl Fn(T) -> [u8; N],
) {
    let dset = store.dataset(path).expect("generator created the dataset");
    let shape = dset.shape();
    let selection = Selection::new(vec![0; shape.rank()], shape.dims().to_vec());
    let bytes: Vec<u8> = values.iter().flat_map(|&v| to_bytes(v)).collect();
    dset.write_slab(&selection, &bytes)
        .expect("generator sized the buffer from the shape");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_seed() {
        let config = SyntheticConfig {
            events: 4,
            rows: 16,
            cols: 16,
            max_peaks: 3,
            seed: 9,
        };
        let paths = DatasetPaths::default();
        let a = generate_store(&config, &paths);
        let b = generate_store(&config, &paths);
        assert_eq!(
            a.dataset_bytes(&paths.frames),
            b.dataset_bytes(&paths.frames)
        );
        assert_eq!(
            a.dataset_bytes(&paths.peak_x),
            b.dataset_bytes(&paths.peak_x)
        );
    }

    #[test]
    fn peaks_are_brighter_than_background() {
        let config = SyntheticConfig {
            events: 2,
            rows: 32,
            cols: 32,
            max_peaks: 4,
            seed: 3,
        };
        let paths = DatasetPaths::default();
        let store = generate_store(&config, &paths);

        let counts: Vec<i64> = store
            .dataset_bytes(&paths.peak_count)
            .unwrap()
            .chunks_exact(8)
            .map(|c| i64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        let xs: Vec<f64> = store
            .dataset_bytes(&paths.peak_x)
            .unwrap()
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        let ys: Vec<f64> = store
            .dataset_bytes(&paths.peak_y)
            .unwrap()
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        let frames: Vec<f32> = store
            .dataset_bytes(&paths.frames)
            .unwrap()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect();

        let pixels = (config.rows * config.cols) as usize;
        for event in 0..config.events as usize {
            for peak in 0..counts[event] as usize {
                let idx = event * config.max_peaks as usize + peak;
                let pixel = ys[idx] as usize * config.cols as usize + xs[idx] as usize;
                assert!(
                    frames[event * pixels + pixel] > 100.0,
                    "peak pixel should sit above the background"
                );
            }
        }
    }

    #[test]
    fn zero_events_yields_empty_datasets() {
        let config = SyntheticConfig {
            events: 0,
            ..SyntheticConfig::default()
        };
        let paths = DatasetPaths::default();
        let store = generate_store(&config, &paths);
        assert_eq!(store.dataset_bytes(&paths.frames).unwrap().len(), 0);
    }
}
