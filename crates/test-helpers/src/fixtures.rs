//! Synthetic event fixtures.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roibench_store::{Dataset, EventStore, Selection};
use roibench_store_memory::MemoryStore;
use roibench_types::{ScalarType, Shape};

/// Builder for a seeded synthetic event store.
///
/// Datasets land at the engine's default paths: `/data/frames`,
/// `/peaks/{x,y,count}`, with a `max_peaks` attribute on the x positions.
#[derive(Debug, Clone)]
pub struct SyntheticEvents {
    pub events: u64,
    pub rows: u64,
    pub cols: u64,
    pub max_peaks: u64,
    pub seed: u64,
}

impl Default for SyntheticEvents {
    fn default() -> Self {
        SyntheticEvents {
            events: 16,
            rows: 8,
            cols: 8,
            max_peaks: 4,
            seed: 42,
        }
    }
}

impl SyntheticEvents {
    /// Build the populated input store. Same seed, same store.
    pub fn build(&self) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_dataset(
            "/data/frames",
            Shape::new(vec![self.events, self.rows, self.cols]),
            ScalarType::F32,
        );
        store.create_dataset(
            "/peaks/x",
            Shape::new(vec![self.events, self.max_peaks]),
            ScalarType::F64,
        );
        store.create_dataset(
            "/peaks/y",
            Shape::new(vec![self.events, self.max_peaks]),
            ScalarType::F64,
        );
        store.create_dataset(
            "/peaks/count",
            Shape::new(vec![self.events]),
            ScalarType::I64,
        );
        store.set_attribute_u64("/peaks/x", "max_peaks", self.max_peaks);

        if self.events == 0 {
            return store;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let pixels = (self.rows * self.cols) as usize;

        let frame_bytes: Vec<u8> = (0..self.events as usize * pixels)
            .map(|_| rng.gen_range(0.0f32..1000.0))
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        store
            .dataset("/data/frames")
            .unwrap()
            .write_slab(
                &Selection::new(vec![0, 0, 0], vec![self.events, self.rows, self.cols]),
                &frame_bytes,
            )
            .unwrap();

        let counts: Vec<i64> = (0..self.events)
            .map(|_| rng.gen_range(0..=self.max_peaks as i64))
            .collect();
        let count_bytes: Vec<u8> = counts.iter().flat_map(|v| v.to_ne_bytes()).collect();
        store
            .dataset("/peaks/count")
            .unwrap()
            .write_slab(&Selection::new(vec![0], vec![self.events]), &count_bytes)
            .unwrap();

        for (path, extent) in [("/peaks/x", self.cols), ("/peaks/y", self.rows)] {
            let values: Vec<f64> = (0..self.events * self.max_peaks)
                .map(|_| rng.gen_range(0.0..extent as f64))
                .collect();
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
            store
                .dataset(path)
                .unwrap()
                .write_slab(
                    &Selection::new(vec![0, 0], vec![self.events, self.max_peaks]),
                    &bytes,
                )
                .unwrap();
        }
        store
    }

    /// An output store with a zero-filled frames dataset of matching
    /// geometry, as prepared by the harness before a persisting run.
    pub fn empty_output(&self) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_dataset(
            "/data/frames",
            Shape::new(vec![self.events, self.rows, self.cols]),
            ScalarType::F32,
        );
        store
    }

    /// Frame values of the input store, row-major.
    pub fn frames_of(store: &MemoryStore) -> Vec<f32> {
        store
            .dataset_bytes("/data/frames")
            .unwrap()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }
}
