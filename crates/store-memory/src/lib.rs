//! In-memory event store.
//!
//! Backend used by tests and the harness's synthetic-dataset mode. Datasets
//! are flat byte vectors addressed row-major in storage order. A store is a
//! cheap clone over shared state, so every rank thread of an in-process run
//! holds its own handle onto the same data, like per-rank handles onto one
//! parallel file.

use roibench_store::{validate_selection, Dataset, EventStore, Selection, StoreError};
use roibench_types::{ScalarType, Shape};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct DatasetData {
    shape: Shape,
    scalar_type: ScalarType,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct StoreData {
    datasets: HashMap<String, DatasetData>,
    attributes: HashMap<(String, String), u64>,
}

/// A shared in-memory store. `Clone` shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<StoreData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Create a zero-filled dataset.
    pub fn create_dataset(&self, path: &str, shape: Shape, scalar_type: ScalarType) {
        let bytes = vec![0u8; shape.element_count() as usize * scalar_type.byte_width()];
        self.data.write().unwrap().datasets.insert(
            path.to_string(),
            DatasetData {
                shape,
                scalar_type,
                bytes,
            },
        );
    }

    /// Attach a scalar attribute to a dataset path.
    pub fn set_attribute_u64(&self, dataset_path: &str, name: &str, value: u64) {
        self.data
            .write()
            .unwrap()
            .attributes
            .insert((dataset_path.to_string(), name.to_string()), value);
    }

    /// Raw bytes of a dataset, for fixtures and assertions.
    pub fn dataset_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.data
            .read()
            .unwrap()
            .datasets
            .get(path)
            .map(|d| d.bytes.clone())
    }

    /// Deep copy of the whole store, the in-memory analogue of copying the
    /// source file before an in-place benchmark run.
    pub fn deep_clone(&self) -> MemoryStore {
        let copy = MemoryStore::new();
        copy.copy_from(self);
        copy
    }

    /// Replace this store's contents with a deep copy of `other`.
    ///
    /// Used by the designated rank to prepare a shared output artifact
    /// before the group barrier; peers holding handles onto this store
    /// observe the copied datasets afterwards.
    pub fn copy_from(&self, other: &MemoryStore) {
        let source = other.data.read().unwrap();
        let mut data = self.data.write().unwrap();
        data.datasets = source
            .datasets
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DatasetData {
                        shape: v.shape.clone(),
                        scalar_type: v.scalar_type,
                        bytes: v.bytes.clone(),
                    },
                )
            })
            .collect();
        data.attributes = source.attributes.clone();
    }
}

/// Handle onto one dataset of a [`MemoryStore`].
pub struct MemoryDataset {
    store: Arc<RwLock<StoreData>>,
    path: String,
    shape: Shape,
    scalar_type: ScalarType,
}

impl EventStore for MemoryStore {
    type Dataset = MemoryDataset;

    fn dataset(&self, path: &str) -> Result<MemoryDataset, StoreError> {
        let data = self.data.read().unwrap();
        let dset = data
            .datasets
            .get(path)
            .ok_or_else(|| StoreError::DatasetNotFound {
                path: path.to_string(),
            })?;
        Ok(MemoryDataset {
            store: Arc::clone(&self.data),
            path: path.to_string(),
            shape: dset.shape.clone(),
            scalar_type: dset.scalar_type,
        })
    }

    fn attribute_u64(&self, dataset_path: &str, name: &str) -> Result<u64, StoreError> {
        self.data
            .read()
            .unwrap()
            .attributes
            .get(&(dataset_path.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| StoreError::AttributeNotFound {
                path: dataset_path.to_string(),
                name: name.to_string(),
            })
    }
}

/// Iterate the contiguous rows of a hyperslab: every combination of the
/// leading axes, with the last axis forming one contiguous run.
fn for_each_run(
    shape: &Shape,
    selection: &Selection,
    width: usize,
    mut f: impl FnMut(usize, usize, usize),
) {
    if selection.is_empty() {
        return;
    }
    let dims = shape.dims();
    let rank = dims.len();

    // Element strides per axis, storage order.
    let mut strides = vec![1u64; rank];
    for axis in (0..rank.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }

    let run_len = selection.count[rank - 1] as usize * width;
    let mut index = selection.start.clone();
    let mut buf_offset = 0usize;
    loop {
        let elem_offset: u64 = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        f(elem_offset as usize * width, buf_offset, run_len);
        buf_offset += run_len;

        // Odometer over the leading axes.
        let mut axis = rank.wrapping_sub(2);
        loop {
            if axis == usize::MAX {
                return;
            }
            index[axis] += 1;
            if index[axis] < selection.start[axis] + selection.count[axis] {
                break;
            }
            index[axis] = selection.start[axis];
            axis = axis.wrapping_sub(1);
        }
    }
}

impl Dataset for MemoryDataset {
    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    fn read_slab(&self, selection: &Selection, buffer: &mut [u8]) -> Result<(), StoreError> {
        validate_selection(&self.shape, self.scalar_type, selection, buffer.len())?;
        let data = self.store.read().unwrap();
        let dset = data
            .datasets
            .get(&self.path)
            .ok_or_else(|| StoreError::DatasetNotFound {
                path: self.path.clone(),
            })?;
        let width = self.scalar_type.byte_width();
        for_each_run(&self.shape, selection, width, |src, dst, len| {
            buffer[dst..dst + len].copy_from_slice(&dset.bytes[src..src + len]);
        });
        Ok(())
    }

    fn write_slab(&self, selection: &Selection, buffer: &[u8]) -> Result<(), StoreError> {
        validate_selection(&self.shape, self.scalar_type, selection, buffer.len())?;
        let mut data = self.store.write().unwrap();
        let dset = data
            .datasets
            .get_mut(&self.path)
            .ok_or_else(|| StoreError::DatasetNotFound {
                path: self.path.clone(),
            })?;
        let width = self.scalar_type.byte_width();
        for_each_run(&self.shape, selection, width, |dst, src, len| {
            dset.bytes[dst..dst + len].copy_from_slice(&buffer[src..src + len]);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_dataset("/entry/values", Shape::new(vec![4, 3]), ScalarType::F64);
        // Fill with 0.0, 1.0, ... row-major.
        let dset = store.dataset("/entry/values").unwrap();
        let values: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        dset.write_slab(&Selection::new(vec![0, 0], vec![4, 3]), &bytes)
            .unwrap();
        store
    }

    fn read_f64(dset: &MemoryDataset, sel: &Selection) -> Vec<f64> {
        let mut buf = vec![0u8; sel.element_count() as usize * 8];
        dset.read_slab(sel, &mut buf).unwrap();
        buf.chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn reads_interior_hyperslab() {
        let store = f64_store();
        let dset = store.dataset("/entry/values").unwrap();
        // Rows 1..3, columns 1..3.
        let sel = Selection::new(vec![1, 1], vec![2, 2]);
        assert_eq!(read_f64(&dset, &sel), vec![4.0, 5.0, 7.0, 8.0]);
    }

    #[test]
    fn writes_are_visible_to_other_handles() {
        let store = f64_store();
        let writer = store.dataset("/entry/values").unwrap();
        let reader = store.dataset("/entry/values").unwrap();

        let sel = Selection::new(vec![0, 0], vec![1, 3]);
        let bytes: Vec<u8> = [9.0f64, 9.0, 9.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        writer.write_slab(&sel, &bytes).unwrap();
        assert_eq!(read_f64(&reader, &sel), vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn empty_selection_reads_nothing() {
        let store = f64_store();
        let dset = store.dataset("/entry/values").unwrap();
        let sel = Selection::new(vec![4, 0], vec![0, 3]);
        let mut buf = [];
        dset.read_slab(&sel, &mut buf).unwrap();
    }

    #[test]
    fn missing_dataset() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.dataset("/nope"),
            Err(StoreError::DatasetNotFound { .. })
        ));
    }

    #[test]
    fn attribute_round_trip() {
        let store = MemoryStore::new();
        store.create_dataset("/entry/peak_x", Shape::new(vec![2, 8]), ScalarType::F64);
        store.set_attribute_u64("/entry/peak_x", "max_peaks", 8);
        assert_eq!(store.attribute_u64("/entry/peak_x", "max_peaks").unwrap(), 8);
        assert!(matches!(
            store.attribute_u64("/entry/peak_x", "missing"),
            Err(StoreError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn deep_clone_is_independent() {
        let store = f64_store();
        let copy = store.deep_clone();
        let dset = store.dataset("/entry/values").unwrap();
        let sel = Selection::new(vec![0, 0], vec![1, 1]);
        dset.write_slab(&sel, &f64::to_ne_bytes(77.0)).unwrap();

        let copied = copy.dataset("/entry/values").unwrap();
        assert_eq!(read_f64(&copied, &sel), vec![0.0]);
    }

    #[test]
    fn copy_from_is_visible_through_existing_handles() {
        let source = f64_store();
        let target = MemoryStore::new();
        let target_handle = target.clone();

        target.copy_from(&source);
        let dset = target_handle.dataset("/entry/values").unwrap();
        let sel = Selection::new(vec![0, 0], vec![1, 1]);
        assert_eq!(read_f64(&dset, &sel), vec![0.0]);
    }

    #[test]
    fn buffer_mismatch_is_fatal() {
        let store = f64_store();
        let dset = store.dataset("/entry/values").unwrap();
        let sel = Selection::new(vec![0, 0], vec![1, 3]);
        let mut short = vec![0u8; 8];
        assert!(matches!(
            dset.read_slab(&sel, &mut short),
            Err(StoreError::BufferSizeMismatch { .. })
        ));
    }
}
