//! Structured dataset store interface.
//!
//! Defines the [`EventStore`]/[`Dataset`] traits implemented by storage
//! backends (`roibench-store-memory` in this workspace; an HDF5-style
//! parallel store fits the same boundary). The store convention is
//! **storage order**: shapes and selections list the slowest-varying axis
//! first. The codec uses the opposite convention; [`Shape::reversed`] is
//! applied exactly once, at that boundary.
//!
//! Slab I/O is collective when the backing store is: every member of the
//! work group must issue the call each iteration, including ranks holding
//! an empty selection. Empty selections validate trivially and touch no
//! bytes.
//!
//! [`Shape::reversed`]: roibench_types::Shape::reversed

mod selection;

pub use selection::Selection;

use roibench_types::{ScalarType, Shape};
use thiserror::Error;

/// Errors from dataset access.
///
/// Selection/buffer mismatches are deliberately fatal: silently reshaping
/// a selection risks corrupting scientific data, so the engine escalates
/// them instead of correcting them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("attribute {name} not found on {path}")]
    AttributeNotFound { path: String, name: String },

    #[error("selection rank {selection_rank} does not match dataset rank {dataset_rank}")]
    RankMismatch {
        dataset_rank: usize,
        selection_rank: usize,
    },

    #[error("selection exceeds extent on axis {axis}: {end} > {extent}")]
    OutOfBounds { axis: usize, end: u64, extent: u64 },

    #[error("buffer holds {actual} bytes, selection requires {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("dataset is {actual}, engine requested {expected}")]
    TypeMismatch {
        expected: ScalarType,
        actual: ScalarType,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One dataset inside a store: a queryable shape/type plus slab I/O.
pub trait Dataset {
    /// Extents, storage order.
    fn shape(&self) -> Shape;

    /// Element type.
    fn scalar_type(&self) -> ScalarType;

    /// Read the selected hyperslab into `buffer` (raw native-order bytes,
    /// row-major in storage order). `buffer` must hold exactly the
    /// selection's byte count.
    fn read_slab(&self, selection: &Selection, buffer: &mut [u8]) -> Result<(), StoreError>;

    /// Write `buffer` over the selected hyperslab. Handles may share
    /// underlying storage; backends serialize concurrent access internally.
    fn write_slab(&self, selection: &Selection, buffer: &[u8]) -> Result<(), StoreError>;
}

/// A structured store holding named datasets and scalar attributes.
pub trait EventStore {
    type Dataset: Dataset;

    /// Open a dataset by path.
    fn dataset(&self, path: &str) -> Result<Self::Dataset, StoreError>;

    /// Read a scalar `u64` attribute attached to a dataset.
    fn attribute_u64(&self, dataset_path: &str, name: &str) -> Result<u64, StoreError>;
}

/// Validate a selection against a dataset's shape and a caller buffer.
///
/// Shared by backends so they agree on which mismatches are fatal.
pub fn validate_selection(
    shape: &Shape,
    scalar_type: ScalarType,
    selection: &Selection,
    buffer_len: usize,
) -> Result<(), StoreError> {
    if selection.start.len() != shape.rank() || selection.count.len() != shape.rank() {
        return Err(StoreError::RankMismatch {
            dataset_rank: shape.rank(),
            selection_rank: selection.count.len(),
        });
    }
    for (axis, ((&start, &count), &extent)) in selection
        .start
        .iter()
        .zip(&selection.count)
        .zip(shape.dims())
        .enumerate()
    {
        // An empty selection is valid wherever it starts; a non-empty one
        // must fit inside the extent.
        if count > 0 && start + count > extent {
            return Err(StoreError::OutOfBounds {
                axis,
                end: start + count,
                extent,
            });
        }
    }
    let expected = selection.element_count() as usize * scalar_type.byte_width();
    if buffer_len != expected {
        return Err(StoreError::BufferSizeMismatch {
            expected,
            actual: buffer_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_matching_selection() {
        let shape = Shape::new(vec![10, 4]);
        let sel = Selection::new(vec![2, 0], vec![3, 4]);
        assert!(validate_selection(&shape, ScalarType::F64, &sel, 3 * 4 * 8).is_ok());
    }

    #[test]
    fn rejects_rank_mismatch() {
        let shape = Shape::new(vec![10, 4]);
        let sel = Selection::new(vec![2], vec![3]);
        assert!(matches!(
            validate_selection(&shape, ScalarType::F64, &sel, 24),
            Err(StoreError::RankMismatch { .. })
        ));
    }

    #[test]
    fn rejects_out_of_bounds() {
        let shape = Shape::new(vec![10]);
        let sel = Selection::new(vec![8], vec![3]);
        assert!(matches!(
            validate_selection(&shape, ScalarType::I64, &sel, 24),
            Err(StoreError::OutOfBounds {
                axis: 0,
                end: 11,
                extent: 10
            })
        ));
    }

    #[test]
    fn rejects_buffer_size_mismatch() {
        let shape = Shape::new(vec![10]);
        let sel = Selection::new(vec![0], vec![2]);
        assert!(matches!(
            validate_selection(&shape, ScalarType::F32, &sel, 9),
            Err(StoreError::BufferSizeMismatch {
                expected: 8,
                actual: 9
            })
        ));
    }

    #[test]
    fn empty_selection_is_valid_anywhere() {
        let shape = Shape::new(vec![10, 4]);
        // A rank past the end of the data still participates in collective
        // I/O with a zero-count selection.
        let sel = Selection::new(vec![12, 0], vec![0, 4]);
        assert!(validate_selection(&shape, ScalarType::F32, &sel, 0).is_ok());
    }
}
