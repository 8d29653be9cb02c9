//! Reusable slab buffers with separate capacity and logical length.
//!
//! Each rank owns one buffer per stream (peak counts, positions, frames)
//! and reuses it across iterations. The final chunk of a run is usually
//! shorter than the rest, so the buffer tracks a logical length distinct
//! from its fixed capacity; all slicing goes through the logical prefix.

use thiserror::Error;

/// Error raised when a logical length would exceed the allocated capacity.
#[derive(Debug, Error)]
#[error("logical length {requested} exceeds buffer capacity {capacity}")]
pub struct CapacityExceeded {
    pub requested: usize,
    pub capacity: usize,
}

/// A fixed-capacity, reusable buffer of `T` with a movable logical length.
///
/// Allocated once at pipeline setup; never grows afterwards.
#[derive(Debug, Clone)]
pub struct SlabBuffer<T> {
    data: Vec<T>,
    logical: usize,
}

impl<T: Default + Clone> SlabBuffer<T> {
    /// Allocate a buffer of `capacity` elements, logical length equal to
    /// capacity.
    pub fn new(capacity: usize) -> Self {
        SlabBuffer {
            data: vec![T::default(); capacity],
            logical: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn logical_len(&self) -> usize {
        self.logical
    }

    /// Set the logical length for the current chunk.
    pub fn set_logical_len(&mut self, len: usize) -> Result<(), CapacityExceeded> {
        if len > self.data.len() {
            return Err(CapacityExceeded {
                requested: len,
                capacity: self.data.len(),
            });
        }
        self.logical = len;
        Ok(())
    }

    /// The logical prefix, immutable.
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.logical]
    }

    /// The logical prefix, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.logical]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_length_bounds_slices() {
        let mut buf: SlabBuffer<u64> = SlabBuffer::new(8);
        assert_eq!(buf.as_slice().len(), 8);

        buf.set_logical_len(3).unwrap();
        assert_eq!(buf.as_slice().len(), 3);
        assert_eq!(buf.as_mut_slice().len(), 3);
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn rejects_over_capacity() {
        let mut buf: SlabBuffer<f32> = SlabBuffer::new(4);
        let err = buf.set_logical_len(5).unwrap_err();
        assert_eq!(err.requested, 5);
        assert_eq!(err.capacity, 4);
        // Logical length is unchanged after a failed resize.
        assert_eq!(buf.logical_len(), 4);
    }

    #[test]
    fn zero_logical_len_is_valid() {
        let mut buf: SlabBuffer<f64> = SlabBuffer::new(4);
        buf.set_logical_len(0).unwrap();
        assert!(buf.as_slice().is_empty());
    }
}
