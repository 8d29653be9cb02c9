//! Fault-injection and recording fakes for the store and codec seams.

use roibench_codec::{Codec, CodecError, CompressedBuf, FrameSlab, FrameSlabMut};
use roibench_store::{Dataset, EventStore, Selection, StoreError};
use roibench_types::{PeakIndex, ScalarType, Shape};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a store so every read and/or write fails with a backend error.
#[derive(Clone)]
pub struct FailingStore<S> {
    inner: S,
    fail_reads: bool,
    fail_writes: bool,
}

impl<S> FailingStore<S> {
    /// Pass-through wrapper; nothing fails.
    pub fn passthrough(inner: S) -> Self {
        FailingStore {
            inner,
            fail_reads: false,
            fail_writes: false,
        }
    }

    pub fn failing_writes(inner: S) -> Self {
        FailingStore {
            inner,
            fail_reads: false,
            fail_writes: true,
        }
    }

    pub fn failing_reads(inner: S) -> Self {
        FailingStore {
            inner,
            fail_reads: true,
            fail_writes: false,
        }
    }
}

pub struct FailingDataset<D> {
    inner: D,
    fail_reads: bool,
    fail_writes: bool,
}

impl<D: Dataset> Dataset for FailingDataset<D> {
    fn shape(&self) -> Shape {
        self.inner.shape()
    }

    fn scalar_type(&self) -> ScalarType {
        self.inner.scalar_type()
    }

    fn read_slab(&self, selection: &Selection, buffer: &mut [u8]) -> Result<(), StoreError> {
        if self.fail_reads {
            return Err(StoreError::Backend("injected read failure".into()));
        }
        self.inner.read_slab(selection, buffer)
    }

    fn write_slab(&self, selection: &Selection, buffer: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.inner.write_slab(selection, buffer)
    }
}

impl<S: EventStore> EventStore for FailingStore<S> {
    type Dataset = FailingDataset<S::Dataset>;

    fn dataset(&self, path: &str) -> Result<Self::Dataset, StoreError> {
        Ok(FailingDataset {
            inner: self.inner.dataset(path)?,
            fail_reads: self.fail_reads,
            fail_writes: self.fail_writes,
        })
    }

    fn attribute_u64(&self, dataset_path: &str, name: &str) -> Result<u64, StoreError> {
        self.inner.attribute_u64(dataset_path, name)
    }
}

/// Wraps a codec and counts compress/decompress invocations.
pub struct CountingCodec<C> {
    inner: C,
    compressions: Arc<AtomicUsize>,
    decompressions: Arc<AtomicUsize>,
}

impl<C: Codec> CountingCodec<C> {
    pub fn new(inner: C) -> Self {
        CountingCodec {
            inner,
            compressions: Arc::new(AtomicUsize::new(0)),
            decompressions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared compress counter; clones observe later calls.
    pub fn compressions(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.compressions)
    }

    /// Shared decompress counter; clones observe later calls.
    pub fn decompressions(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.decompressions)
    }
}

impl<C: Codec> Codec for CountingCodec<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn set_options(&mut self, options: &serde_json::Value) -> Result<(), CodecError> {
        self.inner.set_options(options)
    }

    fn compress(
        &mut self,
        frames: &FrameSlab<'_>,
        peaks: &PeakIndex,
    ) -> Result<CompressedBuf, CodecError> {
        self.compressions.fetch_add(1, Ordering::SeqCst);
        self.inner.compress(frames, peaks)
    }

    fn decompress(
        &mut self,
        compressed: &CompressedBuf,
        scratch: &mut FrameSlabMut<'_>,
    ) -> Result<(), CodecError> {
        self.decompressions.fetch_add(1, Ordering::SeqCst);
        self.inner.decompress(compressed, scratch)
    }

    fn metrics(&self) -> serde_json::Value {
        self.inner.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roibench_codec::Lz4Codec;
    use roibench_store_memory::MemoryStore;

    #[test]
    fn failing_writes_pass_reads_through() {
        let store = MemoryStore::new();
        store.create_dataset("/data/frames", Shape::new(vec![2, 2]), ScalarType::F32);
        let failing = FailingStore::failing_writes(store);

        let dset = failing.dataset("/data/frames").unwrap();
        let mut buf = vec![0u8; 16];
        assert!(dset
            .read_slab(&Selection::new(vec![0, 0], vec![2, 2]), &mut buf)
            .is_ok());
        assert!(matches!(
            dset.write_slab(&Selection::new(vec![0, 0], vec![2, 2]), &buf),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn counting_codec_counts() {
        let mut codec = CountingCodec::new(Lz4Codec::new());
        let compressions = codec.compressions();
        let bytes: Vec<u8> = (0..64u8).collect();
        codec
            .compress(
                &FrameSlab {
                    bytes: &bytes,
                    shape: Shape::new(vec![16]),
                    scalar_type: ScalarType::F32,
                },
                &PeakIndex::default(),
            )
            .unwrap();
        assert_eq!(compressions.load(Ordering::SeqCst), 1);
    }
}
