//! Pluggable compression engine.
//!
//! Defines the [`Codec`] trait the pipeline drives, and the bundled
//! [`Lz4Codec`] backend. Codecs receive frame buffers in **codec order**
//! (fastest-varying axis first) together with the peak-coordinate side
//! channel, and must write results into storage distinct from their inputs.
//!
//! A codec is configured once per run from a declarative JSON option tree;
//! the harness injects one fixed option pair on top of the file
//! (`metrics.plugins = ["size", "time"]`) so every engine exposes size and
//! timing figures for the per-chunk diagnostic records.

mod lz4;

pub use lz4::Lz4Codec;

use roibench_types::{PeakIndex, ScalarType, Shape};
use thiserror::Error;

/// Errors from codec configuration and (de)compression.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid codec options: {0}")]
    BadOptions(String),

    #[error("corrupt compressed stream: {0}")]
    Corrupt(String),

    #[error("scratch buffer shape {actual} does not match compressed payload {expected}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("codec backend error: {0}")]
    Backend(String),
}

impl CodecError {
    /// Exit code propagated by the coordinated-abort path.
    pub fn exit_code(&self) -> i32 {
        match self {
            CodecError::BadOptions(_) => 2,
            CodecError::Corrupt(_) => 3,
            CodecError::ShapeMismatch { .. } => 4,
            CodecError::Backend(_) => 5,
        }
    }
}

/// A borrowed frame buffer handed to the codec, codec-order shape.
#[derive(Debug)]
pub struct FrameSlab<'a> {
    pub bytes: &'a [u8],
    pub shape: Shape,
    pub scalar_type: ScalarType,
}

/// A mutable scratch buffer decompression restores into.
#[derive(Debug)]
pub struct FrameSlabMut<'a> {
    pub bytes: &'a mut [u8],
    pub shape: Shape,
    pub scalar_type: ScalarType,
}

/// An owned compressed payload, carrying the original shape/type so
/// decompression can verify the scratch buffer it is asked to fill.
#[derive(Debug, Clone)]
pub struct CompressedBuf {
    pub bytes: Vec<u8>,
    pub shape: Shape,
    pub scalar_type: ScalarType,
}

impl CompressedBuf {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The compression engine the pipeline drives.
///
/// The round-trip contract is about structure, not bytes: decompression
/// must restore the declared shape and scalar type, but engines may be
/// lossy about values. The bundled LZ4 backend happens to be lossless.
pub trait Codec {
    /// Short engine name for logs and diagnostic file content.
    fn name(&self) -> &'static str;

    /// Apply a declarative option tree (a JSON object).
    fn set_options(&mut self, options: &serde_json::Value) -> Result<(), CodecError>;

    /// Compress a frame slab, biased by the peak side channel.
    ///
    /// The returned buffer never aliases `frames`.
    fn compress(
        &mut self,
        frames: &FrameSlab<'_>,
        peaks: &PeakIndex,
    ) -> Result<CompressedBuf, CodecError>;

    /// Restore a compressed payload into `scratch`.
    fn decompress(
        &mut self,
        compressed: &CompressedBuf,
        scratch: &mut FrameSlabMut<'_>,
    ) -> Result<(), CodecError>;

    /// Structured record of the engine's own size/time measurements,
    /// covering the most recent operations.
    fn metrics(&self) -> serde_json::Value;
}
