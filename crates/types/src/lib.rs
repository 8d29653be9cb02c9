//! Core value types for roibench.
//!
//! This crate provides the foundational types shared by the engine and its
//! collaborator backends:
//!
//! - **Scalar/shape types**: [`ScalarType`], [`Shape`] (with the storage-order
//!   vs codec-order axis convention)
//! - **Work units**: [`EventChunk`]
//! - **Peak side channel**: [`PeakCoordinate`], [`PeakIndex`]
//! - **Buffers**: [`SlabBuffer`] with separate capacity and logical length
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer.

mod buffer;
mod chunk;
mod peaks;
mod shape;

pub use buffer::{CapacityExceeded, SlabBuffer};
pub use chunk::EventChunk;
pub use peaks::{PeakCoordinate, PeakIndex};
pub use shape::{ScalarType, Shape};
