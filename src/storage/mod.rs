//! Per-dimension storage of submaps.
//!
//! The [`ResidencyManager`](crate::residency::ResidencyManager) only sees the [`MapStorage`]
//! trait. [`MapBufferRegistry`] is the implementation the game uses.

use thiserror::Error;

use realms_core::{ChunkPos, DimensionId, QuadPos};

mod buffers;
pub use buffers::*;

mod quad_store;
pub use quad_store::*;

mod registry;
pub use registry::*;

/// An error that might occur while moving submaps between memory and the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The persisted record of a quad could not be decoded.
    #[error("quad {quad} of dimension {dimension} is corrupt")]
    CorruptQuad {
        dimension: DimensionId,
        quad: QuadPos,
    },
    /// The record of a quad could not be written.
    #[error("failed to write quad {quad} of dimension {dimension}: {reason}")]
    WriteFailed {
        dimension: DimensionId,
        quad: QuadPos,
        reason: String,
    },
}

/// The storage operations the residency manager relies on.
///
/// Implementations must never drop a member of a quad from memory without persisting the
/// resident members of that quad first.
pub trait MapStorage {
    /// Makes sure the provided chunk of the provided dimension is resident.
    fn ensure_loaded(&mut self, dimension: &DimensionId, pos: ChunkPos) -> Result<(), StorageError>;

    /// Persists the resident members of a quad, then drops all of them from memory.
    ///
    /// Members that are not resident are left as they are in the backing store. If the write
    /// fails, nothing is dropped.
    fn evict_quad(&mut self, dimension: &DimensionId, quad: QuadPos) -> Result<(), StorageError>;

    /// Returns the dimension currently merged into the live simulation.
    fn primary(&self) -> &DimensionId;

    /// Returns the buffers of the provided dimension, if it has any.
    fn get(&self, dimension: &DimensionId) -> Option<&DimensionBuffers>;
}
