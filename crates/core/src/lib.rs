//! This crate defines the coordinate types shared by every part of Realms, such as
//! [`ChunkPos`], [`QuadPos`] and [`DimensionId`].
//!
//! # Granularities
//!
//! From the finest to the coarsest:
//!
//! - [`TilePos`]: a single tile.
//! - [`ChunkPos`]: a submap, [`SUBMAP_SIZE`] tiles wide.
//! - [`OmtPos`] / [`QuadPos`]: an overmap terrain cell, [`OMT_SUBMAPS`] submaps wide. The four
//!   submaps of a cell are persisted together as a single quad.
//!
//! The X and Y axes are horizontal. The Z axis is the vertical level and is never scaled.

mod coords;
pub use coords::*;

mod dimension;
pub use dimension::*;

pub mod utility;
