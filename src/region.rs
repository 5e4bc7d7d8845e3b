//! Finite extents of a dimension.

use glam::IVec3;
use serde::{Deserialize, Serialize};

use realms_core::{ChunkPos, OmtPos, TilePos, SUBMAP_SIZE};

/// The terrain substituted outside of a [`BoundedRegion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTerrain {
    /// The terrain of the synthesized tiles.
    pub tile: String,
    /// The overmap terrain reported for cells outside of the region.
    pub omt: String,
}

impl Default for BoundaryTerrain {
    fn default() -> Self {
        Self {
            tile: "t_pd_border".to_owned(),
            omt: "pd_border".to_owned(),
        }
    }
}

/// A rectangular prism of chunks, inclusive on every axis.
///
/// A dimension with bounds is spatially finite: chunks outside of it are never persisted, they
/// are synthesized as [`BoundaryTerrain`] and skip simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedRegion {
    min: ChunkPos,
    max: ChunkPos,
    boundary: BoundaryTerrain,
}

impl BoundedRegion {
    /// Creates a new [`BoundedRegion`] spanning from `a` to `b`.
    ///
    /// The corners may be given in any order.
    pub fn new(a: ChunkPos, b: ChunkPos, boundary: BoundaryTerrain) -> Self {
        Self {
            min: ChunkPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: ChunkPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
            boundary,
        }
    }

    /// Returns the minimum corner of the region.
    #[inline]
    pub fn min(&self) -> ChunkPos {
        self.min
    }

    /// Returns the maximum corner of the region.
    #[inline]
    pub fn max(&self) -> ChunkPos {
        self.max
    }

    /// Returns the terrain substituted outside of the region.
    #[inline]
    pub fn boundary(&self) -> &BoundaryTerrain {
        &self.boundary
    }

    /// Returns whether the provided chunk is part of the region.
    pub fn contains(&self, pos: ChunkPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Returns whether the provided point, expressed in units `scale` times finer than a chunk,
    /// is part of the region.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is not strictly positive.
    #[inline]
    #[track_caller]
    pub fn contains_at_finer_granularity(&self, point: IVec3, scale: i32) -> bool {
        self.contains(ChunkPos::from_scaled(point, scale))
    }

    /// Returns whether the provided tile is part of the region.
    #[inline]
    pub fn contains_tile(&self, pos: TilePos) -> bool {
        self.contains_at_finer_granularity(pos.as_ivec3(), SUBMAP_SIZE)
    }

    /// Returns whether a tile, given relative to the chunk `origin`, is part of the region.
    ///
    /// This is what map-local code uses: `local` may be negative or exceed the size of a chunk.
    pub fn contains_local(&self, origin: ChunkPos, local: IVec3) -> bool {
        // Computed in 64 bits: the absolute tile of a far-away chunk does not fit in an `i32`.
        let size = i64::from(SUBMAP_SIZE);
        let chunk = |origin: i32, local: i32| {
            (i64::from(origin) * size + i64::from(local)).div_euclid(size)
        };
        let within = |value: i64, min: i32, max: i32| {
            (i64::from(min)..=i64::from(max)).contains(&value)
        };

        within(chunk(origin.x, local.x), self.min.x, self.max.x)
            && within(chunk(origin.y, local.y), self.min.y, self.max.y)
            && within(
                i64::from(origin.z) + i64::from(local.z),
                self.min.z,
                self.max.z,
            )
    }

    /// Returns whether at least one submap of the provided overmap terrain cell is part of the
    /// region.
    pub fn contains_omt(&self, pos: OmtPos) -> bool {
        pos.chunks().into_iter().any(|c| self.contains(c))
    }
}
