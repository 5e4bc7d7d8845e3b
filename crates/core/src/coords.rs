use glam::{IVec2, IVec3};

use crate::utility::floor_div;

/// The side-length of a submap, in tiles.
pub const SUBMAP_SIZE: i32 = 12;

/// The side-length of an overmap terrain cell, in submaps.
///
/// The `OMT_SUBMAPS * OMT_SUBMAPS` submaps of a cell form one [`QuadPos`].
pub const OMT_SUBMAPS: i32 = 2;

/// The absolute position of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TilePos {
    /// The X coordinate of the tile.
    pub x: i32,
    /// The Y coordinate of the tile.
    pub y: i32,
    /// The vertical level of the tile.
    pub z: i32,
}

impl TilePos {
    /// Creates a new [`TilePos`] from the provided coordinates.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the submap that contains this tile.
    #[inline]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::from_scaled(self.as_ivec3(), SUBMAP_SIZE)
    }

    /// Returns the tile position as an [`IVec3`].
    #[inline]
    pub const fn as_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

/// The position of a submap (a chunk) within a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunkPos {
    /// The X coordinate of the chunk.
    pub x: i32,
    /// The Y coordinate of the chunk.
    pub y: i32,
    /// The vertical level of the chunk.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a new [`ChunkPos`] from the provided coordinates.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Converts a point expressed in a finer granularity into the chunk that contains it.
    ///
    /// `scale` is the number of finer units along one side of a chunk. The horizontal
    /// coordinates are floor-divided, the level is kept as-is.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is not strictly positive.
    #[inline]
    #[track_caller]
    pub const fn from_scaled(point: IVec3, scale: i32) -> Self {
        Self {
            x: floor_div(point.x, scale),
            y: floor_div(point.y, scale),
            z: point.z,
        }
    }

    /// Returns the absolute position of the first tile of the chunk.
    ///
    /// Tile coordinates saturate for chunks beyond `i32::MAX / SUBMAP_SIZE`.
    #[inline]
    pub const fn origin(self) -> TilePos {
        TilePos::new(
            self.x.saturating_mul(SUBMAP_SIZE),
            self.y.saturating_mul(SUBMAP_SIZE),
            self.z,
        )
    }

    /// Returns the overmap terrain cell that contains this chunk.
    #[inline]
    pub const fn omt(self) -> OmtPos {
        OmtPos::new(
            floor_div(self.x, OMT_SUBMAPS),
            floor_div(self.y, OMT_SUBMAPS),
            self.z,
        )
    }

    /// Returns the storage quad that this chunk is persisted with.
    #[inline]
    pub const fn quad(self) -> QuadPos {
        QuadPos(self.omt())
    }

    /// Returns a 2D vector that contains the horizontal coordinates of the chunk.
    #[inline]
    pub const fn xy(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }

    /// Returns the chunk position as an [`IVec3`].
    #[inline]
    pub const fn as_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl std::ops::Add<IVec3> for ChunkPos {
    type Output = Self;

    #[inline]
    fn add(self, rhs: IVec3) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub<IVec3> for ChunkPos {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: IVec3) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// The position of an overmap terrain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OmtPos {
    /// The X coordinate of the cell.
    pub x: i32,
    /// The Y coordinate of the cell.
    pub y: i32,
    /// The vertical level of the cell.
    pub z: i32,
}

impl OmtPos {
    /// Creates a new [`OmtPos`] from the provided coordinates.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk at the minimum corner of the cell.
    ///
    /// Saturates for cells beyond `i32::MAX / OMT_SUBMAPS`.
    #[inline]
    pub const fn first_chunk(self) -> ChunkPos {
        ChunkPos::new(
            self.x.saturating_mul(OMT_SUBMAPS),
            self.y.saturating_mul(OMT_SUBMAPS),
            self.z,
        )
    }

    /// Returns the chunks covered by this cell.
    pub fn chunks(self) -> [ChunkPos; 4] {
        let ChunkPos { x, y, z } = self.first_chunk();
        let (x1, y1) = (x.saturating_add(1), y.saturating_add(1));
        [
            ChunkPos::new(x, y, z),
            ChunkPos::new(x1, y, z),
            ChunkPos::new(x, y1, z),
            ChunkPos::new(x1, y1, z),
        ]
    }
}

/// A storage quad: the four chunks of one overmap terrain cell, persisted as a single unit.
///
/// Evicting only some of the members of a quad would drop state that the next write of the
/// quad file needs, so eviction always happens quad by quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuadPos(pub OmtPos);

impl QuadPos {
    /// Creates a new [`QuadPos`] from the coordinates of its overmap terrain cell.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(OmtPos::new(x, y, z))
    }

    /// Returns the overmap terrain cell of this quad.
    #[inline]
    pub const fn omt(self) -> OmtPos {
        self.0
    }

    /// Returns the four members of the quad.
    #[inline]
    pub fn members(self) -> [ChunkPos; 4] {
        self.0.chunks()
    }

    /// Returns whether the provided chunk is one of the members of this quad.
    #[inline]
    pub fn contains(self, pos: ChunkPos) -> bool {
        pos.quad() == self
    }
}

impl std::fmt::Display for QuadPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "quad({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}
