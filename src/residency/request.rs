use std::hash::{Hash, Hasher};

use hashbrown::Equivalent;

use realms_core::{ChunkPos, DimensionId};

/// The kind of subsystem that issued a [`DemandRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DemandSource {
    /// The player's visible viewport (the "reality bubble").
    RealityBubble,
    /// A follower that must keep simulating when away from the player.
    Follower,
    /// A vehicle.
    Vehicle,
    /// Scripted content.
    Scripted,
    /// Anything else.
    Other,
}

/// Identifies a [`DemandRequest`] registered with a
/// [`ResidencyManager`](super::ResidencyManager).
///
/// Handles are never reused. Using a handle after its request has been released is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub(super) u64);

impl RequestHandle {
    /// Returns the raw value of the handle.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A box of chunks that a subsystem wants to keep resident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandRequest {
    /// Who asked for the chunks.
    pub source: DemandSource,
    /// The dimension the chunks belong to.
    pub dimension: DimensionId,
    /// The center of the box.
    ///
    /// Only the horizontal coordinates are used. The vertical extent of the box is given by
    /// `z_min` and `z_max`.
    pub center: ChunkPos,
    /// The horizontal half-extent of the box, in chunks.
    pub radius: u32,
    /// The lowest level of the box.
    pub z_min: i32,
    /// The highest level of the box.
    pub z_max: i32,
}

impl DemandRequest {
    /// Returns an iterator over every chunk of the box.
    ///
    /// The box is empty when `z_min > z_max`.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> {
        let r = i32::try_from(self.radius).unwrap_or(i32::MAX);
        let xs = self.center.x.saturating_sub(r)..=self.center.x.saturating_add(r);
        let ys = self.center.y.saturating_sub(r)..=self.center.y.saturating_add(r);
        let zs = self.z_min..=self.z_max;

        zs.flat_map(move |z| {
            let xs = xs.clone();
            ys.clone()
                .flat_map(move |y| xs.clone().map(move |x| ChunkPos::new(x, y, z)))
        })
    }

    /// Returns the number of chunks in the box.
    ///
    /// Saturates at `u64::MAX` for boxes too large to count.
    pub fn volume(&self) -> u64 {
        let side = 2 * u64::from(self.radius) + 1;
        let levels = (i64::from(self.z_max) - i64::from(self.z_min) + 1).max(0) as u64;
        side.saturating_mul(side).saturating_mul(levels)
    }

    /// Returns whether the provided chunk is part of the box.
    pub fn contains(&self, dimension: &DimensionId, pos: ChunkPos) -> bool {
        *dimension == self.dimension
            && (self.z_min..=self.z_max).contains(&pos.z)
            && pos.x.abs_diff(self.center.x) <= self.radius
            && pos.y.abs_diff(self.center.y) <= self.radius
    }
}

/// A chunk of a dimension: the unit of "should be resident".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DesiredKey {
    /// The dimension of the chunk.
    pub dimension: DimensionId,
    /// The position of the chunk.
    pub pos: ChunkPos,
}

impl DesiredKey {
    /// Creates a new [`DesiredKey`].
    #[inline]
    pub fn new(dimension: impl Into<DimensionId>, pos: ChunkPos) -> Self {
        Self {
            dimension: dimension.into(),
            pos,
        }
    }
}

/// A borrowed [`DesiredKey`], used to query sets without cloning the dimension id.
///
/// Hashes exactly like the owned key.
pub(super) struct KeyRef<'a> {
    pub dimension: &'a DimensionId,
    pub pos: ChunkPos,
}

impl Hash for KeyRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dimension.hash(state);
        self.pos.hash(state);
    }
}

impl Equivalent<DesiredKey> for KeyRef<'_> {
    #[inline]
    fn equivalent(&self, key: &DesiredKey) -> bool {
        *self.dimension == key.dimension && self.pos == key.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(radius: u32, z_min: i32, z_max: i32) -> DemandRequest {
        DemandRequest {
            source: DemandSource::Other,
            dimension: DimensionId::primary(),
            center: ChunkPos::new(-3, 2, 7),
            radius,
            z_min,
            z_max,
        }
    }

    #[test]
    fn chunks_match_volume_and_contains() {
        let req = request(2, -1, 1);
        let chunks: Vec<_> = req.chunks().collect();
        assert_eq!(chunks.len() as u64, req.volume());
        assert_eq!(req.volume(), 75);
        assert!(chunks
            .iter()
            .all(|&c| req.contains(&DimensionId::primary(), c)));
        assert!(!req.contains(&DimensionId::primary(), ChunkPos::new(0, 2, 0)));
        assert!(!req.contains(&DimensionId::new("other"), ChunkPos::new(-3, 2, 0)));
    }

    #[test]
    fn inverted_levels_are_empty() {
        let req = request(3, 1, 0);
        assert_eq!(req.chunks().count(), 0);
        assert_eq!(req.volume(), 0);
    }

    #[test]
    fn huge_boxes_saturate_their_volume() {
        let req = request(u32::MAX, i32::MIN, i32::MAX);
        assert_eq!(req.volume(), u64::MAX);

        let req = request(1 << 30, 0, 0);
        assert_eq!(req.volume(), (1u64 << 62) + (1u64 << 32) + 1);
        let req = request(1 << 30, 0, 3);
        assert_eq!(req.volume(), u64::MAX);
    }

    #[test]
    fn zero_radius_is_a_column() {
        let req = request(0, 0, 2);
        let chunks: Vec<_> = req.chunks().collect();
        assert_eq!(
            chunks,
            vec![
                ChunkPos::new(-3, 2, 0),
                ChunkPos::new(-3, 2, 1),
                ChunkPos::new(-3, 2, 2),
            ]
        );
    }
}
