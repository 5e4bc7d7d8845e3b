use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use realms_core::{ChunkPos, OmtPos, QuadPos};

use crate::region::BoundedRegion;

/// The content of a single submap.
///
/// What a submap actually holds is owned by the simulation. The registry only needs to move it
/// around and persist it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submap {
    /// The terrain that fills the submap.
    pub terrain: String,
    /// Incremented every time the simulation modifies the submap.
    pub revision: u32,
    /// Whether the submap was synthesized outside of a bounded region.
    ///
    /// Synthetic submaps are never persisted.
    #[serde(skip)]
    synthetic: bool,
}

impl Submap {
    /// Creates a fresh submap for a chunk that has never been persisted.
    pub fn generate(pos: ChunkPos) -> Self {
        let terrain = match pos.z {
            z if z > 0 => "t_open_air",
            0 => "t_grass",
            _ => "t_rock",
        };

        Self {
            terrain: terrain.to_owned(),
            revision: 0,
            synthetic: false,
        }
    }

    /// Creates a boundary submap, filled with the provided terrain.
    pub fn boundary(terrain: &str) -> Self {
        Self {
            terrain: terrain.to_owned(),
            revision: 0,
            synthetic: true,
        }
    }

    /// Returns whether the submap was synthesized outside of a bounded region.
    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Marks the submap as modified by the simulation.
    #[inline]
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

type FxHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// The submaps of a dimension that are resident in memory.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapBuffer {
    submaps: FxHashMap<ChunkPos, Submap>,
}

impl MapBuffer {
    /// Returns the submap at the provided position, if it is resident.
    #[inline]
    pub fn get(&self, pos: ChunkPos) -> Option<&Submap> {
        self.submaps.get(&pos)
    }

    /// Returns the submap at the provided position, if it is resident.
    #[inline]
    pub fn get_mut(&mut self, pos: ChunkPos) -> Option<&mut Submap> {
        self.submaps.get_mut(&pos)
    }

    /// Returns whether the submap at the provided position is resident.
    #[inline]
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.submaps.contains_key(&pos)
    }

    /// Inserts a submap, returning the one it replaced.
    #[inline]
    pub fn insert(&mut self, pos: ChunkPos, submap: Submap) -> Option<Submap> {
        self.submaps.insert(pos, submap)
    }

    /// Removes a submap from memory.
    #[inline]
    pub fn remove(&mut self, pos: ChunkPos) -> Option<Submap> {
        self.submaps.remove(&pos)
    }

    /// Returns the number of resident submaps.
    #[inline]
    pub fn len(&self) -> usize {
        self.submaps.len()
    }

    /// Returns whether no submap is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.submaps.is_empty()
    }

    /// Returns an iterator over the resident submaps.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (ChunkPos, &Submap)> {
        self.submaps.iter().map(|(&pos, submap)| (pos, submap))
    }

    /// Returns the quads that have at least one resident member, sorted.
    pub fn quads(&self) -> Vec<QuadPos> {
        let mut quads: Vec<QuadPos> = self.submaps.keys().map(|pos| pos.quad()).collect();
        quads.sort_unstable();
        quads.dedup();
        quads
    }
}

/// The overmap terrain known for a dimension.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OvermapBuffer {
    terrain: FxHashMap<OmtPos, String>,
}

impl OvermapBuffer {
    /// Returns the terrain of the provided cell, if known.
    #[inline]
    pub fn get(&self, pos: OmtPos) -> Option<&str> {
        self.terrain.get(&pos).map(String::as_str)
    }

    /// Sets the terrain of the provided cell.
    #[inline]
    pub fn set(&mut self, pos: OmtPos, terrain: impl Into<String>) {
        self.terrain.insert(pos, terrain.into());
    }

    /// Returns the number of known cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.terrain.len()
    }

    /// Returns whether no cell is known.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terrain.is_empty()
    }
}

/// Everything the registry holds for one dimension.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DimensionBuffers {
    /// The resident submaps.
    pub submaps: MapBuffer,
    /// The overmap terrain.
    pub overmap: OvermapBuffer,
    /// The extent of the dimension, if it is finite.
    #[serde(default)]
    pub bounds: Option<BoundedRegion>,
}

impl DimensionBuffers {
    /// Returns whether the buffers hold nothing at all.
    pub fn is_empty(&self) -> bool {
        self.submaps.is_empty() && self.overmap.is_empty() && self.bounds.is_none()
    }

    /// Moves the content of `other` into `self`. Entries of `other` replace existing ones.
    pub fn overlay(&mut self, other: DimensionBuffers) {
        self.submaps.submaps.extend(other.submaps.submaps);
        self.overmap.terrain.extend(other.overmap.terrain);
        if other.bounds.is_some() {
            self.bounds = other.bounds;
        }
    }

    /// Moves the content of `other` into `self`. Existing entries are kept.
    pub fn underlay(&mut self, other: DimensionBuffers) {
        for (pos, submap) in other.submaps.submaps {
            self.submaps.submaps.entry(pos).or_insert(submap);
        }
        for (pos, terrain) in other.overmap.terrain {
            self.overmap.terrain.entry(pos).or_insert(terrain);
        }
        if self.bounds.is_none() {
            self.bounds = other.bounds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_and_underlay_resolve_conflicts_differently() {
        let pos = ChunkPos::new(0, 0, 0);
        let mut old = Submap::generate(pos);
        old.terrain = "old".to_owned();
        let mut new = Submap::generate(pos);
        new.terrain = "new".to_owned();

        let mut a = DimensionBuffers::default();
        a.submaps.insert(pos, old.clone());
        let mut b = DimensionBuffers::default();
        b.submaps.insert(pos, new.clone());
        b.submaps.insert(ChunkPos::new(1, 0, 0), new.clone());

        let mut overlaid = a.clone();
        overlaid.overlay(b.clone());
        assert_eq!(overlaid.submaps.get(pos), Some(&new));
        assert_eq!(overlaid.submaps.len(), 2);

        let mut underlaid = a;
        underlaid.underlay(b);
        assert_eq!(underlaid.submaps.get(pos), Some(&old));
        assert_eq!(underlaid.submaps.len(), 2);
    }

    #[test]
    fn quads_are_deduplicated() {
        let mut buffer = MapBuffer::default();
        for pos in QuadPos::new(0, 0, 0).members() {
            buffer.insert(pos, Submap::generate(pos));
        }
        buffer.insert(ChunkPos::new(-1, 0, 0), Submap::generate(ChunkPos::new(-1, 0, 0)));
        assert_eq!(
            buffer.quads(),
            vec![QuadPos::new(-1, 0, 0), QuadPos::new(0, 0, 0)]
        );
    }
}
