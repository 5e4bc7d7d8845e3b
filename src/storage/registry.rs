use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use realms_core::{ChunkPos, DimensionId, OmtPos, QuadPos};

use super::{DimensionBuffers, MapStorage, MemoryQuadStore, QuadStore, StorageError, Submap};
use crate::region::BoundedRegion;

/// Owns the buffers of every dimension.
///
/// # Slots
///
/// The *primary* slot holds the buffers merged into the live simulation, tagged with the id of
/// the dimension they belong to. Every other dimension lives in its own *parked* slot. Moving a
/// dimension between the two is done wholesale by the
/// [`DimensionResidency`](crate::dimension::DimensionResidency) lifecycle.
pub struct MapBufferRegistry<Q = MemoryQuadStore> {
    /// The dimension the live simulation runs on.
    primary_id: DimensionId,
    /// The buffers merged into the live simulation.
    ///
    /// `None` between the capture of the active dimension and the restoration of the next one.
    primary: Option<DimensionBuffers>,
    /// The buffers of the dimensions that are not merged into the live simulation.
    parked: HashMap<DimensionId, DimensionBuffers, BuildHasherDefault<FxHasher>>,
    /// Where quads are persisted.
    store: Q,
}

impl<Q: QuadStore> MapBufferRegistry<Q> {
    /// Creates a new [`MapBufferRegistry`] whose primary slot holds an empty primary world.
    pub fn new(store: Q) -> Self {
        Self {
            primary_id: DimensionId::primary(),
            primary: Some(DimensionBuffers::default()),
            parked: HashMap::default(),
            store,
        }
    }

    /// Returns the backing store.
    #[inline]
    pub fn store(&self) -> &Q {
        &self.store
    }

    /// Returns the backing store.
    #[inline]
    pub fn store_mut(&mut self) -> &mut Q {
        &mut self.store
    }

    /// Returns the slot holding the provided dimension, if any.
    fn slot(&self, dimension: &DimensionId) -> Option<&DimensionBuffers> {
        match &self.primary {
            Some(buffers) if *dimension == self.primary_id => Some(buffers),
            _ => self.parked.get(dimension),
        }
    }

    /// Returns the slot holding the provided dimension, creating a parked one if needed.
    fn slot_mut(&mut self, dimension: &DimensionId) -> &mut DimensionBuffers {
        match &mut self.primary {
            Some(buffers) if *dimension == self.primary_id => buffers,
            _ => self.parked.entry(dimension.clone()).or_default(),
        }
    }

    /// Returns whether the registry holds buffers for the provided dimension.
    #[inline]
    pub fn has_slot(&self, dimension: &DimensionId) -> bool {
        self.slot(dimension).is_some()
    }

    /// Returns whether the provided dimension is the one merged into the primary slot.
    #[inline]
    pub fn is_active(&self, dimension: &DimensionId) -> bool {
        self.primary.is_some() && self.primary_id == *dimension
    }

    /// Returns whether the primary slot is empty.
    #[inline]
    pub fn primary_is_vacant(&self) -> bool {
        self.primary.is_none()
    }

    /// Returns the resident submap at the provided position.
    #[inline]
    pub fn submap(&self, dimension: &DimensionId, pos: ChunkPos) -> Option<&Submap> {
        self.slot(dimension)?.submaps.get(pos)
    }

    /// Returns the resident submap at the provided position.
    #[inline]
    pub fn submap_mut(&mut self, dimension: &DimensionId, pos: ChunkPos) -> Option<&mut Submap> {
        match &mut self.primary {
            Some(buffers) if *dimension == self.primary_id => buffers.submaps.get_mut(pos),
            _ => self.parked.get_mut(dimension)?.submaps.get_mut(pos),
        }
    }

    /// Returns the number of resident submaps of the provided dimension.
    #[inline]
    pub fn resident_count(&self, dimension: &DimensionId) -> usize {
        self.slot(dimension).map_or(0, |s| s.submaps.len())
    }

    /// Makes the provided dimension spatially finite.
    pub fn set_bounds(&mut self, dimension: &DimensionId, region: BoundedRegion) {
        self.slot_mut(dimension).bounds = Some(region);
    }

    /// Returns whether the simulation should run on the provided chunk.
    ///
    /// Chunks that are not resident, and chunks outside of the dimension's bounds, are skipped.
    pub fn should_simulate(&self, dimension: &DimensionId, pos: ChunkPos) -> bool {
        let Some(slot) = self.slot(dimension) else {
            return false;
        };

        slot.submaps.contains(pos) && slot.bounds.as_ref().map_or(true, |b| b.contains(pos))
    }

    /// Sets the overmap terrain of a cell.
    pub fn set_omt(&mut self, dimension: &DimensionId, pos: OmtPos, terrain: impl Into<String>) {
        self.slot_mut(dimension).overmap.set(pos, terrain);
    }

    /// Returns the overmap terrain of a cell.
    ///
    /// Cells entirely outside of the dimension's bounds report the boundary terrain.
    pub fn omt(&self, dimension: &DimensionId, pos: OmtPos) -> Option<&str> {
        let slot = self.slot(dimension)?;
        match &slot.bounds {
            Some(bounds) if !bounds.contains_omt(pos) => Some(bounds.boundary().omt.as_str()),
            _ => slot.overmap.get(pos),
        }
    }

    /// Persists every resident quad of the provided dimension, without evicting anything.
    ///
    /// Returns the number of quads written.
    #[profiling::function]
    pub fn save_dimension(&mut self, dimension: &DimensionId) -> Result<usize, StorageError> {
        let Some(slot) = self.slot(dimension) else {
            return Ok(0);
        };

        let mut records = Vec::new();
        for quad in slot.submaps.quads() {
            let members = persistable_members(slot, quad);
            if !members.is_empty() {
                records.push((quad, members));
            }
        }

        let count = records.len();
        for (quad, members) in records {
            self.write_members(dimension, quad, members)?;
        }

        realms_log::trace!("saved {count} quads of dimension {dimension}");
        Ok(count)
    }

    /// Merges the provided members into the persisted record of `quad`.
    fn write_members(
        &mut self,
        dimension: &DimensionId,
        quad: QuadPos,
        members: SmallVec<[(ChunkPos, Submap); 4]>,
    ) -> Result<(), StorageError> {
        let mut record = self.store.read_quad(dimension, quad)?.unwrap_or_default();
        for (pos, submap) in members {
            record.insert(pos, submap);
        }
        self.store.write_quad(dimension, quad, record)
    }

    /// Ensures the provided dimension has a slot, parked unless it is the active one.
    pub fn ensure_slot(&mut self, dimension: &DimensionId) {
        self.slot_mut(dimension);
    }

    /// Removes the buffers of the active dimension from the primary slot.
    ///
    /// Returns `None` if `dimension` is not the active one.
    pub fn take_primary(&mut self, dimension: &DimensionId) -> Option<DimensionBuffers> {
        if self.primary_id != *dimension {
            return None;
        }
        self.primary.take()
    }

    /// Installs the buffers of `dimension` into the primary slot, making it the active one.
    ///
    /// If the primary slot is occupied, the buffers are handed back.
    pub fn install_primary(
        &mut self,
        dimension: DimensionId,
        buffers: DimensionBuffers,
    ) -> Result<(), DimensionBuffers> {
        if self.primary.is_some() {
            return Err(buffers);
        }
        self.primary_id = dimension;
        self.primary = Some(buffers);
        Ok(())
    }

    /// Moves buffers into the parked slot of `dimension`.
    ///
    /// Entries that are already parked are replaced by the incoming ones.
    pub fn park(&mut self, dimension: DimensionId, buffers: DimensionBuffers) {
        self.parked.entry(dimension).or_default().overlay(buffers);
    }

    /// Moves buffers into whichever slot holds `dimension`, keeping the entries already there.
    pub fn absorb(&mut self, dimension: &DimensionId, buffers: DimensionBuffers) {
        self.slot_mut(dimension).underlay(buffers);
    }

    /// Removes the parked slot of `dimension`.
    #[inline]
    pub fn take_parked(&mut self, dimension: &DimensionId) -> Option<DimensionBuffers> {
        self.parked.remove(dimension)
    }

    /// Releases all the memory held for `dimension`, in the parked slot and in the primary slot
    /// if it is the active one.
    ///
    /// Nothing is persisted.
    pub fn remove_dimension(&mut self, dimension: &DimensionId) {
        self.parked.remove(dimension);
        if self.primary_id == *dimension {
            self.primary = None;
        }
    }
}

impl<Q: QuadStore> MapStorage for MapBufferRegistry<Q> {
    #[profiling::function]
    fn ensure_loaded(&mut self, dimension: &DimensionId, pos: ChunkPos) -> Result<(), StorageError> {
        let slot = self.slot_mut(dimension);
        if slot.submaps.contains(pos) {
            return Ok(());
        }

        if let Some(bounds) = &slot.bounds {
            if !bounds.contains(pos) {
                let submap = Submap::boundary(&bounds.boundary().tile);
                slot.submaps.insert(pos, submap);
                return Ok(());
            }
        }

        let record = self.store.read_quad(dimension, pos.quad())?;
        let submap = record
            .and_then(|r| r.get(pos).cloned())
            .unwrap_or_else(|| Submap::generate(pos));

        self.slot_mut(dimension).submaps.insert(pos, submap);
        Ok(())
    }

    #[profiling::function]
    fn evict_quad(&mut self, dimension: &DimensionId, quad: QuadPos) -> Result<(), StorageError> {
        let Some(slot) = self.slot(dimension) else {
            return Ok(());
        };

        let resident: SmallVec<[ChunkPos; 4]> = quad
            .members()
            .into_iter()
            .filter(|&pos| slot.submaps.contains(pos))
            .collect();

        if resident.is_empty() {
            return Ok(());
        }

        let members = persistable_members(slot, quad);
        if !members.is_empty() {
            self.write_members(dimension, quad, members)?;
        }

        let slot = self.slot_mut(dimension);
        for pos in resident {
            slot.submaps.remove(pos);
        }

        Ok(())
    }

    #[inline]
    fn primary(&self) -> &DimensionId {
        &self.primary_id
    }

    #[inline]
    fn get(&self, dimension: &DimensionId) -> Option<&DimensionBuffers> {
        self.slot(dimension)
    }
}

/// Clones the resident members of `quad` that must be persisted.
fn persistable_members(
    slot: &DimensionBuffers,
    quad: QuadPos,
) -> SmallVec<[(ChunkPos, Submap); 4]> {
    quad.members()
        .into_iter()
        .filter_map(|pos| Some((pos, slot.submaps.get(pos)?)))
        .filter(|(_, submap)| !submap.is_synthetic())
        .map(|(pos, submap)| (pos, submap.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::BoundaryTerrain;

    fn registry() -> MapBufferRegistry {
        MapBufferRegistry::new(MemoryQuadStore::new())
    }

    #[test]
    fn ensure_loaded_is_idempotent() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        let pos = ChunkPos::new(0, 0, 0);

        reg.ensure_loaded(&dim, pos).unwrap();
        reg.submap_mut(&dim, pos).unwrap().touch();
        reg.ensure_loaded(&dim, pos).unwrap();

        assert_eq!(reg.submap(&dim, pos).unwrap().revision, 1);
        assert_eq!(reg.resident_count(&dim), 1);
    }

    #[test]
    fn evicted_quads_come_back_with_their_state() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        let quad = QuadPos::new(0, 0, 0);

        for pos in quad.members() {
            reg.ensure_loaded(&dim, pos).unwrap();
        }
        reg.submap_mut(&dim, ChunkPos::new(1, 1, 0)).unwrap().touch();

        reg.evict_quad(&dim, quad).unwrap();
        assert_eq!(reg.resident_count(&dim), 0);
        assert_eq!(reg.store().record(&dim, quad).unwrap().len(), 4);

        reg.ensure_loaded(&dim, ChunkPos::new(1, 1, 0)).unwrap();
        assert_eq!(reg.submap(&dim, ChunkPos::new(1, 1, 0)).unwrap().revision, 1);
    }

    #[test]
    fn partial_quads_do_not_invent_members() {
        let mut reg = registry();
        let dim = DimensionId::new("pocket");
        let quad = QuadPos::new(0, 0, 0);

        reg.ensure_loaded(&dim, ChunkPos::new(0, 0, 0)).unwrap();
        reg.evict_quad(&dim, quad).unwrap();

        let record = reg.store().record(&dim, quad).unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.get(ChunkPos::new(0, 0, 0)).is_some());
        assert!(record.get(ChunkPos::new(1, 0, 0)).is_none());
    }

    #[test]
    fn eviction_keeps_persisted_members_that_are_not_resident() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        let quad = QuadPos::new(0, 0, 0);
        let a = ChunkPos::new(0, 0, 0);
        let b = ChunkPos::new(1, 0, 0);

        reg.ensure_loaded(&dim, a).unwrap();
        reg.ensure_loaded(&dim, b).unwrap();
        reg.submap_mut(&dim, a).unwrap().touch();
        reg.evict_quad(&dim, quad).unwrap();

        // Only `b` comes back, and leaves again.
        reg.ensure_loaded(&dim, b).unwrap();
        reg.evict_quad(&dim, quad).unwrap();

        let record = reg.store().record(&dim, quad).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get(a).unwrap().revision, 1);
    }

    #[test]
    fn failed_write_drops_nothing() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        let quad = QuadPos::new(0, 0, 0);
        for pos in quad.members() {
            reg.ensure_loaded(&dim, pos).unwrap();
        }

        reg.store_mut().set_fail_writes(true);
        assert!(matches!(
            reg.evict_quad(&dim, quad),
            Err(StorageError::WriteFailed { .. })
        ));
        assert_eq!(reg.resident_count(&dim), 4);
    }

    #[test]
    fn corrupt_quads_fail_to_load() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        reg.store_mut().mark_corrupt(&dim, QuadPos::new(0, 0, 0));

        assert_eq!(
            reg.ensure_loaded(&dim, ChunkPos::new(1, 0, 0)),
            Err(StorageError::CorruptQuad {
                dimension: dim.clone(),
                quad: QuadPos::new(0, 0, 0),
            })
        );
        assert_eq!(reg.resident_count(&dim), 0);
    }

    #[test]
    fn chunks_outside_bounds_are_synthesized_and_never_persisted() {
        let mut reg = registry();
        let dim = DimensionId::new("pocket");
        reg.set_bounds(
            &dim,
            BoundedRegion::new(
                ChunkPos::new(0, 0, 0),
                ChunkPos::new(0, 0, 0),
                BoundaryTerrain::default(),
            ),
        );

        let inside = ChunkPos::new(0, 0, 0);
        let outside = ChunkPos::new(1, 0, 0);
        reg.ensure_loaded(&dim, inside).unwrap();
        reg.ensure_loaded(&dim, outside).unwrap();

        assert!(reg.submap(&dim, outside).unwrap().is_synthetic());
        assert_eq!(reg.submap(&dim, outside).unwrap().terrain, "t_pd_border");
        assert!(reg.should_simulate(&dim, inside));
        assert!(!reg.should_simulate(&dim, outside));

        reg.evict_quad(&dim, QuadPos::new(0, 0, 0)).unwrap();
        let record = reg.store().record(&dim, QuadPos::new(0, 0, 0)).unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.get(outside).is_none());
        assert_eq!(reg.resident_count(&dim), 0);
    }

    #[test]
    fn omt_outside_bounds_reports_boundary() {
        let mut reg = registry();
        let dim = DimensionId::new("pocket");
        reg.set_bounds(
            &dim,
            BoundedRegion::new(
                ChunkPos::new(0, 0, 0),
                ChunkPos::new(1, 1, 0),
                BoundaryTerrain::default(),
            ),
        );
        reg.set_omt(&dim, OmtPos::new(0, 0, 0), "field");

        assert_eq!(reg.omt(&dim, OmtPos::new(0, 0, 0)), Some("field"));
        assert_eq!(reg.omt(&dim, OmtPos::new(1, 0, 0)), Some("pd_border"));
    }

    #[test]
    fn dimensions_do_not_share_coordinates() {
        let mut reg = registry();
        let pos = ChunkPos::new(0, 0, 0);
        let primary = DimensionId::primary();
        let pocket = DimensionId::new("pocket");

        reg.ensure_loaded(&primary, pos).unwrap();
        reg.submap_mut(&primary, pos).unwrap().touch();
        reg.ensure_loaded(&pocket, pos).unwrap();

        assert_eq!(reg.submap(&pocket, pos).unwrap().revision, 0);
        assert_eq!(reg.submap(&primary, pos).unwrap().revision, 1);
    }

    #[test]
    fn save_dimension_writes_without_evicting() {
        let mut reg = registry();
        let dim = DimensionId::primary();
        reg.ensure_loaded(&dim, ChunkPos::new(0, 0, 0)).unwrap();
        reg.ensure_loaded(&dim, ChunkPos::new(5, 0, 0)).unwrap();

        assert_eq!(reg.save_dimension(&dim), Ok(2));
        assert_eq!(reg.resident_count(&dim), 2);
        assert_eq!(reg.store().write_count(), 2);
    }
}
