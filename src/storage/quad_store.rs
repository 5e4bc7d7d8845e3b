use std::hash::BuildHasherDefault;

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use realms_core::{ChunkPos, DimensionId, QuadPos};

use super::{StorageError, Submap};

/// The persisted members of a quad.
///
/// A record may hold fewer than four members: only the members that have been resident at
/// some point are ever written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QuadRecord {
    members: SmallVec<[(ChunkPos, Submap); 4]>,
}

impl QuadRecord {
    /// Returns the persisted submap at the provided position.
    pub fn get(&self, pos: ChunkPos) -> Option<&Submap> {
        self.members.iter().find(|(p, _)| *p == pos).map(|(_, s)| s)
    }

    /// Inserts or replaces a member.
    pub fn insert(&mut self, pos: ChunkPos, submap: Submap) {
        match self.members.iter_mut().find(|(p, _)| *p == pos) {
            Some((_, slot)) => *slot = submap,
            None => self.members.push((pos, submap)),
        }
    }

    /// Returns the number of persisted members.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns whether no member is persisted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The backing store of a [`MapBufferRegistry`](super::MapBufferRegistry).
///
/// A quad is the unit of persistence: a write replaces the whole record of the quad.
pub trait QuadStore {
    /// Reads the record of a quad. Returns `None` if the quad was never written.
    fn read_quad(
        &self,
        dimension: &DimensionId,
        quad: QuadPos,
    ) -> Result<Option<QuadRecord>, StorageError>;

    /// Replaces the record of a quad.
    fn write_quad(
        &mut self,
        dimension: &DimensionId,
        quad: QuadPos,
        record: QuadRecord,
    ) -> Result<(), StorageError>;
}

type Key = (DimensionId, QuadPos);

/// A [`QuadStore`] that keeps every record in memory.
///
/// Failures can be injected to exercise the error paths of the registry.
#[derive(Debug, Default)]
pub struct MemoryQuadStore {
    records: HashMap<Key, QuadRecord, BuildHasherDefault<FxHasher>>,
    corrupt: HashSet<Key, BuildHasherDefault<FxHasher>>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryQuadStore {
    /// Creates an empty [`MemoryQuadStore`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record of a quad without going through the error paths.
    #[inline]
    pub fn record(&self, dimension: &DimensionId, quad: QuadPos) -> Option<&QuadRecord> {
        self.records.get(&(dimension.clone(), quad))
    }

    /// Makes every subsequent read of the provided quad fail.
    pub fn mark_corrupt(&mut self, dimension: &DimensionId, quad: QuadPos) {
        self.corrupt.insert((dimension.clone(), quad));
    }

    /// Makes the provided quad readable again.
    pub fn repair(&mut self, dimension: &DimensionId, quad: QuadPos) {
        self.corrupt.remove(&(dimension.clone(), quad));
    }

    /// Makes every subsequent write fail (or succeed again).
    #[inline]
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Returns the number of successful writes.
    #[inline]
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl QuadStore for MemoryQuadStore {
    fn read_quad(
        &self,
        dimension: &DimensionId,
        quad: QuadPos,
    ) -> Result<Option<QuadRecord>, StorageError> {
        let key = (dimension.clone(), quad);
        if self.corrupt.contains(&key) {
            return Err(StorageError::CorruptQuad {
                dimension: dimension.clone(),
                quad,
            });
        }
        Ok(self.records.get(&key).cloned())
    }

    fn write_quad(
        &mut self,
        dimension: &DimensionId,
        quad: QuadPos,
        record: QuadRecord,
    ) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed {
                dimension: dimension.clone(),
                quad,
                reason: "writes are disabled".to_owned(),
            });
        }
        self.records.insert((dimension.clone(), quad), record);
        self.writes += 1;
        Ok(())
    }
}
