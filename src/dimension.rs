//! Moving whole dimensions in and out of the primary slot.
//!
//! Switching the live simulation from one dimension to another does not go through the
//! chunk-by-chunk eviction of the [`ResidencyManager`](crate::residency::ResidencyManager).
//! Instead, the buffers of the outgoing dimension are parked wholesale with
//! [`DimensionResidency::capture_from_primary`], and the buffers of the incoming dimension are
//! moved into the primary slot with [`DimensionResidency::restore_to_primary`].

use std::fmt;

use thiserror::Error;

use realms_core::{ChunkPos, DimensionId};

use crate::storage::{DimensionBuffers, MapBufferRegistry, MapStorage, QuadStore, StorageError};

/// Where the buffers of a dimension currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResidencyState {
    /// The dimension holds no memory.
    Unloaded,
    /// The dimension has a parked slot in the registry.
    Loaded,
    /// The dimension's buffers are merged into the primary slot.
    ActiveInPrimary,
}

impl fmt::Display for ResidencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::ActiveInPrimary => "active in the primary slot",
        })
    }
}

/// The area an older save format used to capture around the player.
///
/// Buffers are now captured wholesale. The area is accepted for compatibility and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCaptureArea {
    /// The minimum corner of the area.
    pub min: ChunkPos,
    /// The maximum corner of the area.
    pub max: ChunkPos,
}

/// An error that might occur when a dimension is moved around.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation requires the dimension to be merged into the primary slot.
    #[error("dimension {0} is not active in the primary slot")]
    NotActive(DimensionId),
    /// The operation requires the dimension to be loaded.
    #[error("dimension {dimension} is {state}, expected it to be loaded")]
    NotLoaded {
        dimension: DimensionId,
        state: ResidencyState,
    },
    /// The primary slot already holds another dimension.
    #[error("the primary slot is occupied by dimension {0}")]
    PrimaryOccupied(DimensionId),
    /// The dimension is already merged into the primary slot, but tracked as if it were not.
    #[error("dimension {0} is already active in the primary slot")]
    AlreadyActive(DimensionId),
    /// Buffers loaded from an older save must be migrated first.
    #[error("dimension {0} still holds legacy buffers")]
    LegacyBuffersPending(DimensionId),
    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Buffers from an older save could not be decoded.
    #[error("failed to decode legacy buffers: {0}")]
    Legacy(#[from] ron::error::SpannedError),
}

/// The error returned by [`DimensionResidency::restore_to_primary`].
///
/// Restoring consumes the tracker. When it fails, nothing moved and the tracker is handed back.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RestoreError {
    /// The tracker, left in the state it had before the call.
    pub residency: DimensionResidency,
    /// What went wrong.
    #[source]
    pub error: LifecycleError,
}

impl From<RestoreError> for LifecycleError {
    #[inline]
    fn from(value: RestoreError) -> Self {
        value.error
    }
}

/// Tracks where the buffers of a dimension live, and moves them around.
#[derive(Debug)]
pub struct DimensionResidency {
    id: DimensionId,
    state: ResidencyState,
    /// Buffers read from an older save, not yet moved into the registry.
    legacy: Option<DimensionBuffers>,
}

impl DimensionResidency {
    /// Creates a new [`DimensionResidency`] for a dimension that holds no memory yet.
    pub fn new(id: impl Into<DimensionId>) -> Self {
        Self {
            id: id.into(),
            state: ResidencyState::Unloaded,
            legacy: None,
        }
    }

    /// Creates a new [`DimensionResidency`] for the dimension currently in the primary slot.
    pub fn active(id: impl Into<DimensionId>) -> Self {
        Self {
            id: id.into(),
            state: ResidencyState::ActiveInPrimary,
            legacy: None,
        }
    }

    /// Creates a new [`DimensionResidency`] from the buffers of an older save.
    ///
    /// The buffers must be moved into the registry with
    /// [`migrate_legacy_buffers`](Self::migrate_legacy_buffers) before anything else.
    pub fn from_legacy_ron(id: impl Into<DimensionId>, text: &str) -> Result<Self, LifecycleError> {
        let buffers: DimensionBuffers = ron::from_str(text)?;
        Ok(Self {
            id: id.into(),
            state: ResidencyState::Loaded,
            legacy: Some(buffers),
        })
    }

    /// Returns the id of the dimension.
    #[inline]
    pub fn id(&self) -> &DimensionId {
        &self.id
    }

    /// Returns where the buffers of the dimension currently live.
    #[inline]
    pub fn state(&self) -> ResidencyState {
        self.state
    }

    /// Returns whether buffers from an older save are waiting to be migrated.
    #[inline]
    pub fn has_legacy_buffers(&self) -> bool {
        self.legacy.is_some()
    }

    /// Logs a misuse of the lifecycle and hands the error back.
    fn misuse(&self, err: LifecycleError) -> LifecycleError {
        realms_log::error!("{err}");
        err
    }

    #[inline]
    fn hand_back(self, error: LifecycleError) -> RestoreError {
        RestoreError {
            residency: self,
            error,
        }
    }

    fn ensure_migrated(&self) -> Result<(), LifecycleError> {
        if self.legacy.is_some() {
            return Err(self.misuse(LifecycleError::LegacyBuffersPending(self.id.clone())));
        }
        Ok(())
    }

    /// Gives the dimension a parked slot in the registry.
    ///
    /// Does nothing if the dimension is already loaded or active. Fails if the dimension is
    /// tracked as unloaded while the registry holds it in the primary slot; such a dimension
    /// must be tracked with [`DimensionResidency::active`].
    pub fn load<Q: QuadStore>(
        &mut self,
        registry: &mut MapBufferRegistry<Q>,
    ) -> Result<(), LifecycleError> {
        self.ensure_migrated()?;

        if self.state == ResidencyState::Unloaded {
            if registry.is_active(&self.id) {
                return Err(self.misuse(LifecycleError::AlreadyActive(self.id.clone())));
            }

            registry.ensure_slot(&self.id);
            self.state = ResidencyState::Loaded;
            realms_log::trace!("loaded dimension {}", self.id);
        }

        Ok(())
    }

    /// Moves the buffers of the primary slot into the dimension's parked slot.
    ///
    /// The primary slot is left vacant, ready for another dimension to be restored into it.
    pub fn capture_from_primary<Q: QuadStore>(
        &mut self,
        registry: &mut MapBufferRegistry<Q>,
        legacy_area: Option<LegacyCaptureArea>,
    ) -> Result<(), LifecycleError> {
        self.ensure_migrated()?;

        if self.state != ResidencyState::ActiveInPrimary || registry.primary() != &self.id {
            return Err(self.misuse(LifecycleError::NotActive(self.id.clone())));
        }

        if let Some(area) = legacy_area {
            realms_log::trace!(
                "ignoring legacy capture area {}..{} of dimension {}",
                area.min,
                area.max,
                self.id,
            );
        }

        let Some(buffers) = registry.take_primary(&self.id) else {
            return Err(self.misuse(LifecycleError::NotActive(self.id.clone())));
        };

        let count = buffers.submaps.len();
        registry.park(self.id.clone(), buffers);
        self.state = ResidencyState::Loaded;

        realms_log::info!("captured dimension {} ({count} submaps)", self.id);
        Ok(())
    }

    /// Moves the dimension's parked slot into the vacant primary slot.
    ///
    /// The lifecycle of the dimension ends here: once active, the dimension is tracked again
    /// with [`DimensionResidency::active`]. On failure, the tracker is returned inside the
    /// [`RestoreError`].
    pub fn restore_to_primary<Q: QuadStore>(
        self,
        registry: &mut MapBufferRegistry<Q>,
    ) -> Result<(), RestoreError> {
        if let Err(error) = self.ensure_migrated() {
            return Err(self.hand_back(error));
        }

        if self.state != ResidencyState::Loaded {
            let error = self.misuse(LifecycleError::NotLoaded {
                dimension: self.id.clone(),
                state: self.state,
            });
            return Err(self.hand_back(error));
        }

        if !registry.primary_is_vacant() {
            let error = self.misuse(LifecycleError::PrimaryOccupied(registry.primary().clone()));
            return Err(self.hand_back(error));
        }

        let buffers = registry.take_parked(&self.id).unwrap_or_default();
        let count = buffers.submaps.len();
        if let Err(buffers) = registry.install_primary(self.id.clone(), buffers) {
            registry.park(self.id.clone(), buffers);
            let error = self.misuse(LifecycleError::PrimaryOccupied(registry.primary().clone()));
            return Err(self.hand_back(error));
        }

        realms_log::info!("restored dimension {} ({count} submaps)", self.id);
        Ok(())
    }

    /// Persists every resident quad of the dimension.
    ///
    /// Returns the number of quads written. Nothing is written for an unloaded dimension.
    pub fn save_state<Q: QuadStore>(
        &self,
        registry: &mut MapBufferRegistry<Q>,
    ) -> Result<usize, LifecycleError> {
        self.ensure_migrated()?;

        if self.state == ResidencyState::Unloaded {
            return Ok(0);
        }

        Ok(registry.save_dimension(&self.id)?)
    }

    /// Releases every buffer held for the dimension, without persisting anything.
    ///
    /// The primary slot is only cleared when the dimension is tracked as active in it. Does
    /// nothing if the dimension is already unloaded.
    pub fn unload<Q: QuadStore>(
        &mut self,
        registry: &mut MapBufferRegistry<Q>,
    ) -> Result<(), LifecycleError> {
        self.ensure_migrated()?;

        match self.state {
            ResidencyState::Unloaded => return Ok(()),
            ResidencyState::Loaded => {
                registry.take_parked(&self.id);
            }
            ResidencyState::ActiveInPrimary => registry.remove_dimension(&self.id),
        }

        self.state = ResidencyState::Unloaded;
        realms_log::trace!("unloaded dimension {}", self.id);
        Ok(())
    }

    /// Moves the buffers of an older save into the registry.
    ///
    /// Entries already resident in the registry are kept. Does nothing if there is nothing to
    /// migrate.
    pub fn migrate_legacy_buffers<Q: QuadStore>(&mut self, registry: &mut MapBufferRegistry<Q>) {
        let Some(buffers) = self.legacy.take() else {
            return;
        };

        let count = buffers.submaps.len();
        registry.absorb(&self.id, buffers);
        if self.state == ResidencyState::Unloaded {
            self.state = ResidencyState::Loaded;
        }

        realms_log::info!("migrated {count} legacy submaps of dimension {}", self.id);
    }
}
