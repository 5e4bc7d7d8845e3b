//! Demand-driven residency of chunks.
//!
//! Subsystems declare the boxes of chunks they need with [`ResidencyManager::request`]. Once per
//! simulation step, [`ResidencyManager::tick`] turns the union of those boxes into load and
//! eviction orders for a [`MapStorage`].
//!
//! # Quad atomicity
//!
//! Chunks are persisted four at a time (see [`QuadPos`]). A chunk that stops being desired is
//! reported to the listeners immediately, but its quad stays resident until *none* of its four
//! members is desired anymore.
//!
//! # Storage failures
//!
//! A chunk that fails to load stays desired. Nothing retries the load until the chunk stops
//! being desired and becomes desired again.

use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxHasher;

use realms_core::{ChunkPos, DimensionId, QuadPos};

use crate::storage::MapStorage;

mod request;
pub use request::*;

type FxHashSet<T> = HashSet<T, BuildHasherDefault<FxHasher>>;

/// Observes the chunks that become desired or stop being desired.
///
/// Callbacks are invoked synchronously from [`ResidencyManager::tick`]. They must return
/// quickly.
pub trait ResidencyListener {
    /// Called when a chunk becomes desired, after the storage was asked to load it.
    fn on_chunk_loaded(&self, pos: ChunkPos, dimension: &DimensionId);

    /// Called when a chunk stops being desired.
    ///
    /// The chunk may remain in memory for a while, until the rest of its quad is released.
    fn on_chunk_unloaded(&self, pos: ChunkPos, dimension: &DimensionId);
}

/// What happened during a [`ResidencyManager::tick`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// The number of chunks that became desired.
    pub loaded: usize,
    /// The number of chunks that stopped being desired.
    pub unloaded: usize,
    /// The number of quads that were evicted.
    pub evicted_quads: usize,
    /// The number of newly desired chunks the storage failed to load.
    pub failed_loads: usize,
    /// The number of quads the storage failed to evict.
    pub failed_evictions: usize,
}

/// Aggregates the demand of every subsystem into a single set of desired chunks.
#[derive(Default)]
pub struct ResidencyManager {
    /// The active requests.
    requests: HashMap<RequestHandle, DemandRequest, BuildHasherDefault<FxHasher>>,
    /// The raw value of the next handle to give out.
    next_handle: u64,
    /// The desired set computed by the last completed tick.
    prev_desired: FxHashSet<DesiredKey>,
    /// The part of `prev_desired` requested by the reality bubble.
    prev_bubble: FxHashSet<DesiredKey>,
    /// The registered listeners.
    listeners: Vec<Arc<dyn ResidencyListener>>,
}

impl ResidencyManager {
    /// Creates a new, empty [`ResidencyManager`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new demand box and returns its handle.
    pub fn request(
        &mut self,
        source: DemandSource,
        dimension: impl Into<DimensionId>,
        center: ChunkPos,
        radius: u32,
        z_min: i32,
        z_max: i32,
    ) -> RequestHandle {
        let handle = RequestHandle(self.next_handle);
        self.next_handle += 1;

        let request = DemandRequest {
            source,
            dimension: dimension.into(),
            center,
            radius,
            z_min,
            z_max,
        };

        realms_log::trace!(
            "request #{} ({:?}) in {} around {} (radius {}, levels {}..={})",
            handle.0,
            request.source,
            request.dimension,
            request.center,
            request.radius,
            request.z_min,
            request.z_max,
        );

        self.requests.insert(handle, request);
        handle
    }

    /// Moves the center of a request. The radius and levels are kept.
    ///
    /// Does nothing if the request was already released.
    pub fn update(&mut self, handle: RequestHandle, center: ChunkPos) {
        if let Some(request) = self.requests.get_mut(&handle) {
            request.center = center;
        }
    }

    /// Releases a request.
    ///
    /// Does nothing if the request was already released.
    pub fn release(&mut self, handle: RequestHandle) {
        if self.requests.remove(&handle).is_some() {
            realms_log::trace!("released request #{}", handle.0);
        }
    }

    /// Returns the request registered under `handle`, if it's still active.
    #[inline]
    pub fn request_info(&self, handle: RequestHandle) -> Option<&DemandRequest> {
        self.requests.get(&handle)
    }

    /// Returns the number of active requests.
    #[inline]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Returns the number of chunks desired as of the last completed tick.
    #[inline]
    pub fn desired_count(&self) -> usize {
        self.prev_desired.len()
    }

    /// Returns the chunks desired as of the last completed tick, in no particular order.
    #[inline]
    pub fn desired_keys(&self) -> impl Iterator<Item = &DesiredKey> {
        self.prev_desired.iter()
    }

    /// Returns whether the provided chunk was desired as of the last completed tick.
    #[inline]
    pub fn is_requested(&self, dimension: &DimensionId, pos: ChunkPos) -> bool {
        self.prev_desired.contains(&KeyRef { dimension, pos })
    }

    /// Returns whether the provided chunk was desired by the reality bubble as of the last
    /// completed tick.
    #[inline]
    pub fn is_properly_requested(&self, dimension: &DimensionId, pos: ChunkPos) -> bool {
        self.prev_bubble.contains(&KeyRef { dimension, pos })
    }

    /// Returns the dimensions that have at least one active request.
    pub fn active_dimensions(&self) -> BTreeSet<DimensionId> {
        self.requests
            .values()
            .map(|r| r.dimension.clone())
            .collect()
    }

    /// Forgets the desired set of the last tick.
    ///
    /// Requests are kept. The next tick considers every desired chunk as newly desired, which is
    /// what callers want after the storage was reset behind the manager's back.
    pub fn flush(&mut self) {
        self.prev_desired.clear();
        self.prev_bubble.clear();
    }

    /// Registers a listener.
    ///
    /// Returns `false` if the very same listener was already registered.
    pub fn add_listener(&mut self, listener: Arc<dyn ResidencyListener>) -> bool {
        if self.listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Unregisters a listener.
    ///
    /// Returns `false` if the listener was not registered.
    pub fn remove_listener(&mut self, listener: &Arc<dyn ResidencyListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !same_listener(l, listener));
        self.listeners.len() != before
    }

    /// Returns the number of registered listeners.
    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Computes the union of the boxes of every active request.
    ///
    /// Returns the full desired set, and the part of it desired by the reality bubble.
    #[profiling::function]
    fn compute_desired(&self) -> (FxHashSet<DesiredKey>, FxHashSet<DesiredKey>) {
        let mut desired = FxHashSet::default();
        let mut bubble = FxHashSet::default();

        for request in self.requests.values() {
            let is_bubble = request.source == DemandSource::RealityBubble;
            for pos in request.chunks() {
                let key = DesiredKey {
                    dimension: request.dimension.clone(),
                    pos,
                };
                if is_bubble {
                    bubble.insert(key.clone());
                }
                desired.insert(key);
            }
        }

        (desired, bubble)
    }

    /// Brings the storage in line with the active requests.
    ///
    /// Newly desired chunks are loaded and reported first, then chunks that are no longer
    /// desired are reported, and finally the quads with no desired member left are evicted.
    /// Within each step, chunks are processed in sorted order.
    #[profiling::function]
    pub fn tick<S>(&mut self, storage: &mut S) -> TickReport
    where
        S: ?Sized + MapStorage,
    {
        let (desired, bubble) = self.compute_desired();
        let mut report = TickReport::default();

        let mut arrived: Vec<&DesiredKey> = desired.difference(&self.prev_desired).collect();
        arrived.sort_unstable();

        for key in arrived {
            if let Err(err) = storage.ensure_loaded(&key.dimension, key.pos) {
                realms_log::warning!(
                    "failed to load chunk {} of dimension {}: {err}",
                    key.pos,
                    key.dimension,
                );
                report.failed_loads += 1;
            }

            for listener in &self.listeners {
                listener.on_chunk_loaded(key.pos, &key.dimension);
            }
            report.loaded += 1;
        }

        let mut departed: Vec<&DesiredKey> = self.prev_desired.difference(&desired).collect();
        departed.sort_unstable();

        for key in &departed {
            for listener in &self.listeners {
                listener.on_chunk_unloaded(key.pos, &key.dimension);
            }
            report.unloaded += 1;
        }

        let mut quads: Vec<(&DimensionId, QuadPos)> = departed
            .iter()
            .map(|key| (&key.dimension, key.pos.quad()))
            .collect();
        quads.sort_unstable();
        quads.dedup();

        for (dimension, quad) in quads {
            let still_desired = quad
                .members()
                .into_iter()
                .any(|pos| desired.contains(&KeyRef { dimension, pos }));
            if still_desired {
                continue;
            }

            match storage.evict_quad(dimension, quad) {
                Ok(()) => report.evicted_quads += 1,
                Err(err) => {
                    realms_log::error!("failed to evict {quad} of dimension {dimension}: {err}");
                    report.failed_evictions += 1;
                }
            }
        }

        self.prev_desired = desired;
        self.prev_bubble = bubble;

        if report != TickReport::default() {
            realms_log::trace!("residency tick: {report:?}");
        }

        report
    }
}

/// Returns whether two listener handles point to the same listener.
#[inline]
fn same_listener(a: &Arc<dyn ResidencyListener>, b: &Arc<dyn ResidencyListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
