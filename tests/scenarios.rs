use std::sync::Arc;

use parking_lot::Mutex;

use realms::dimension::DimensionResidency;
use realms::planning::{self, Plannable};
use realms::region::{BoundaryTerrain, BoundedRegion};
use realms::residency::{DemandSource, ResidencyListener, ResidencyManager};
use realms::storage::{MapBufferRegistry, MapStorage, MemoryQuadStore};
use realms_core::{ChunkPos, DimensionId, QuadPos};
use realms_rng::{DefaultRng, Rng};
use realms_workers::WorkerPool;

#[derive(Default)]
struct Journal {
    loaded: Mutex<Vec<(DimensionId, ChunkPos)>>,
    unloaded: Mutex<Vec<(DimensionId, ChunkPos)>>,
}

impl ResidencyListener for Journal {
    fn on_chunk_loaded(&self, pos: ChunkPos, dimension: &DimensionId) {
        self.loaded.lock().push((dimension.clone(), pos));
    }

    fn on_chunk_unloaded(&self, pos: ChunkPos, dimension: &DimensionId) {
        self.unloaded.lock().push((dimension.clone(), pos));
    }
}

fn registry() -> MapBufferRegistry {
    MapBufferRegistry::new(MemoryQuadStore::new())
}

#[test]
fn viewport_and_follower_share_the_registry() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let journal = Arc::new(Journal::default());
    manager.add_listener(journal.clone());

    let viewport = manager.request(
        DemandSource::RealityBubble,
        "",
        ChunkPos::new(0, 0, 0),
        1,
        0,
        0,
    );
    manager.request(DemandSource::Follower, "", ChunkPos::new(5, 0, 0), 0, 0, 0);
    manager.tick(&mut registry);

    assert_eq!(manager.desired_count(), 10);
    assert_eq!(registry.resident_count(&DimensionId::primary()), 10);
    assert_eq!(journal.loaded.lock().len(), 10);

    manager.release(viewport);
    let report = manager.tick(&mut registry);

    assert_eq!(manager.desired_count(), 1);
    assert_eq!(report.unloaded, 9);
    assert_eq!(journal.unloaded.lock().len(), 9);
    // The follower's chunk (5, 0) shares its quad with (4, 0), (4, 1) and (5, 1), none of which
    // were resident, so only the viewport's quads went away.
    assert_eq!(registry.resident_count(&DimensionId::primary()), 1);
    assert!(registry
        .submap(&DimensionId::primary(), ChunkPos::new(5, 0, 0))
        .is_some());
}

#[test]
fn sibling_keeps_a_quad_resident() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let dim = DimensionId::primary();
    let quad = QuadPos::new(3, -2, 0);
    let [a, b, c, d] = quad.members();

    for pos in [a, b, c] {
        manager.request(DemandSource::Vehicle, "", pos, 0, 0, 0);
    }
    let temporary = manager.request(DemandSource::Scripted, "", d, 0, 0, 0);
    manager.tick(&mut registry);
    registry.submap_mut(&dim, d).unwrap().touch();

    manager.release(temporary);
    let report = manager.tick(&mut registry);

    assert_eq!(report.evicted_quads, 0);
    assert!(!manager.is_requested(&dim, d));
    assert_eq!(registry.resident_count(&dim), 4);
    assert_eq!(registry.submap(&dim, d).unwrap().revision, 1);
    assert_eq!(registry.store().write_count(), 0);
}

#[test]
fn overlapping_boxes_share_a_quad() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let dim = DimensionId::primary();

    manager.request(DemandSource::RealityBubble, "", ChunkPos::new(-1, -1, 0), 1, 0, 0);
    let temporary = manager.request(DemandSource::Scripted, "", ChunkPos::new(1, 1, 0), 1, 0, 0);
    manager.tick(&mut registry);
    assert_eq!(registry.resident_count(&dim), 17);

    manager.release(temporary);
    let report = manager.tick(&mut registry);

    assert_eq!(report.unloaded, 8);
    assert_eq!(report.evicted_quads, 3);
    // The quad of (0, 0) keeps all of its resident members, the three other quads are gone.
    assert_eq!(registry.resident_count(&dim), 12);
    for pos in QuadPos::new(0, 0, 0).members() {
        assert!(registry.submap(&dim, pos).is_some());
    }
    assert!(registry.submap(&dim, ChunkPos::new(2, 2, 0)).is_none());
    assert!(registry.store().record(&dim, QuadPos::new(0, 0, 0)).is_none());
    assert!(registry.store().record(&dim, QuadPos::new(1, 1, 0)).is_some());
}

#[test]
fn corrupt_quad_is_retried_only_after_demand_changes() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let dim = DimensionId::primary();
    let pos = ChunkPos::new(-1, -1, 0);
    registry.store_mut().mark_corrupt(&dim, pos.quad());

    let handle = manager.request(DemandSource::Other, "", pos, 0, 0, 0);
    assert_eq!(manager.tick(&mut registry).failed_loads, 1);
    assert!(manager.is_requested(&dim, pos));
    assert!(registry.submap(&dim, pos).is_none());

    registry.store_mut().repair(&dim, pos.quad());
    manager.tick(&mut registry);
    assert!(registry.submap(&dim, pos).is_none());

    manager.release(handle);
    manager.tick(&mut registry);
    manager.request(DemandSource::Other, "", pos, 0, 0, 0);
    assert_eq!(manager.tick(&mut registry).failed_loads, 0);
    assert!(registry.submap(&dim, pos).is_some());
}

#[test]
fn bounded_pocket_dimension_synthesizes_its_border() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let pocket = DimensionId::new("pocket");

    let mut realm = DimensionResidency::new(pocket.clone());
    realm.load(&mut registry).unwrap();
    registry.set_bounds(
        &pocket,
        BoundedRegion::new(
            ChunkPos::new(0, 0, 0),
            ChunkPos::new(-1, -1, 0),
            BoundaryTerrain::default(),
        ),
    );

    let mut world = DimensionResidency::active(DimensionId::primary());
    world.capture_from_primary(&mut registry, None).unwrap();
    realm.restore_to_primary(&mut registry).unwrap();
    assert_eq!(registry.primary(), &pocket);

    let handle = manager.request(
        DemandSource::RealityBubble,
        pocket.clone(),
        ChunkPos::new(0, 0, 0),
        2,
        0,
        0,
    );
    manager.tick(&mut registry);

    assert_eq!(registry.resident_count(&pocket), 25);
    let simulated = manager
        .desired_keys()
        .filter(|key| registry.should_simulate(&key.dimension, key.pos))
        .count();
    assert_eq!(simulated, 4);
    assert!(registry
        .submap(&pocket, ChunkPos::new(2, 2, 0))
        .unwrap()
        .is_synthetic());

    manager.release(handle);
    manager.tick(&mut registry);

    // Only the four chunks inside the bounds were worth persisting.
    let persisted: usize = [(-1, -1), (0, -1), (-1, 0), (0, 0)]
        .into_iter()
        .filter_map(|(x, y)| registry.store().record(&pocket, QuadPos::new(x, y, 0)))
        .map(|record| record.len())
        .sum();
    assert_eq!(persisted, 4);
    assert!(registry
        .store()
        .record(&pocket, QuadPos::new(1, 1, 0))
        .is_none());
    assert_eq!(registry.resident_count(&pocket), 0);
}

#[test]
fn parked_dimensions_keep_their_chunks() {
    let mut registry = registry();
    let mut manager = ResidencyManager::new();
    let primary = DimensionId::primary();
    let pocket = DimensionId::new("pocket");

    manager.request(DemandSource::RealityBubble, "", ChunkPos::new(0, 0, 0), 1, 0, 0);
    manager.tick(&mut registry);
    registry
        .submap_mut(&primary, ChunkPos::new(0, 0, 0))
        .unwrap()
        .touch();

    let mut world = DimensionResidency::active("");
    let mut realm = DimensionResidency::new("pocket");
    realm.load(&mut registry).unwrap();
    world.capture_from_primary(&mut registry, None).unwrap();
    realm.restore_to_primary(&mut registry).unwrap();

    // The primary world is parked wholesale, nothing was written.
    assert_eq!(registry.resident_count(&primary), 9);
    assert_eq!(registry.store().write_count(), 0);
    assert_eq!(manager.active_dimensions().len(), 1);

    let mut realm = DimensionResidency::active(pocket.clone());
    realm.capture_from_primary(&mut registry, None).unwrap();
    world.restore_to_primary(&mut registry).unwrap();

    assert!(registry.is_active(&primary));
    assert_eq!(
        registry
            .submap(&primary, ChunkPos::new(0, 0, 0))
            .unwrap()
            .revision,
        1
    );
    assert!(registry.has_slot(&pocket));
}

/// A guard whose anger rises a little every step.
#[derive(Debug, Clone, Default)]
struct Guard {
    anger: u32,
    planned: Vec<u32>,
}

impl Plannable for Guard {
    type Plan = u32;

    fn plan(&self, rng: &mut DefaultRng) -> u32 {
        self.anger + 1 + rng.below(2)
    }

    fn apply(entities: &mut [Self], index: usize, plan: u32) {
        entities[index].anger = plan;
        entities[index].planned.push(plan);
    }
}

#[test]
fn planned_guards_match_their_artifacts() {
    let pool = WorkerPool::new(2);
    let mut guards = vec![Guard::default(), Guard::default()];

    for _ in 0..10 {
        planning::step(&pool, &mut guards);
    }

    for guard in &guards {
        assert_eq!(guard.planned.len(), 10);
        assert_eq!(Some(&guard.anger), guard.planned.last());
        assert!(guard.planned.windows(2).all(|w| w[0] < w[1]));
    }

    pool.shutdown();
}
