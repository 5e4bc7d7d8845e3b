//! A scripted tour of the residency machinery.
//!
//! The player walks through the primary world with a follower in tow, then steps into a pocket
//! dimension. Along the way, a handful of wanderers plan their moves on the worker pool.
//!
//! Usage: `realms [config.ron]`. The log verbosity can be overridden with `REALMS_LOG`.

mod panic;

use std::process::ExitCode;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use realms::config::Config;
use realms::dimension::{DimensionResidency, LifecycleError};
use realms::planning::{self, Plannable};
use realms::region::{BoundaryTerrain, BoundedRegion};
use realms::residency::{DemandSource, ResidencyListener, ResidencyManager, TickReport};
use realms::storage::{MapBufferRegistry, MemoryQuadStore};
use realms_core::{ChunkPos, DimensionId};
use realms_rng::{DefaultRng, Rng};
use realms_workers::WorkerPool;

/// Counts the chunks going in and out of the desired set.
#[derive(Default)]
struct Counter {
    loaded: AtomicUsize,
    unloaded: AtomicUsize,
}

impl ResidencyListener for Counter {
    fn on_chunk_loaded(&self, _pos: ChunkPos, _dimension: &DimensionId) {
        self.loaded.fetch_add(1, Relaxed);
    }

    fn on_chunk_unloaded(&self, _pos: ChunkPos, _dimension: &DimensionId) {
        self.unloaded.fetch_add(1, Relaxed);
    }
}

/// Someone roaming around the player.
#[derive(Debug, Clone)]
struct Wanderer {
    pos: ChunkPos,
    steps: u32,
}

impl Plannable for Wanderer {
    type Plan = ChunkPos;

    fn plan(&self, rng: &mut DefaultRng) -> ChunkPos {
        let dx = rng.below(3) as i32 - 1;
        let dy = rng.below(3) as i32 - 1;
        ChunkPos::new(self.pos.x + dx, self.pos.y + dy, self.pos.z)
    }

    fn apply(entities: &mut [Self], index: usize, plan: ChunkPos) {
        let wanderer = &mut entities[index];
        if wanderer.pos != plan {
            wanderer.steps += 1;
        }
        wanderer.pos = plan;
    }
}

fn log_tick(what: &str, report: TickReport) {
    realms_log::info!(
        "{what}: +{} -{} chunks, {} quads evicted",
        report.loaded,
        report.unloaded,
        report.evicted_quads,
    );
    if report.failed_loads > 0 || report.failed_evictions > 0 {
        realms_log::warning!(
            "{what}: {} loads and {} evictions failed",
            report.failed_loads,
            report.failed_evictions,
        );
    }
}

fn load_config() -> Option<Config> {
    let Some(path) = std::env::args_os().nth(1) else {
        return Some(Config::default());
    };

    match Config::load(&path) {
        Ok(config) => Some(config),
        Err(err) => {
            realms_log::error!("{}: {err}", path.to_string_lossy());
            None
        }
    }
}

fn run(config: &Config) -> Result<(), LifecycleError> {
    let mut registry = MapBufferRegistry::new(MemoryQuadStore::new());
    let mut manager = ResidencyManager::new();
    let counter = Arc::new(Counter::default());
    manager.add_listener(counter.clone());

    let pool = WorkerPool::new(config.workers.resolve());
    realms_log::info!("planning on {} worker threads", pool.worker_count());

    let mut player = ChunkPos::new(0, 0, 0);
    let bubble = manager.request(
        DemandSource::RealityBubble,
        DimensionId::primary(),
        player,
        config.bubble_radius,
        config.bubble_z_min,
        config.bubble_z_max,
    );
    log_tick("arrival", manager.tick(&mut registry));

    let mut wanderers: Vec<Wanderer> = (0..4)
        .map(|i| Wanderer {
            pos: ChunkPos::new(i * 3, -i, 0),
            steps: 0,
        })
        .collect();
    let follower = manager.request(
        DemandSource::Follower,
        DimensionId::primary(),
        wanderers[0].pos,
        1,
        0,
        0,
    );

    for _ in 0..8 {
        player.x += 1;
        manager.update(bubble, player);

        planning::step(&pool, &mut wanderers);
        manager.update(follower, wanderers[0].pos);

        log_tick("walk", manager.tick(&mut registry));
    }

    let total_steps: u32 = wanderers.iter().map(|w| w.steps).sum();
    realms_log::info!("wanderers took {total_steps} steps");

    let mut world = DimensionResidency::active(DimensionId::primary());
    let mut realm = DimensionResidency::new("pocket");
    realm.load(&mut registry)?;
    registry.set_bounds(
        realm.id(),
        BoundedRegion::new(
            ChunkPos::new(-2, -2, -1),
            ChunkPos::new(2, 2, 1),
            BoundaryTerrain::default(),
        ),
    );

    let pocket = realm.id().clone();
    world.capture_from_primary(&mut registry, None)?;
    realm.restore_to_primary(&mut registry)?;

    manager.release(bubble);
    manager.release(follower);
    manager.request(
        DemandSource::RealityBubble,
        pocket.clone(),
        ChunkPos::new(0, 0, 0),
        3,
        -1,
        1,
    );
    log_tick("dimension switch", manager.tick(&mut registry));

    realms_log::info!(
        "{} submaps resident in {pocket}, {} left in the primary world",
        registry.resident_count(&pocket),
        registry.resident_count(&DimensionId::primary()),
    );

    let written = DimensionResidency::active(pocket).save_state(&mut registry)?;
    realms_log::info!(
        "saved {written} quads, {} writes in total",
        registry.store().write_count()
    );
    realms_log::info!(
        "listeners saw {} chunks arrive and {} leave",
        counter.loaded.load(Relaxed),
        counter.unloaded.load(Relaxed),
    );

    Ok(())
}

fn main() -> ExitCode {
    panic::install_custom_panic_hook();

    let Some(config) = load_config() else {
        return ExitCode::FAILURE;
    };
    realms_log::set_max_verbosity(config.log_verbosity);
    realms_log::init_from_env();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            realms_log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
