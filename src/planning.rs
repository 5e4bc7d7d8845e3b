//! Split-phase updates of simulated entities.
//!
//! Deciding what an entity does is expensive and only needs to *read* the world, while acting
//! on that decision is cheap but mutates it. [`step`] runs the first phase for every entity in
//! parallel on a [`WorkerPool`], then applies the decisions one after the other on the calling
//! thread.

use std::sync::Arc;

use realms_rng::DefaultRng;
use realms_workers::WorkerPool;

/// An entity whose update is split into a read-only planning phase and a serial apply phase.
pub trait Plannable: Clone + Send + Sync + 'static {
    /// The outcome of the planning phase.
    ///
    /// It carries the final values of the fields the decision logic touches.
    type Plan: Send + 'static;

    /// Decides what the entity does, without modifying anything.
    ///
    /// Planning sees a snapshot of every entity taken at the start of the step.
    fn plan(&self, rng: &mut DefaultRng) -> Self::Plan;

    /// Applies the plan of the entity at `index`.
    ///
    /// The plan may affect any entity, not only the one that produced it.
    fn apply(entities: &mut [Self], index: usize, plan: Self::Plan);
}

/// Plans every entity in parallel, then applies the plans in index order.
///
/// Given plans that only depend on the snapshot and the RNG stream, the outcome does not
/// depend on how the planning jobs were scheduled.
#[profiling::function]
pub fn step<E: Plannable>(pool: &WorkerPool, entities: &mut [E]) {
    if entities.is_empty() {
        return;
    }

    let snapshot: Arc<[E]> = entities.iter().cloned().collect();

    let plans = pool.run_batch((0..snapshot.len()).map(|index| {
        let snapshot = snapshot.clone();
        move |rng: &mut DefaultRng| snapshot[index].plan(rng)
    }));

    for (index, plan) in plans.into_iter().enumerate() {
        E::apply(entities, index, plan);
    }
}
