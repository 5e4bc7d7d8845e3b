//! Demand-driven residency of a chunked, multi-dimensional world.
//!
//! Subsystems tell the [`ResidencyManager`](residency::ResidencyManager) which chunks they need,
//! and the manager keeps a [`MapStorage`](storage::MapStorage) in line with that demand. Whole
//! dimensions are swapped in and out of the live simulation by the
//! [`DimensionResidency`](dimension::DimensionResidency) lifecycle.

pub mod config;
pub mod dimension;
pub mod planning;
pub mod region;
pub mod residency;
pub mod storage;

