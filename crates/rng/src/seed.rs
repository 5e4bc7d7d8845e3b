//! Seed sources.

use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHasher;

use crate::{splitmix64, DefaultRng, Rng};

/// Returns the number of nanoseconds elapsed since the Unix epoch, truncated to 64 bits.
fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

/// Derives a seed from the identity of the calling thread and the current time.
///
/// Two threads calling this function at the same instant still get different seeds.
pub fn seed_for_current_thread() -> u64 {
    let mut hasher = FxHasher::default();
    std::thread::current().id().hash(&mut hasher);
    splitmix64(hasher.finish() ^ splitmix64(timestamp()))
}

/// Creates a [`DefaultRng`] owned by the calling thread.
#[inline]
pub fn thread_rng() -> DefaultRng {
    DefaultRng::from_seed(seed_for_current_thread())
}
