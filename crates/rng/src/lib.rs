//! A pseudo-random number generation library.
//!
//! Generators are never shared between threads. Every worker thread seeds its own instance
//! with [`seed_for_current_thread`].

mod splitmix64;
pub use splitmix64::*;

mod xoshiro256plusplus;
pub use xoshiro256plusplus::*;

mod seed;
pub use seed::*;

/// The default pseudo-random number generator.
///
/// This general purpose RNG should be sufficient in a vast majority of cases.
pub type DefaultRng = Xoshiro256PlusPlus;

/// A seeded pseudo-random number generator.
pub trait Rng {
    /// Creates a new [`Rng`] instance from the provided seed.
    fn from_seed(seed: u64) -> Self
    where
        Self: Sized;

    /// Generates a pseudo-random `u64` value.
    fn next_u64(&mut self) -> u64;

    /// Generates a random `u32` value.
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generates a random `f32` value in the range `[0.0, 1.0]`.
    #[inline(always)]
    fn next_f32_01(&mut self) -> f32 {
        (self.next_u32() & 0xFFFFFF) as f32 * (1.0 / 0xFFFFFF as f32)
    }

    /// Generates a random value in the range `[0, bound)`.
    ///
    /// Returns `0` when `bound` is `0`.
    #[inline]
    fn below(&mut self, bound: u32) -> u32 {
        // Lemire's multiply-shift; the bias is irrelevant for simulation rolls.
        ((self.next_u32() as u64 * bound as u64) >> 32) as u32
    }

    /// Returns `true` with the provided probability (clamped to `[0.0, 1.0]`).
    #[inline]
    fn chance(&mut self, probability: f32) -> bool {
        self.next_f32_01() < probability.clamp(0.0, 1.0)
    }
}
