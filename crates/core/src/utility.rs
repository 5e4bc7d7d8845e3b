//! Utility functions for the core library.

/// Divides `value` by `divisor`, rounding toward negative infinity.
///
/// Plain `/` truncates toward zero, which maps `-1 / 12` to `0` instead of `-1`. Every
/// conversion from a finer granularity to a coarser one must go through this function.
///
/// # Panics
///
/// Panics if `divisor` is not strictly positive.
#[inline]
#[track_caller]
pub const fn floor_div(value: i32, divisor: i32) -> i32 {
    assert!(divisor > 0, "granularity scale must be positive");
    value.div_euclid(divisor)
}

#[cfg(test)]
mod tests {
    use super::floor_div;

    #[test]
    fn rounds_toward_negative_infinity() {
        assert_eq!(floor_div(0, 12), 0);
        assert_eq!(floor_div(11, 12), 0);
        assert_eq!(floor_div(12, 12), 1);
        assert_eq!(floor_div(-1, 12), -1);
        assert_eq!(floor_div(-12, 12), -1);
        assert_eq!(floor_div(-13, 12), -2);
    }
}
