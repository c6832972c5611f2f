/// Planner Kernel — Arithmetic Primitives
///
/// Money is whole currency units in i64. Ratios are i64 fixed-point
/// (SCALE = 10_000). No float anywhere in the kernel.

/// Fixed-point scale factor. A ratio of 1.0 is stored as `SCALE`.
pub const SCALE: i64 = 10_000;

/// Checked integer addition. Saturates instead of wrapping on overflow.
pub fn checked_add(a: i64, b: i64) -> i64 {
    match a.checked_add(b) {
        Some(result) => result,
        None if b > 0 => i64::MAX,
        None => i64::MIN,
    }
}

/// Checked integer subtraction. Saturates instead of wrapping on overflow.
pub fn checked_sub(a: i64, b: i64) -> i64 {
    match a.checked_sub(b) {
        Some(result) => result,
        None if b < 0 => i64::MAX,
        None => i64::MIN,
    }
}

/// Checked integer multiplication. Saturates instead of wrapping on overflow.
pub fn checked_mul(a: i64, b: i64) -> i64 {
    match a.checked_mul(b) {
        Some(result) => result,
        None if (a < 0) == (b < 0) => i64::MAX,
        None => i64::MIN,
    }
}

/// `(numerator * SCALE) / denominator`, or 0 when the denominator is 0.
pub fn ratio_scaled(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    checked_mul(numerator, SCALE) / denominator
}

/// Whole-percent rendering of a fixed-point ratio, rounded half away from zero.
pub fn scaled_to_percent(ratio: i64) -> i64 {
    let hundredths = checked_mul(ratio, 100);
    let rounded = if hundredths >= 0 {
        checked_add(hundredths, SCALE / 2)
    } else {
        checked_add(hundredths, -(SCALE / 2))
    };
    rounded / SCALE
}

/// Midpoint of a salary band: exact sum, halved last.
pub fn midpoint(min: i64, max: i64) -> i64 {
    checked_add(min, max) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_ok() {
        assert_eq!(checked_add(3, 4), 7);
        assert_eq!(checked_add(-10, 5), -5);
    }

    #[test]
    fn test_checked_add_saturates() {
        assert_eq!(checked_add(i64::MAX, 1), i64::MAX);
        assert_eq!(checked_add(i64::MIN, -1), i64::MIN);
    }

    #[test]
    fn test_checked_sub_saturates() {
        assert_eq!(checked_sub(3, 4), -1);
        assert_eq!(checked_sub(i64::MIN, 1), i64::MIN);
        assert_eq!(checked_sub(i64::MAX, -1), i64::MAX);
        assert_eq!(checked_sub(0, i64::MIN), i64::MAX);
    }

    #[test]
    fn test_checked_mul_saturates() {
        assert_eq!(checked_mul(3, 4), 12);
        assert_eq!(checked_mul(i64::MAX, 2), i64::MAX);
        assert_eq!(checked_mul(i64::MAX, -2), i64::MIN);
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio_scaled(5, 0), 0);
        assert_eq!(ratio_scaled(1, 2), 5_000);
        assert_eq!(ratio_scaled(2, 3), 6_666);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(scaled_to_percent(6_666), 67);
        assert_eq!(scaled_to_percent(5_000), 50);
        assert_eq!(scaled_to_percent(0), 0);
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(80_000, 120_000), 100_000);
        assert_eq!(midpoint(1, 2), 1);
    }
}
