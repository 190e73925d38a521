//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Clamp a value between `min` and `max`.
///
/// A NaN value is mapped to zero (or the nearest limit if zero is outside
/// the range), so that the result is always usable as an actuator demand.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = if value.is_nan() { T::zero() } else { *value };

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Get the signed angular distance between two angles in the range of [0, 2pi].
///
/// This function will return the shortest signed distance from a to b accounting for wrapping
/// between 0 and 2pi. A distance of exactly pi is returned as +pi.
pub fn get_ang_dist_2pi<T>(a: T, b: T) -> T
where
    T: Float
{
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    let c = rem_euclid(a - b, tau_t);
    let d = rem_euclid(b - a, tau_t);

    if c < d {
        -c
    }
    else {
        d
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Normalise an angle into [0, 2pi).
pub fn wrap_2pi<T>(value: T) -> T
where
    T: Float
{
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    let r = rem_euclid(value, tau_t);

    // Round-off in rem_euclid can land exactly on tau
    if r >= tau_t { T::zero() } else { r }
}

/// Normalise an angle into (-pi, pi].
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float
{
    get_ang_dist_2pi(T::zero(), value)
}

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;
    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_get_ang_dist_2pi() {
        assert_eq!(get_ang_dist_2pi(1f64, 2f64), 1f64);
        assert_eq!(get_ang_dist_2pi(2f64, 1f64), -1f64);
        assert_eq!(get_ang_dist_2pi(0f64, TAU), 0f64);
        assert_eq!(get_ang_dist_2pi(TAU, 0f64), 0f64);
        assert_eq!(get_ang_dist_2pi(1f64, TAU), -1f64);
        assert_eq!(get_ang_dist_2pi(0f64, TAU - 1f64), -1f64);
        assert_eq!(get_ang_dist_2pi(TAU - 1f64, 1f64), 2f64);
    }

    #[test]
    fn test_get_ang_dist_2pi_across_wrap() {
        // 350 deg to 10 deg is +20 deg, never -340 deg
        let d = get_ang_dist_2pi(350f64.to_radians(), 10f64.to_radians());
        assert!((d - 20f64.to_radians()).abs() < 1e-12);

        let d = get_ang_dist_2pi(10f64.to_radians(), 350f64.to_radians());
        assert!((d + 20f64.to_radians()).abs() < 1e-12);

        // Unbounded inputs are reduced too
        let d = get_ang_dist_2pi(3.0 * TAU + 0.1, -TAU - 0.1);
        assert!((d + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap_2pi(0f64), 0f64);
        assert!((wrap_2pi(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((wrap_2pi(5.0 * PI) - PI).abs() < 1e-12);
        assert!(wrap_2pi(-1e-20f64) < TAU);

        assert!((wrap_pi(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
        assert_eq!(wrap_pi(PI), PI);
        assert_eq!(wrap_pi(0.25f64), 0.25);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-1.5f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.25f64, &-1.0, &1.0), 0.25);
        assert_eq!(clamp(&f64::NAN, &-1.0, &1.0), 0.0);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 10f64), (-1f64, 1f64), 5f64), 0f64);
        assert_eq!(lin_map((0f64, 10f64), (-1f64, 1f64), 10f64), 1f64);
    }
}
