//! Steering angle optimisation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::{FRAC_PI_2, PI};

use util::maths::get_ang_dist_2pi;

use crate::kinematics::ModuleState;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Optimise a desired module state so that the steering never turns by more
/// than 90 degrees.
///
/// If the desired angle is more than 90 degrees away from `current_angle_rad`
/// the wheel is pointed the opposite way and driven backwards instead. The
/// returned angle is expressed as `current_angle_rad + delta` with
/// `|delta| <= pi/2`, so it stays continuous with the current angle.
///
/// Returns the optimised state and whether the direction was reversed.
pub fn optimise(desired: ModuleState, current_angle_rad: f64) -> (ModuleState, bool) {
    let mut delta = get_ang_dist_2pi(current_angle_rad, desired.angle_rad);
    let mut speed_ms = desired.speed_ms;
    let mut reversed = false;

    if delta > FRAC_PI_2 {
        delta -= PI;
        speed_ms = -speed_ms;
        reversed = true;
    }
    else if delta < -FRAC_PI_2 {
        delta += PI;
        speed_ms = -speed_ms;
        reversed = true;
    }

    (ModuleState::new(speed_ms, current_angle_rad + delta), reversed)
}

#[cfg(test)]
mod test {
    use super::*;

    fn deg(v: f64) -> f64 {
        v.to_radians()
    }

    #[test]
    fn test_small_move_kept() {
        let (s, rev) = optimise(ModuleState::from_degrees(1.0, 30.0), deg(10.0));
        assert!(!rev);
        assert_eq!(s.speed_ms, 1.0);
        assert!((s.angle_rad - deg(30.0)).abs() < 1e-12);
    }

    #[test]
    fn test_across_wrap() {
        // 350 deg to 10 deg is a 20 deg move, expressed continuously
        let (s, rev) = optimise(ModuleState::from_degrees(1.0, 10.0), deg(350.0));
        assert!(!rev);
        assert!((s.angle_rad - deg(370.0)).abs() < 1e-12);
    }

    #[test]
    fn test_flip() {
        // Current 170 deg, target 355 deg (-5 deg): 175 deg away, so the wheel
        // points at 175 deg and drives backwards
        let (s, rev) = optimise(ModuleState::from_degrees(2.0, 355.0), deg(170.0));
        assert!(rev);
        assert_eq!(s.speed_ms, -2.0);
        assert!((s.angle_rad - deg(175.0)).abs() < 1e-9);
        assert!((s.angle_rad - deg(170.0)).abs() <= deg(90.0));

        // Same with the target given as -5 deg
        let (s2, _) = optimise(ModuleState::from_degrees(2.0, -5.0), deg(170.0));
        assert!((s2.angle_rad - s.angle_rad).abs() < 1e-9);
    }

    #[test]
    fn test_exactly_90_not_flipped() {
        let (s, rev) = optimise(ModuleState::new(1.0, FRAC_PI_2), 0.0);
        assert!(!rev);
        assert_eq!(s.speed_ms, 1.0);
        assert_eq!(s.angle_rad, FRAC_PI_2);

        let (s, rev) = optimise(ModuleState::new(1.0, -FRAC_PI_2), 0.0);
        assert!(!rev);
        assert_eq!(s.angle_rad, -FRAC_PI_2);
    }

    #[test]
    fn test_never_more_than_90() {
        let mut current = deg(-720.0);
        while current < deg(720.0) {
            let mut target = deg(-400.0);
            while target < deg(400.0) {
                let (s, _) = optimise(ModuleState::new(1.0, target), current);
                assert!((s.angle_rad - current).abs() <= FRAC_PI_2 + 1e-9);

                // Same physical wheel direction, possibly reversed
                let v_want = (target.cos(), target.sin());
                let v_got = (s.speed_ms * s.angle_rad.cos(), s.speed_ms * s.angle_rad.sin());
                assert!((v_want.0 - v_got.0).abs() < 1e-9);
                assert!((v_want.1 - v_got.1).abs() < 1e-9);

                target += deg(7.0);
            }
            current += deg(13.0);
        }
    }
}
