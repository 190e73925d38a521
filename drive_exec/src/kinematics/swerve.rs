//! Swerve kinematics implementation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

// Internal
use super::{
    ChassisSpeeds, KinematicsError, ModuleGeometry, ModuleId, ModulePosition,
    ModuleState, Twist2, NUM_MODULES
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematics of a four module swerve chassis.
///
/// The inverse kinematics (chassis to modules) is exact. The forward
/// kinematics (modules to chassis) solves the overdetermined system
///
/// ```text
/// [ 1 0 -y_i ] [ vx ]   [ v_i cos(a_i) ]
/// [ 0 1  x_i ] [ vy ] = [ v_i sin(a_i) ]
///              [ w  ]
/// ```
///
/// for all four modules in the least squares sense, so wheels fighting each
/// other are averaged out rather than trusted individually.
#[derive(Debug, Clone, Serialize)]
pub struct SwerveKinematics {
    geometry: [ModuleGeometry; NUM_MODULES],

    /// Inverse of the normal matrix (A^T A) of the system above.
    #[serde(skip)]
    inv_normal: Matrix3<f64>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveKinematics {

    /// Build the kinematics for the given module geometry, given in
    /// `ModuleId` order.
    ///
    /// Each module must lie strictly inside its own quadrant of the chassis
    /// frame, which also rejects geometries with a module on the centre of
    /// rotation.
    pub fn new(geometry: [ModuleGeometry; NUM_MODULES]) -> Result<Self, KinematicsError> {
        for (id, geom) in ModuleId::ALL.iter().zip(geometry.iter()) {
            let (x, y) = (geom.offset_x_m, geom.offset_y_m);

            if !x.is_finite() || !y.is_finite() {
                return Err(KinematicsError::NonFiniteOffset(*id, x, y))
            }

            let (sx, sy) = id.quadrant();
            if x * sx <= 0.0 || y * sy <= 0.0 {
                return Err(KinematicsError::WrongQuadrant(
                    *id,
                    x,
                    y,
                    if sx > 0.0 { ">" } else { "<" },
                    if sy > 0.0 { ">" } else { "<" }
                ))
            }
        }

        // Accumulate A^T A
        let n = NUM_MODULES as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_r2 = 0.0;

        for geom in geometry.iter() {
            sum_x += geom.offset_x_m;
            sum_y += geom.offset_y_m;
            sum_r2 += geom.offset_x_m.powi(2) + geom.offset_y_m.powi(2);
        }

        let normal = Matrix3::new(
            n, 0.0, -sum_y,
            0.0, n, sum_x,
            -sum_y, sum_x, sum_r2
        );

        let inv_normal = normal.try_inverse().ok_or(KinematicsError::Degenerate)?;

        if inv_normal.iter().any(|v| !v.is_finite()) {
            return Err(KinematicsError::Degenerate)
        }

        Ok(Self {
            geometry,
            inv_normal
        })
    }

    /// Get the module geometry.
    pub fn geometry(&self) -> &[ModuleGeometry; NUM_MODULES] {
        &self.geometry
    }

    /// Calculate the module states which achieve the given chassis speeds.
    ///
    /// A module with no motion is given an angle of zero.
    pub fn to_module_states(&self, speeds: &ChassisSpeeds) -> [ModuleState; NUM_MODULES] {
        let mut states = [ModuleState::default(); NUM_MODULES];

        for (state, geom) in states.iter_mut().zip(self.geometry.iter()) {
            let vx = speeds.vx_ms - speeds.omega_rads * geom.offset_y_m;
            let vy = speeds.vy_ms + speeds.omega_rads * geom.offset_x_m;

            let speed_ms = vx.hypot(vy);

            *state = if speed_ms == 0.0 {
                ModuleState::new(0.0, 0.0)
            }
            else {
                ModuleState::new(speed_ms, vy.atan2(vx))
            };
        }

        states
    }

    /// Estimate the chassis speeds from the given module states.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let mut vels = [(0.0, 0.0); NUM_MODULES];

        for (v, s) in vels.iter_mut().zip(states.iter()) {
            *v = (s.speed_ms * s.angle_rad.cos(), s.speed_ms * s.angle_rad.sin());
        }

        let sol = self.solve(&vels);

        ChassisSpeeds::new(sol[0], sol[1], sol[2])
    }

    /// Estimate the chassis displacement from the distance each wheel has
    /// travelled along its current angle.
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist2 {
        let mut disps = [(0.0, 0.0); NUM_MODULES];

        for (d, p) in disps.iter_mut().zip(deltas.iter()) {
            *d = (p.distance_m * p.angle_rad.cos(), p.distance_m * p.angle_rad.sin());
        }

        let sol = self.solve(&disps);

        Twist2 {
            dx_m: sol[0],
            dy_m: sol[1],
            dtheta_rad: sol[2]
        }
    }

    /// Scale all module speeds down uniformly so that none exceeds
    /// `max_speed_ms`.
    ///
    /// Returns `true` if the speeds were scaled.
    pub fn desaturate(states: &mut [ModuleState; NUM_MODULES], max_speed_ms: f64) -> bool {
        let largest = states.iter()
            .map(|s| s.speed_ms.abs())
            .fold(0.0, f64::max);

        if largest > max_speed_ms {
            let scale = max_speed_ms / largest;
            for s in states.iter_mut() {
                s.speed_ms *= scale;
            }
            true
        }
        else {
            false
        }
    }

    /// Least squares solution for per-module (x, y) vectors.
    fn solve(&self, vecs: &[(f64, f64); NUM_MODULES]) -> Vector3<f64> {
        // A^T b
        let mut atb = Vector3::zeros();

        for (geom, (vx, vy)) in self.geometry.iter().zip(vecs.iter()) {
            atb[0] += vx;
            atb[1] += vy;
            atb[2] += -geom.offset_y_m * vx + geom.offset_x_m * vy;
        }

        self.inv_normal * atb
    }
}
