//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. Entity poses are plain [`Vec3`]s: a position and a
//! set of Euler angles in radians.

use std::f32::consts::{PI, TAU};

pub use glam::Vec3;

/// Wrap an angle into the half-open range (-π, π].
///
/// Angles already inside the range are returned untouched. Non-finite input
/// is passed through.
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid lands on [-π, π); the lower bound belongs to the other end.
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Format a vector as `(x, y, z)` with a fixed number of decimals.
pub fn vector_string(v: Vec3, precision: usize) -> String {
    format!("({:.p$}, {:.p$}, {:.p$})", v.x, v.y, v.z, p = precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_in_range_values() {
        assert_eq!(wrap_angle(0.0), 0.0);
        assert_eq!(wrap_angle(1.5), 1.5);
        assert_eq!(wrap_angle(PI), PI);
        assert_eq!(wrap_angle(-3.0), -3.0);
    }

    #[test]
    fn wrap_folds_out_of_range_values() {
        for raw in [4.0_f32, -4.0, 7.5, -7.5, 100.0, -PI, 3.0 * PI, -5.0 * PI] {
            let w = wrap_angle(raw);
            assert!(w > -PI && w <= PI, "{raw} wrapped to {w}");
            // Same direction modulo a full turn.
            let turns = (raw - w) / TAU;
            assert!((turns - turns.round()).abs() < 1e-3, "{raw} -> {w}");
        }
        assert_eq!(wrap_angle(-PI), PI);
    }

    #[test]
    fn vector_formatting() {
        assert_eq!(vector_string(Vec3::new(1.0, -2.5, 0.126), 2), "(1.00, -2.50, 0.13)");
        assert_eq!(vector_string(Vec3::ZERO, 0), "(0, 0, 0)");
    }
}
