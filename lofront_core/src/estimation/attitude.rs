// lofront_core/src/estimation/attitude.rs

use nalgebra::{Quaternion, Rotation3, UnitQuaternion};

/// Below this, the vertical twist of a rotation is treated as undefined.
const TWIST_EPSILON: f64 = 1e-12;

/// Relative rotation `q_prev⁻¹ · q_curr`, as a rotation matrix.
///
/// With `yaw_only`, the relative rotation is reduced to its twist about the
/// vertical axis (swing-twist decomposition), discarding the roll/pitch change.
/// Near-zero rotations come back as (near-)identity.
pub fn attitude_delta(
    q_prev: &UnitQuaternion<f64>,
    q_curr: &UnitQuaternion<f64>,
    yaw_only: bool,
) -> Rotation3<f64> {
    let change = q_prev.inverse() * q_curr;
    if yaw_only {
        yaw_twist(&change).to_rotation_matrix()
    } else {
        change.to_rotation_matrix()
    }
}

/// The component of `q` that rotates about +Z.
///
/// A half-turn about a horizontal axis has no defined twist; identity is returned.
pub fn yaw_twist(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let twist = Quaternion::new(q.w, 0.0, 0.0, q.k);
    if twist.norm() < TWIST_EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(twist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;

    fn assert_identity(r: &Rotation3<f64>) {
        assert!(r.matrix().iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(*r.matrix(), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn delta_with_itself_is_identity() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.9);
        assert_identity(&attitude_delta(&q, &q, false));
        assert_identity(&attitude_delta(&q, &q, true));
    }

    #[test]
    fn tiny_rotation_stays_finite() {
        let q_prev = UnitQuaternion::identity();
        let q_curr = UnitQuaternion::from_euler_angles(1e-15, 0.0, 1e-15);
        let delta = attitude_delta(&q_prev, &q_curr, true);
        assert_identity(&delta);
    }

    #[test]
    fn yaw_only_ignores_pure_roll() {
        let q_prev = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.7);
        // Same heading, rolled in the body frame.
        let q_curr = q_prev * UnitQuaternion::from_euler_angles(0.4, 0.0, 0.0);
        assert_identity(&attitude_delta(&q_prev, &q_curr, true));

        let full = attitude_delta(&q_prev, &q_curr, false);
        assert_abs_diff_eq!(full.angle(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn yaw_only_keeps_heading_change() {
        let q_prev = UnitQuaternion::from_euler_angles(0.1, 0.05, 0.2);
        let q_curr = q_prev * UnitQuaternion::from_euler_angles(0.0, 0.0, 0.35);
        let delta = attitude_delta(&q_prev, &q_curr, true);
        let (roll, pitch, yaw) = delta.euler_angles();
        assert_abs_diff_eq!(roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pitch, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(yaw, 0.35, epsilon = 1e-12);
    }

    #[test]
    fn half_turn_about_horizontal_axis_has_no_twist() {
        let flip = UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0.0, 0.0);
        assert_abs_diff_eq!(yaw_twist(&flip).angle(), 0.0, epsilon = 1e-12);
    }
}
