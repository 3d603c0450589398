// lofront_core/src/types.rs

use nalgebra::Isometry3;
use std::collections::HashMap;

// --- Core Type Aliases ---
/// Seconds, as carried by every sensor message.
pub type Timestamp = f64;
/// A rigid transform (rotation + translation) in 3D.
pub type Pose3 = Isometry3<f64>;

// --- Core Trait for Transform Lookups ---
// Calibration is resolved through this seam once, at frontend construction.
pub trait TfProvider {
    /// Gets the transform FROM `from_frame` TO `to_frame`.
    fn get_transform(&self, from_frame: &str, to_frame: &str) -> Option<Pose3>;
}

/// A fixed table of static transforms, e.g. the imu -> base_link extrinsic.
#[derive(Debug, Clone, Default)]
pub struct StaticTf {
    transforms: HashMap<(String, String), Pose3>,
}

impl StaticTf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `from -> to`. The inverse direction is answered automatically.
    pub fn with_transform(mut self, from_frame: &str, to_frame: &str, pose: Pose3) -> Self {
        self.transforms
            .insert((from_frame.to_string(), to_frame.to_string()), pose);
        self
    }
}

impl TfProvider for StaticTf {
    fn get_transform(&self, from_frame: &str, to_frame: &str) -> Option<Pose3> {
        if from_frame == to_frame {
            return Some(Pose3::identity());
        }
        if let Some(pose) = self
            .transforms
            .get(&(from_frame.to_string(), to_frame.to_string()))
        {
            return Some(*pose);
        }
        self.transforms
            .get(&(to_frame.to_string(), from_frame.to_string()))
            .map(|pose| pose.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn static_tf_answers_both_directions() {
        let imu_to_base = Pose3::from_parts(
            Translation3::new(0.1, 0.0, 0.2),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
        );
        let tf = StaticTf::new().with_transform("imu", "base_link", imu_to_base);

        let forward = tf.get_transform("imu", "base_link").unwrap();
        let backward = tf.get_transform("base_link", "imu").unwrap();
        let round_trip = forward * backward;

        assert_abs_diff_eq!(round_trip.translation.vector.norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(round_trip.rotation.angle(), 0.0, epsilon = 1e-12);
        assert!(tf.get_transform("imu", "velodyne").is_none());
        assert!(tf.get_transform("velodyne", "velodyne").is_some());
    }
}
