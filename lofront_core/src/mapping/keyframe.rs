// lofront_core/src/mapping/keyframe.rs

use crate::config::KeyframeConfig;
use crate::types::Pose3;
use log::debug;

/// Marks a scan as a keyframe once accumulated motion since the last one
/// exceeds either threshold (strictly).
#[derive(Debug, Clone)]
pub struct KeyframePolicy {
    config: KeyframeConfig,
    last_keyframe_pose: Pose3,
    first_scan: bool,
}

impl KeyframePolicy {
    pub fn new(config: KeyframeConfig) -> Self {
        Self {
            config,
            last_keyframe_pose: Pose3::identity(),
            first_scan: true,
        }
    }

    /// Starts from an arbitrary reference pose instead of the origin.
    pub fn with_last_keyframe(config: KeyframeConfig, last_keyframe_pose: Pose3) -> Self {
        Self {
            config,
            last_keyframe_pose,
            first_scan: false,
        }
    }

    /// Tests `pose` (the integrated estimate) and, on a keyframe, makes it the
    /// new reference.
    pub fn check(&mut self, pose: &Pose3) -> bool {
        let first_scan = std::mem::replace(&mut self.first_scan, false);
        if first_scan && self.config.add_first_scan {
            debug!("First scan added as keyframe");
            self.last_keyframe_pose = *pose;
            return true;
        }

        let delta = self.last_keyframe_pose.inverse() * pose;
        let translation = delta.translation.vector.norm();
        let rotation = delta.rotation.angle();
        if translation > self.config.translation_threshold
            || rotation > self.config.rotation_threshold
        {
            debug!("New keyframe after {:.3} m, {:.3} rad", translation, rotation);
            self.last_keyframe_pose = *pose;
            return true;
        }
        false
    }

    pub fn last_keyframe_pose(&self) -> &Pose3 {
        &self.last_keyframe_pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn config(add_first_scan: bool) -> KeyframeConfig {
        KeyframeConfig {
            translation_threshold: 1.0,
            rotation_threshold: 0.5,
            add_first_scan,
        }
    }

    // Dyadic coordinates keep the composed distances exact.
    fn base() -> Pose3 {
        Pose3::translation(3.0, -2.0, 0.5)
    }

    #[test]
    fn translation_threshold_is_strict() {
        let mut policy = KeyframePolicy::with_last_keyframe(config(false), base());

        // Exactly at the threshold: not yet.
        let at = Pose3::translation(4.0, -2.0, 0.5);
        assert!(!policy.check(&at));

        let beyond = Pose3::translation(4.0 + 1e-6, -2.0, 0.5);
        assert!(policy.check(&beyond));
        assert_eq!(*policy.last_keyframe_pose(), beyond);
    }

    #[test]
    fn rotation_alone_triggers() {
        let start = Pose3::from_parts(
            Translation3::new(1.0, 1.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 1.2),
        );
        let mut policy = KeyframePolicy::with_last_keyframe(config(false), start);
        assert!(!policy.check(&(start * Pose3::rotation(Vector3::z() * 0.4))));
        assert!(policy.check(&(start * Pose3::rotation(Vector3::z() * 0.6))));
    }

    #[test]
    fn first_scan_respects_toggle() {
        let mut policy = KeyframePolicy::new(config(true));
        assert!(policy.check(&Pose3::identity()));
        assert!(!policy.check(&Pose3::identity()));

        let mut policy = KeyframePolicy::new(config(false));
        assert!(!policy.check(&Pose3::identity()));
    }
}
