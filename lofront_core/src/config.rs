// lofront_core/src/config.rs

//! The frontend's full option surface.
//!
//! Every group deserializes with defaults for missing fields, so a config file
//! only needs to name what it changes. Loading from disk is the caller's job
//! (see `lofront_replay`); this module only defines the schema and validation.

use crate::error::ConfigError;
use serde::Deserialize;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FrontendConfig {
    pub buffers: BufferConfig,
    pub integration: IntegrationConfig,
    pub registration: RegistrationConfig,
    pub keyframe: KeyframeConfig,
    pub map_window: MapWindowConfig,
    /// Attach per-cycle timing to every output.
    pub enable_computation_time_profiling: bool,
}

impl FrontendConfig {
    /// Rejects values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("buffers.imu_size_limit", self.buffers.imu_size_limit)?;
        non_zero("buffers.odometry_size_limit", self.buffers.odometry_size_limit)?;
        non_zero(
            "buffers.pose_stamped_size_limit",
            self.buffers.pose_stamped_size_limit,
        )?;
        non_zero("registration.iterations", self.registration.iterations as usize)?;
        non_zero(
            "map_window.velocity_buffer_size",
            self.map_window.velocity_buffer_size,
        )?;

        positive("registration.tf_epsilon", self.registration.tf_epsilon)?;
        positive("registration.corr_dist", self.registration.corr_dist)?;
        positive("registration.max_translation", self.registration.max_translation)?;
        positive("registration.max_rotation", self.registration.max_rotation)?;
        positive("keyframe.translation_threshold", self.keyframe.translation_threshold)?;
        positive("keyframe.rotation_threshold", self.keyframe.rotation_threshold)?;
        positive(
            "map_window.translation_threshold",
            self.map_window.translation_threshold,
        )?;
        positive(
            "map_window.translational_velocity_threshold",
            self.map_window.translational_velocity_threshold,
        )?;
        positive(
            "map_window.rotational_velocity_threshold",
            self.map_window.rotational_velocity_threshold,
        )?;
        if let Some(offset) = self.integration.max_time_offset {
            positive("integration.max_time_offset", offset)?;
        }
        Ok(())
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroSize { field });
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(())
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

/// Per-modality caps on the number of buffered samples.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    pub imu_size_limit: usize,
    pub odometry_size_limit: usize,
    pub pose_stamped_size_limit: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            imu_size_limit: 1000,
            odometry_size_limit: 1000,
            pose_stamped_size_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationConfig {
    pub use_imu_integration: bool,
    /// Only the heading change of the inertial attitude seeds registration.
    pub use_imu_yaw_only: bool,
    pub use_odometry_integration: bool,
    pub use_pose_stamped_integration: bool,
    /// Warm-up count: a modality must be selected more than this many
    /// consecutive cycles before its delta is trusted.
    pub max_number_of_calls: u32,
    /// Conjugate inertial attitudes into the base frame before differencing.
    pub convert_imu_to_base_frame: bool,
    pub imu_frame_id: String,
    pub base_frame_id: String,
    /// Blend the two samples bracketing the scan time for odometry/pose lookups.
    pub interpolate: bool,
    /// Samples further than this from the scan time (seconds) are ignored.
    pub max_time_offset: Option<f64>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            use_imu_integration: true,
            use_imu_yaw_only: true,
            use_odometry_integration: false,
            use_pose_stamped_integration: false,
            max_number_of_calls: 1,
            convert_imu_to_base_frame: false,
            imu_frame_id: "imu".to_string(),
            base_frame_id: "base_link".to_string(),
            interpolate: false,
            max_time_offset: None,
        }
    }
}

/// Scan-to-scan registration and its acceptance gate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Convergence bound on the squared magnitude of a single iteration's update.
    pub tf_epsilon: f64,
    /// Maximum correspondence distance (meters).
    pub corr_dist: f64,
    pub iterations: u32,
    pub min_correspondences: usize,
    /// When false, `max_translation`/`max_rotation` are ignored.
    pub transform_thresholding: bool,
    pub max_translation: f64,
    /// Radians.
    pub max_rotation: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            tf_epsilon: 1e-8,
            corr_dist: 0.3,
            iterations: 10,
            min_correspondences: 10,
            transform_thresholding: false,
            max_translation: 1.0,
            max_rotation: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyframeConfig {
    pub translation_threshold: f64,
    /// Radians.
    pub rotation_threshold: f64,
    pub add_first_scan: bool,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            translation_threshold: 1.0,
            rotation_threshold: 0.3,
            add_first_scan: true,
        }
    }
}

/// Velocity-gated refresh of the local map window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapWindowConfig {
    /// When false, the local map is refreshed on keyframes instead.
    pub enabled: bool,
    pub translation_threshold: f64,
    /// m/s.
    pub translational_velocity_threshold: f64,
    /// rad/s.
    pub rotational_velocity_threshold: f64,
    pub velocity_buffer_size: usize,
}

impl Default for MapWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            translation_threshold: 1.0,
            translational_velocity_threshold: 1.0,
            rotational_velocity_threshold: 1.0,
            velocity_buffer_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(FrontendConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut config = FrontendConfig::default();
        config.buffers.odometry_size_limit = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroSize {
                field: "buffers.odometry_size_limit"
            })
        );

        let mut config = FrontendConfig::default();
        config.map_window.velocity_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_thresholds_are_rejected() {
        let mut config = FrontendConfig::default();
        config.keyframe.rotation_threshold = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "keyframe.rotation_threshold",
                ..
            })
        ));

        let mut config = FrontendConfig::default();
        config.integration.max_time_offset = Some(-0.1);
        assert!(config.validate().is_err());
    }
}
