// lofront_core/src/messages.rs

use crate::error::DecodeError;
use crate::types::{Pose3, Timestamp};
use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

/// Anything carrying an acquisition time. Buffers and the synchronizer key on it.
pub trait Stamped {
    fn timestamp(&self) -> Timestamp;
}

// =========================================================================
// == Perception-Specific Data Structures ==
// =========================================================================

/// Represents a single point from a sensor like a LiDAR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// The 3D position of the point in the SENSOR's local coordinate frame.
    pub position: Point3<f64>,
    /// Optional: The intensity of the laser return for this point.
    pub intensity: Option<f32>,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
            intensity: None,
        }
    }
}

/// A decoded, ready-to-register scan.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// The frame the points are expressed in.
    pub frame_id: String,
    /// The timestamp of when the scan was captured.
    pub timestamp: Timestamp,
    /// The collection of points that make up the scan.
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn new(frame_id: impl Into<String>, timestamp: Timestamp, points: Vec<Point>) -> Self {
        Self {
            frame_id: frame_id.into(),
            timestamp,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns a copy of this cloud with every point mapped through `pose`.
    pub fn transformed(&self, pose: &Pose3) -> PointCloud {
        PointCloud {
            frame_id: self.frame_id.clone(),
            timestamp: self.timestamp,
            points: self
                .points
                .iter()
                .map(|p| Point {
                    position: pose * p.position,
                    intensity: p.intensity,
                })
                .collect(),
        }
    }
}

impl Stamped for PointCloud {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// A scan as it comes off the wire: packed little-endian `f32` records.
///
/// Each record is `point_step` bytes long with x, y, z at offsets 0, 4 and 8.
/// When `intensity_offset` is set, a fourth `f32` is read from that offset.
#[derive(Clone, Debug, Default)]
pub struct RawPointCloud {
    pub frame_id: String,
    pub timestamp: Timestamp,
    pub point_step: usize,
    pub intensity_offset: Option<usize>,
    pub data: Vec<u8>,
}

impl RawPointCloud {
    /// Packs xyz points into a raw cloud with a 12 byte stride.
    pub fn from_xyz(frame_id: impl Into<String>, timestamp: Timestamp, xyz: &[[f32; 3]]) -> Self {
        let mut data = Vec::with_capacity(xyz.len() * 12);
        for p in xyz {
            for c in p {
                data.extend_from_slice(&c.to_le_bytes());
            }
        }
        Self {
            frame_id: frame_id.into(),
            timestamp,
            point_step: 12,
            intensity_offset: None,
            data,
        }
    }

    /// Decodes the packed buffer into a [`PointCloud`].
    pub fn to_point_cloud(&self) -> Result<PointCloud, DecodeError> {
        let min_step = match self.intensity_offset {
            Some(offset) => (offset + 4).max(12),
            None => 12,
        };
        if self.point_step < min_step {
            return Err(DecodeError::PointStepTooSmall {
                point_step: self.point_step,
                required: min_step,
            });
        }
        if self.data.len() % self.point_step != 0 {
            return Err(DecodeError::TruncatedBuffer {
                len: self.data.len(),
                point_step: self.point_step,
            });
        }

        let read_f32 = |record: &[u8], offset: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&record[offset..offset + 4]);
            f32::from_le_bytes(bytes)
        };

        let points = self
            .data
            .chunks_exact(self.point_step)
            .map(|record| Point {
                position: Point3::new(
                    read_f32(record, 0) as f64,
                    read_f32(record, 4) as f64,
                    read_f32(record, 8) as f64,
                ),
                intensity: self.intensity_offset.map(|offset| read_f32(record, offset)),
            })
            .collect();

        Ok(PointCloud::new(self.frame_id.clone(), self.timestamp, points))
    }
}

impl Stamped for RawPointCloud {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

// =========================================================================
// == Auxiliary Sensor Samples ==
// =========================================================================

/// An inertial sample. Only the orientation feeds the registration prior; the
/// rates are carried so that corrupted packets can be detected as a whole.
#[derive(Clone, Debug)]
pub struct ImuSample {
    pub frame_id: String,
    pub timestamp: Timestamp,
    /// Raw (possibly unnormalized) orientation as delivered by the driver.
    pub orientation: Quaternion<f64>,
    pub angular_velocity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
}

impl ImuSample {
    pub fn from_orientation(
        frame_id: impl Into<String>,
        timestamp: Timestamp,
        orientation: UnitQuaternion<f64>,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            timestamp,
            orientation: orientation.into_inner(),
            angular_velocity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }

    /// False if any field is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.orientation.coords.iter().all(|c| c.is_finite())
            && self.angular_velocity.iter().all(|c| c.is_finite())
            && self.linear_acceleration.iter().all(|c| c.is_finite())
    }

    /// The normalized attitude, or `None` for a corrupted/degenerate quaternion.
    pub fn attitude(&self) -> Option<UnitQuaternion<f64>> {
        if !self.is_finite() || self.orientation.norm() < 1e-9 {
            return None;
        }
        Some(UnitQuaternion::from_quaternion(self.orientation))
    }
}

impl Stamped for ImuSample {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// A wheel-odometry sample: the pose of the base in the odometry frame.
#[derive(Clone, Debug)]
pub struct OdometrySample {
    pub frame_id: String,
    pub child_frame_id: String,
    pub timestamp: Timestamp,
    pub pose: Pose3,
}

impl OdometrySample {
    pub fn new(timestamp: Timestamp, pose: Pose3) -> Self {
        Self {
            frame_id: "odom".to_string(),
            child_frame_id: "base_link".to_string(),
            timestamp,
            pose,
        }
    }
}

impl Stamped for OdometrySample {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// A stamped pose from an external source (visual odometry, motion capture...).
#[derive(Clone, Debug)]
pub struct PoseStampedSample {
    pub frame_id: String,
    pub timestamp: Timestamp,
    pub pose: Pose3,
}

impl PoseStampedSample {
    pub fn new(timestamp: Timestamp, pose: Pose3) -> Self {
        Self {
            frame_id: "world".to_string(),
            timestamp,
            pose,
        }
    }
}

impl Stamped for PoseStampedSample {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Checks a rigid transform for NaN or infinite components.
pub(crate) fn pose_is_finite(pose: &Pose3) -> bool {
    pose.translation.vector.iter().all(|c| c.is_finite())
        && pose.rotation.coords.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn raw_cloud_decodes_packed_records() {
        let raw = RawPointCloud::from_xyz("velodyne", 1.5, &[[1.0, 2.0, 3.0], [-4.0, 0.5, 0.25]]);
        let cloud = raw.to_point_cloud().unwrap();

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.frame_id, "velodyne");
        assert_abs_diff_eq!(cloud.timestamp, 1.5);
        assert_eq!(cloud.points[1].position, Point3::new(-4.0, 0.5, 0.25));
        assert!(cloud.points[0].intensity.is_none());
    }

    #[test]
    fn raw_cloud_reads_intensity_at_offset() {
        let mut data = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 0.0, 42.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let raw = RawPointCloud {
            frame_id: "os1".into(),
            timestamp: 0.0,
            point_step: 20,
            intensity_offset: Some(16),
            data,
        };
        let cloud = raw.to_point_cloud().unwrap();
        assert_eq!(cloud.points[0].intensity, Some(42.0));
    }

    #[test]
    fn raw_cloud_rejects_truncated_buffer() {
        let mut raw = RawPointCloud::from_xyz("velodyne", 0.0, &[[1.0, 2.0, 3.0]]);
        raw.data.pop();
        assert!(matches!(
            raw.to_point_cloud(),
            Err(DecodeError::TruncatedBuffer { len: 11, point_step: 12 })
        ));

        raw.point_step = 8;
        assert!(matches!(
            raw.to_point_cloud(),
            Err(DecodeError::PointStepTooSmall { .. })
        ));
    }

    #[test]
    fn imu_with_nan_has_no_attitude() {
        let mut imu = ImuSample::from_orientation("imu", 0.0, UnitQuaternion::identity());
        assert!(imu.attitude().is_some());

        imu.angular_velocity.x = f64::NAN;
        assert!(!imu.is_finite());
        assert!(imu.attitude().is_none());
    }

    #[test]
    fn imu_with_infinity_has_no_attitude() {
        let mut imu = ImuSample::from_orientation("imu", 0.0, UnitQuaternion::identity());
        imu.orientation.coords.x = f64::INFINITY;
        assert!(!imu.is_finite());
        assert!(imu.attitude().is_none());

        let mut imu = ImuSample::from_orientation("imu", 0.0, UnitQuaternion::identity());
        imu.linear_acceleration.z = f64::NEG_INFINITY;
        assert!(imu.attitude().is_none());
    }
}
