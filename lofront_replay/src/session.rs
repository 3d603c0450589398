// lofront_replay/src/session.rs

//! The on-disk format of a recorded session.
//!
//! A session is a TOML document with one array of tables per stream:
//!
//! ```toml
//! [[calibration]]
//! from = "imu"
//! to = "base_link"
//! translation = [0.1, 0.0, 0.2]
//! rotation = [0.0, 0.0, 0.0, 1.0] # x, y, z, w
//!
//! [[scans]]
//! timestamp = 0.0
//! points = [[1.0, 2.0, 0.5], [3.0, -1.0, 0.2]]
//!
//! [[imu]]
//! timestamp = 0.0
//! orientation = [0.0, 0.0, 0.0, 1.0]
//! ```
//!
//! `odometry`, `poses` and `ground_truth` entries carry `timestamp`,
//! `translation` and `rotation`.

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use lofront_core::messages::{
    ImuSample, OdometrySample, Point, PointCloud, PoseStampedSample, RawPointCloud,
};
use lofront_core::synchronizer::MeasurementSynchronizer;
use lofront_core::types::{Pose3, StaticTf, Timestamp};
use nalgebra::{Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// =========================================================================
// == Records ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanRecord {
    pub timestamp: Timestamp,
    #[serde(default = "default_lidar_frame")]
    pub frame_id: String,
    #[serde(default)]
    pub tag: String,
    pub points: Vec<[f64; 3]>,
    /// Replay as a packed `f32` cloud through the raw point-cloud stream.
    #[serde(default)]
    pub packed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImuRecord {
    pub timestamp: Timestamp,
    #[serde(default = "default_imu_frame")]
    pub frame_id: String,
    /// x, y, z, w.
    pub orientation: [f64; 4],
    #[serde(default)]
    pub angular_velocity: [f64; 3],
    #[serde(default)]
    pub linear_acceleration: [f64; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoseRecord {
    pub timestamp: Timestamp,
    pub translation: [f64; 3],
    /// x, y, z, w.
    pub rotation: [f64; 4],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationRecord {
    pub from: String,
    pub to: String,
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

fn default_lidar_frame() -> String {
    "lidar".to_string()
}

fn default_imu_frame() -> String {
    "imu".to_string()
}

fn quaternion([x, y, z, w]: [f64; 4]) -> Quaternion<f64> {
    Quaternion::new(w, x, y, z)
}

fn pose(translation: [f64; 3], rotation: [f64; 4]) -> Pose3 {
    let [x, y, z] = translation;
    Pose3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_quaternion(quaternion(rotation)),
    )
}

impl ScanRecord {
    pub fn to_point_cloud(&self) -> PointCloud {
        let points = self.points.iter().map(|&[x, y, z]| Point::new(x, y, z)).collect();
        PointCloud::new(self.frame_id.clone(), self.timestamp, points)
    }

    pub fn to_raw_point_cloud(&self) -> RawPointCloud {
        let xyz: Vec<[f32; 3]> = self
            .points
            .iter()
            .map(|&[x, y, z]| [x as f32, y as f32, z as f32])
            .collect();
        RawPointCloud::from_xyz(self.frame_id.clone(), self.timestamp, &xyz)
    }
}

impl ImuRecord {
    pub fn to_sample(&self) -> ImuSample {
        ImuSample {
            frame_id: self.frame_id.clone(),
            timestamp: self.timestamp,
            orientation: quaternion(self.orientation),
            angular_velocity: Vector3::from(self.angular_velocity),
            linear_acceleration: Vector3::from(self.linear_acceleration),
        }
    }
}

impl PoseRecord {
    pub fn pose(&self) -> Pose3 {
        pose(self.translation, self.rotation)
    }
}

// =========================================================================
// == Session ==
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Session {
    pub calibration: Vec<CalibrationRecord>,
    pub scans: Vec<ScanRecord>,
    pub imu: Vec<ImuRecord>,
    pub odometry: Vec<PoseRecord>,
    pub poses: Vec<PoseRecord>,
    pub ground_truth: Vec<PoseRecord>,
}

impl Session {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("session file {} does not exist", path.display());
        }
        Self::from_figment(Figment::new().merge(Toml::file(path)))
            .with_context(|| format!("failed to load session {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(contents)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().context("malformed session")
    }

    /// The static transforms recorded with the session.
    pub fn tf(&self) -> StaticTf {
        self.calibration.iter().fold(StaticTf::new(), |tf, record| {
            tf.with_transform(&record.from, &record.to, pose(record.translation, record.rotation))
        })
    }

    /// Queues every recorded message and sorts them into replay order.
    ///
    /// Scans marked `packed` go through the raw point-cloud stream. External
    /// poses have no synchronizer stream; see [`Session::external_poses`].
    pub fn fill(&self, sync: &mut MeasurementSynchronizer) {
        for scan in &self.scans {
            let tag = scan.tag.as_str();
            if scan.packed {
                sync.add_point_cloud_message(Arc::new(scan.to_raw_point_cloud()), tag);
            } else {
                sync.add_pcl_point_cloud_message(Arc::new(scan.to_point_cloud()), tag);
            }
        }
        for record in &self.imu {
            sync.add_imu_message(Arc::new(record.to_sample()));
        }
        for record in &self.odometry {
            sync.add_odom_message(Arc::new(OdometrySample::new(record.timestamp, record.pose())));
        }
        for record in &self.ground_truth {
            sync.add_gt_message(Arc::new(PoseStampedSample::new(
                record.timestamp,
                record.pose(),
            )));
        }
        sync.sort_messages();
    }

    /// External-pose samples in time order.
    pub fn external_poses(&self) -> Vec<PoseStampedSample> {
        let mut poses: Vec<_> = self
            .poses
            .iter()
            .map(|record| PoseStampedSample::new(record.timestamp, record.pose()))
            .collect();
        poses.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        poses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use lofront_core::synchronizer::SensorType;
    use lofront_core::types::TfProvider;

    const SESSION: &str = r#"
        [[calibration]]
        from = "imu"
        to = "base_link"
        translation = [0.1, 0.0, 0.0]
        rotation = [0.0, 0.0, 0.0, 1.0]

        [[scans]]
        timestamp = 0.1
        tag = "front"
        points = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]

        [[scans]]
        timestamp = 0.0
        packed = true
        points = [[1.0, 0.0, 0.0]]

        [[imu]]
        timestamp = 0.1
        orientation = [0.0, 0.0, 0.0, 1.0]

        [[odometry]]
        timestamp = 0.05
        translation = [1.0, 2.0, 3.0]
        rotation = [0.0, 0.0, 0.0, 1.0]

        [[poses]]
        timestamp = 0.05
        translation = [0.0, 0.0, 0.0]
        rotation = [0.0, 0.0, 0.0, 1.0]

        [[ground_truth]]
        timestamp = 0.0
        translation = [0.0, 0.0, 0.0]
        rotation = [0.0, 0.0, 0.0, 1.0]
    "#;

    #[test]
    fn parses_every_stream() {
        let session = Session::from_toml_str(SESSION).unwrap();
        assert_eq!(session.scans.len(), 2);
        assert_eq!(session.scans[0].frame_id, "lidar");
        assert_eq!(session.imu[0].frame_id, "imu");
        assert_eq!(session.poses.len(), 1);
        assert_abs_diff_eq!(session.odometry[0].pose().translation.vector.y, 2.0);

        let tf = session.tf();
        let calibration = tf.get_transform("imu", "base_link").expect("recorded");
        assert_abs_diff_eq!(calibration.translation.vector.x, 0.1);
    }

    #[test]
    fn fills_synchronizer_in_time_order() {
        let session = Session::from_toml_str(SESSION).unwrap();
        let mut sync = MeasurementSynchronizer::new();
        session.fill(&mut sync);

        let mut order = Vec::new();
        while let Some((sensor, _)) = sync.get_next_message() {
            order.push(sensor);
        }
        assert_eq!(
            order,
            vec![
                SensorType::PointCloud,
                SensorType::Gt,
                SensorType::Odom,
                SensorType::PclPointCloud,
                SensorType::Imu,
            ]
        );
        assert_eq!(sync.pcl_point_cloud_message(0).unwrap().tag, "front");
        assert_eq!(session.external_poses().len(), 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Session::from_toml_str("[[scans]]\ntimestamp = 0.0\npoints = []\ncolor = 1\n");
        assert!(err.is_err());
    }
}
