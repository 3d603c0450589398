// lofront_core/tests/synthetic_replay.rs

//! A synthetic drive replayed end to end: interleaved scan, inertial,
//! odometry and ground-truth streams go through the synchronizer and the
//! frontend, and the integrated estimate must track ground truth.

use approx::assert_abs_diff_eq;
use lofront_core::prelude::*;
use nalgebra::{Translation3, UnitQuaternion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

const SCAN_PERIOD: f64 = 0.1;
const IMU_PERIOD: f64 = 0.02;
const SCANS: usize = 20;
const SPEED: f64 = 0.5; // m/s along world x
const YAW_RATE: f64 = 0.2; // rad/s

fn truth(t: f64) -> Pose3 {
    Pose3::from_parts(
        Translation3::new(SPEED * t, 0.0, 0.0),
        UnitQuaternion::from_euler_angles(0.0, 0.0, YAW_RATE * t),
    )
}

fn world() -> PointCloud {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let points = (0..600)
        .map(|_| {
            Point::new(
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-2.0..4.0),
            )
        })
        .collect();
    PointCloud::new("map", 0.0, points)
}

fn recorded_session() -> MeasurementSynchronizer {
    let world = world();
    let mut sync = MeasurementSynchronizer::new();

    // Streams are added out of time order on purpose.
    for k in (0..SCANS).rev() {
        let t = k as f64 * SCAN_PERIOD;
        let mut scan = world.transformed(&truth(t).inverse());
        scan.frame_id = "lidar".to_string();
        scan.timestamp = t;
        sync.add_pcl_point_cloud_message(Arc::new(scan), "velodyne");
        sync.add_gt_message(Arc::new(PoseStampedSample::new(t, truth(t))));
    }
    let imu_count = (SCANS as f64 * SCAN_PERIOD / IMU_PERIOD) as usize;
    for j in 0..imu_count {
        let t = j as f64 * IMU_PERIOD;
        sync.add_imu_message(Arc::new(ImuSample::from_orientation(
            "imu",
            t,
            truth(t).rotation,
        )));
    }
    for k in 0..SCANS {
        let t = k as f64 * SCAN_PERIOD + 0.05;
        sync.add_odom_message(Arc::new(OdometrySample::new(t, truth(t))));
    }
    sync.sort_messages();
    sync
}

#[test]
fn replay_tracks_ground_truth() {
    let mut config = FrontendConfig::default();
    config.integration.use_odometry_integration = true;
    config.registration.iterations = 30;
    config.registration.tf_epsilon = 1e-12;
    let mut frontend = Frontend::new(config, None).expect("valid config");
    let mut sync = recorded_session();

    let mut outputs = Vec::new();
    let mut last_truth = None;
    let mut previous_stamp = f64::NEG_INFINITY;
    while let Some((sensor, index)) = sync.get_next_message() {
        let stamp = match sensor {
            SensorType::PclPointCloud => {
                let msg = sync.pcl_point_cloud_message(index).expect("indexed");
                assert_eq!(msg.tag, "velodyne");
                if let Some(out) = frontend.on_scan((*msg.msg).clone()) {
                    outputs.push(out);
                }
                msg.msg.timestamp
            }
            SensorType::Imu => {
                let msg = sync.imu_message(index).expect("indexed");
                frontend.on_imu((*msg.msg).clone());
                msg.msg.timestamp
            }
            SensorType::Odom => {
                let msg = sync.odom_message(index).expect("indexed");
                frontend.on_odometry((*msg.msg).clone());
                msg.msg.timestamp
            }
            SensorType::Gt => {
                let msg = sync.gt_message(index).expect("indexed");
                last_truth = Some(msg.msg.pose);
                msg.msg.timestamp
            }
            SensorType::PointCloud => unreachable!("no raw clouds recorded"),
        };
        assert!(stamp >= previous_stamp, "replay went back in time");
        previous_stamp = stamp;
    }
    assert!(!sync.next_message_exists());

    assert_eq!(outputs.len(), SCANS);
    assert_eq!(outputs[0].status, RegistrationStatus::Initialized);
    assert!(outputs[0].keyframe);
    assert!(outputs.iter().filter(|o| o.keyframe).count() >= 2);

    // Inertial outranks odometry as soon as it has been received.
    let last = outputs.last().expect("outputs");
    assert_eq!(last.integration_mode, IntegrationMode::Inertial);
    assert!(last.prior_applied);
    assert!(outputs
        .iter()
        .all(|o| !matches!(o.status, RegistrationStatus::Rejected { .. })));

    let truth = last_truth.expect("ground truth replayed");
    let estimate = frontend.integrated_estimate();
    assert_abs_diff_eq!(
        estimate.translation.vector,
        truth.translation.vector,
        epsilon = 1e-3
    );
    assert_abs_diff_eq!(estimate.rotation.angle_to(&truth.rotation), 0.0, epsilon = 1e-3);

    sync.clear_messages();
    assert!(!sync.next_message_exists());
}
