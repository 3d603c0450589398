// lofront_replay/src/replay.rs

//! Drives a [`Frontend`] through a sorted [`MeasurementSynchronizer`].

use lofront_core::buffer::MeasurementBuffer;
use lofront_core::frontend::{Frontend, FrontendOutput};
use lofront_core::messages::PoseStampedSample;
use lofront_core::registration::RegistrationStatus;
use lofront_core::synchronizer::{MeasurementSynchronizer, SensorType};
use lofront_core::types::{Pose3, Timestamp};
use log::{debug, info};

/// Aggregate statistics of one replay.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub scans: usize,
    /// Scans that produced an output.
    pub cycles: usize,
    pub keyframes: usize,
    pub map_refreshes: usize,
    pub rejected: usize,
    /// Cycles whose registration was seeded by an auxiliary sensor.
    pub seeded: usize,
    /// Worst position error against ground truth, when any was recorded.
    pub max_position_error: Option<f64>,
    pub final_estimate: Pose3,
}

impl ReplaySummary {
    fn new() -> Self {
        Self {
            scans: 0,
            cycles: 0,
            keyframes: 0,
            map_refreshes: 0,
            rejected: 0,
            seeded: 0,
            max_position_error: None,
            final_estimate: Pose3::identity(),
        }
    }
}

/// Compares the integrated estimate with ground truth re-anchored at the first
/// completed cycle, since the estimate starts at identity there.
struct GroundTruthTracker {
    truth: MeasurementBuffer<PoseStampedSample>,
    anchor: Option<Pose3>,
}

impl GroundTruthTracker {
    fn new(sync: &MeasurementSynchronizer) -> Self {
        let messages = sync.gt_messages();
        let mut truth = MeasurementBuffer::new(messages.len());
        for message in messages {
            truth.insert((*message.msg).clone());
        }
        Self {
            truth,
            anchor: None,
        }
    }

    fn position_error(&mut self, output: &FrontendOutput) -> Option<f64> {
        let truth = self.truth.query_nearest(output.timestamp)?.pose;
        let anchor = *self.anchor.get_or_insert(truth);
        let expected = anchor.inverse() * truth;
        Some((expected.translation.vector - output.integrated.translation.vector).norm())
    }
}

fn message_stamp(
    sync: &MeasurementSynchronizer,
    sensor: SensorType,
    index: usize,
) -> Option<Timestamp> {
    Some(match sensor {
        SensorType::PointCloud => sync.point_cloud_message(index)?.msg.timestamp,
        SensorType::PclPointCloud => sync.pcl_point_cloud_message(index)?.msg.timestamp,
        SensorType::Imu => sync.imu_message(index)?.msg.timestamp,
        SensorType::Odom => sync.odom_message(index)?.msg.timestamp,
        SensorType::Gt => sync.gt_message(index)?.msg.timestamp,
    })
}

/// Consumes every pending message in global order.
///
/// `external_poses` must be sorted by time; each is delivered just before the
/// first message that is not older than it.
pub fn replay(
    frontend: &mut Frontend,
    sync: &mut MeasurementSynchronizer,
    external_poses: &[PoseStampedSample],
    ground_truth_as_pose: bool,
) -> ReplaySummary {
    let mut summary = ReplaySummary::new();
    let mut tracker = GroundTruthTracker::new(sync);
    let mut pending_poses = external_poses.iter().peekable();

    while let Some((sensor, index)) = sync.get_next_message() {
        let Some(stamp) = message_stamp(sync, sensor, index) else {
            continue;
        };
        while let Some(pose) = pending_poses.next_if(|pose| pose.timestamp <= stamp) {
            frontend.on_pose_stamped(pose.clone());
        }

        let output = match sensor {
            SensorType::PointCloud => {
                summary.scans += 1;
                sync.point_cloud_message(index)
                    .and_then(|message| frontend.on_raw_scan(&message.msg))
            }
            SensorType::PclPointCloud => {
                summary.scans += 1;
                sync.pcl_point_cloud_message(index)
                    .and_then(|message| frontend.on_scan((*message.msg).clone()))
            }
            SensorType::Imu => {
                if let Some(message) = sync.imu_message(index) {
                    frontend.on_imu((*message.msg).clone());
                }
                None
            }
            SensorType::Odom => {
                if let Some(message) = sync.odom_message(index) {
                    frontend.on_odometry((*message.msg).clone());
                }
                None
            }
            SensorType::Gt => {
                if ground_truth_as_pose {
                    if let Some(message) = sync.gt_message(index) {
                        frontend.on_pose_stamped((*message.msg).clone());
                    }
                }
                None
            }
        };

        if let Some(output) = output {
            record(&mut summary, &mut tracker, &output);
        }
    }
    for pose in pending_poses {
        frontend.on_pose_stamped(pose.clone());
    }

    summary.final_estimate = *frontend.integrated_estimate();
    summary
}

fn record(
    summary: &mut ReplaySummary,
    tracker: &mut GroundTruthTracker,
    output: &FrontendOutput,
) {
    summary.cycles += 1;
    summary.keyframes += usize::from(output.keyframe);
    summary.map_refreshes += usize::from(output.refresh_map);
    summary.seeded += usize::from(output.prior_applied);
    if matches!(output.status, RegistrationStatus::Rejected { .. }) {
        summary.rejected += 1;
    }

    let t = output.integrated.translation.vector;
    debug!(
        "[{:.3}] {:?} via {:?}: ({:.3}, {:.3}, {:.3}), fitness {:.5}",
        output.timestamp,
        output.status,
        output.integration_mode,
        t.x,
        t.y,
        t.z,
        output.fitness_score
    );
    if let Some(timing) = output.timing {
        debug!(
            "[{:.3}] scan-to-scan {:?}, total {:?}",
            output.timestamp, timing.scan_to_scan, timing.total
        );
    }
    if output.keyframe {
        info!("Keyframe at {:.3}: ({:.3}, {:.3}, {:.3})", output.timestamp, t.x, t.y, t.z);
    }

    if let Some(error) = tracker.position_error(output) {
        debug!("[{:.3}] position error {:.4} m", output.timestamp, error);
        let worst = summary.max_position_error.map_or(error, |e| e.max(error));
        summary.max_position_error = Some(worst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use approx::assert_abs_diff_eq;
    use lofront_core::config::FrontendConfig;
    use std::fmt::Write;

    /// A grid of posts seen while driving 0.1 m per scan along x.
    fn session_toml(scans: usize, packed_every: usize) -> String {
        let mut world = Vec::new();
        for i in -6..=6 {
            for j in -6..=6 {
                for k in 0..3 {
                    let jitter = ((i * 7 + j * 13 + k * 5) % 11) as f64 * 0.03;
                    world.push([
                        i as f64 * 1.3 + jitter,
                        j as f64 * 1.1 - jitter,
                        k as f64 * 0.9,
                    ]);
                }
            }
        }

        let mut toml = String::new();
        for s in 0..scans {
            let t = s as f64 * 0.1;
            let x = s as f64 * 0.1;
            let points: Vec<String> = world
                .iter()
                .map(|p| format!("[{:.6}, {:.6}, {:.6}]", p[0] - x, p[1], p[2]))
                .collect();
            let packed = packed_every > 0 && s % packed_every == 1;
            writeln!(
                toml,
                "[[scans]]\ntimestamp = {t:?}\npacked = {packed}\npoints = [{}]\n",
                points.join(", ")
            )
            .unwrap();
            writeln!(toml, "[[ground_truth]]\ntimestamp = {t:?}").unwrap();
            writeln!(toml, "translation = [{x:?}, 0.0, 0.0]").unwrap();
            writeln!(toml, "rotation = [0.0, 0.0, 0.0, 1.0]\n").unwrap();
        }
        toml
    }

    fn run(config: FrontendConfig, session: &Session, gt_as_pose: bool) -> ReplaySummary {
        let mut frontend = Frontend::new(config, Some(&session.tf())).unwrap();
        let mut sync = MeasurementSynchronizer::new();
        session.fill(&mut sync);
        replay(&mut frontend, &mut sync, &session.external_poses(), gt_as_pose)
    }

    #[test]
    fn replays_every_scan_and_tracks_truth() {
        let session = Session::from_toml_str(&session_toml(8, 3)).unwrap();
        let summary = run(FrontendConfig::default(), &session, false);

        assert_eq!(summary.scans, 8);
        assert_eq!(summary.cycles, 8);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.seeded, 0);
        assert!(summary.keyframes >= 1);
        assert_abs_diff_eq!(summary.final_estimate.translation.vector.x, 0.7, epsilon = 1e-3);
        assert!(summary.max_position_error.unwrap() < 1e-3);
    }

    #[test]
    fn ground_truth_can_seed_registration() {
        let session = Session::from_toml_str(&session_toml(6, 0)).unwrap();
        let mut config = FrontendConfig::default();
        config.integration.use_imu_integration = false;
        config.integration.use_pose_stamped_integration = true;

        let summary = run(config.clone(), &session, true);
        assert!(summary.seeded > 0);

        let summary = run(config, &session, false);
        assert_eq!(summary.seeded, 0);
    }
}
