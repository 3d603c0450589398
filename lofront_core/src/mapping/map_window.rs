// lofront_core/src/mapping/map_window.rs

use crate::config::MapWindowConfig;
use crate::types::{Pose3, Timestamp};
use log::debug;
use std::collections::VecDeque;

/// Fixed-capacity sliding window of scalar samples.
#[derive(Debug, Clone)]
struct SlidingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Zero while empty.
    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Decides when the local map window should be rebuilt.
///
/// A refresh needs the platform to have moved more than
/// `translation_threshold` since the last refresh *and* to be moving slowly:
/// both running-average velocities must be below their thresholds.
#[derive(Debug, Clone)]
pub struct MapRefreshPolicy {
    config: MapWindowConfig,
    last_refresh_pose: Pose3,
    previous_pose: Option<Pose3>,
    previous_timestamp: Option<Timestamp>,
    translational_velocity: SlidingWindow,
    rotational_velocity: SlidingWindow,
}

impl MapRefreshPolicy {
    pub fn new(config: MapWindowConfig) -> Self {
        let size = config.velocity_buffer_size;
        Self {
            config,
            last_refresh_pose: Pose3::identity(),
            previous_pose: None,
            previous_timestamp: None,
            translational_velocity: SlidingWindow::new(size),
            rotational_velocity: SlidingWindow::new(size),
        }
    }

    /// Feeds this cycle's pose and returns whether the map window should be
    /// refreshed.
    pub fn update(&mut self, pose: &Pose3, stamp: Timestamp) -> bool {
        if let (Some(previous), Some(previous_stamp)) = (self.previous_pose, self.previous_timestamp)
        {
            let dt = stamp - previous_stamp;
            if dt > 0.0 {
                let step = previous.inverse() * pose;
                self.translational_velocity
                    .push(step.translation.vector.norm() / dt);
                self.rotational_velocity.push(step.rotation.angle() / dt);
            }
        }
        self.previous_pose = Some(*pose);
        self.previous_timestamp = Some(stamp);

        let displacement = (self.last_refresh_pose.inverse() * pose)
            .translation
            .vector
            .norm();
        if displacement <= self.config.translation_threshold {
            return false;
        }

        let translational = self.translational_velocity.average();
        let rotational = self.rotational_velocity.average();
        if translational < self.config.translational_velocity_threshold
            && rotational < self.config.rotational_velocity_threshold
        {
            debug!(
                "Refreshing map window after {:.3} m ({:.3} m/s, {:.3} rad/s)",
                displacement, translational, rotational
            );
            self.last_refresh_pose = *pose;
            return true;
        }
        debug!(
            "Map refresh deferred: moving too fast ({:.3} m/s, {:.3} rad/s)",
            translational, rotational
        );
        false
    }

    pub fn average_translational_velocity(&self) -> f64 {
        self.translational_velocity.average()
    }

    pub fn average_rotational_velocity(&self) -> f64 {
        self.rotational_velocity.average()
    }

    pub fn last_refresh_pose(&self) -> &Pose3 {
        &self.last_refresh_pose
    }
}
