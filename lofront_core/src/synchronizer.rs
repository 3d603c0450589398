// lofront_core/src/synchronizer.rs

//! Global time ordering of independently recorded sensor streams.
//!
//! Messages are appended to one queue per sensor type, then
//! [`MeasurementSynchronizer::sort_messages`] merges them into a single
//! sequence ordered by `(timestamp, sensor type)`, consumed front to back with
//! [`MeasurementSynchronizer::get_next_message`]. Only timestamps are read;
//! payloads are shared, never copied.

use crate::messages::{
    ImuSample, OdometrySample, PointCloud, PoseStampedSample, RawPointCloud, Stamped,
};
use crate::types::Timestamp;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

// =========================================================================
// == Sensor Types ==
// =========================================================================

/// The closed set of replayable streams.
///
/// Equal timestamps are broken by this order, which is fixed by
/// [`SensorType::rank`] rather than by declaration order:
/// `PointCloud < PclPointCloud < Imu < Odom < Gt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    /// Packed, undecoded point cloud.
    PointCloud,
    /// Already decoded point cloud.
    PclPointCloud,
    Imu,
    Odom,
    /// Ground-truth pose.
    Gt,
}

impl SensorType {
    pub const ALL: [SensorType; 5] = [
        SensorType::PointCloud,
        SensorType::PclPointCloud,
        SensorType::Imu,
        SensorType::Odom,
        SensorType::Gt,
    ];

    /// Tie-break rank among messages sharing a timestamp.
    pub const fn rank(self) -> u8 {
        match self {
            SensorType::PointCloud => 0,
            SensorType::PclPointCloud => 1,
            SensorType::Imu => 2,
            SensorType::Odom => 3,
            SensorType::Gt => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SensorType::PointCloud => "POINTCLOUD",
            SensorType::PclPointCloud => "PCL_POINTCLOUD",
            SensorType::Imu => "IMU",
            SensorType::Odom => "ODOM",
            SensorType::Gt => "GT",
        }
    }
}

impl Ord for SensorType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for SensorType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// == Messages ==
// =========================================================================

/// A shared reference to an externally owned message plus a free-form tag.
#[derive(Debug)]
pub struct Message<T> {
    pub msg: Arc<T>,
    pub tag: String,
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            msg: Arc::clone(&self.msg),
            tag: self.tag.clone(),
        }
    }
}

/// One slot in the global ordering: a reference into a per-type queue.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimestampedType {
    time: Timestamp,
    sensor_type: SensorType,
    index: usize,
}

impl TimestampedType {
    fn compare(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sensor_type.cmp(&other.sensor_type))
    }
}

// =========================================================================
// == Synchronizer ==
// =========================================================================

#[derive(Debug, Clone, Default)]
pub struct MeasurementSynchronizer {
    pending_pclds: Vec<Message<RawPointCloud>>,
    pending_pcl_pclds: Vec<Message<PointCloud>>,
    pending_imus: Vec<Message<ImuSample>>,
    pending_odoms: Vec<Message<OdometrySample>>,
    pending_gts: Vec<Message<PoseStampedSample>>,

    /// Per type, how many queue entries are already in `sensor_ordering`.
    ordered_counts: [usize; 5],
    sensor_ordering: Vec<TimestampedType>,
    pending_index: usize,
}

impl MeasurementSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Adding ---

    pub fn add_point_cloud_message(&mut self, msg: Arc<RawPointCloud>, tag: impl Into<String>) {
        self.pending_pclds.push(Message { msg, tag: tag.into() });
    }

    pub fn add_pcl_point_cloud_message(&mut self, msg: Arc<PointCloud>, tag: impl Into<String>) {
        self.pending_pcl_pclds.push(Message { msg, tag: tag.into() });
    }

    pub fn add_imu_message(&mut self, msg: Arc<ImuSample>) {
        self.pending_imus.push(Message { msg, tag: String::new() });
    }

    pub fn add_odom_message(&mut self, msg: Arc<OdometrySample>) {
        self.pending_odoms.push(Message { msg, tag: String::new() });
    }

    pub fn add_gt_message(&mut self, msg: Arc<PoseStampedSample>) {
        self.pending_gts.push(Message { msg, tag: String::new() });
    }

    // --- Whole queues ---

    pub fn point_cloud_messages(&self) -> &[Message<RawPointCloud>] {
        &self.pending_pclds
    }

    pub fn pcl_point_cloud_messages(&self) -> &[Message<PointCloud>] {
        &self.pending_pcl_pclds
    }

    pub fn imu_messages(&self) -> &[Message<ImuSample>] {
        &self.pending_imus
    }

    pub fn odom_messages(&self) -> &[Message<OdometrySample>] {
        &self.pending_odoms
    }

    pub fn gt_messages(&self) -> &[Message<PoseStampedSample>] {
        &self.pending_gts
    }

    // --- Single messages by index ---

    pub fn point_cloud_message(&self, index: usize) -> Option<&Message<RawPointCloud>> {
        self.pending_pclds.get(index)
    }

    pub fn pcl_point_cloud_message(&self, index: usize) -> Option<&Message<PointCloud>> {
        self.pending_pcl_pclds.get(index)
    }

    pub fn imu_message(&self, index: usize) -> Option<&Message<ImuSample>> {
        self.pending_imus.get(index)
    }

    pub fn odom_message(&self, index: usize) -> Option<&Message<OdometrySample>> {
        self.pending_odoms.get(index)
    }

    pub fn gt_message(&self, index: usize) -> Option<&Message<PoseStampedSample>> {
        self.pending_gts.get(index)
    }

    fn queue_len(&self, sensor_type: SensorType) -> usize {
        match sensor_type {
            SensorType::PointCloud => self.pending_pclds.len(),
            SensorType::PclPointCloud => self.pending_pcl_pclds.len(),
            SensorType::Imu => self.pending_imus.len(),
            SensorType::Odom => self.pending_odoms.len(),
            SensorType::Gt => self.pending_gts.len(),
        }
    }

    fn timestamp_of(&self, sensor_type: SensorType, index: usize) -> Timestamp {
        match sensor_type {
            SensorType::PointCloud => self.pending_pclds[index].msg.timestamp(),
            SensorType::PclPointCloud => self.pending_pcl_pclds[index].msg.timestamp(),
            SensorType::Imu => self.pending_imus[index].msg.timestamp(),
            SensorType::Odom => self.pending_odoms[index].msg.timestamp(),
            SensorType::Gt => self.pending_gts[index].msg.timestamp(),
        }
    }

    // --- Ordering and consumption ---

    /// Merges every message added since the last sort into the ordering.
    ///
    /// Already consumed entries stay where they are; only the unconsumed tail
    /// is re-sorted, so the cursor never moves backwards.
    pub fn sort_messages(&mut self) {
        for sensor_type in SensorType::ALL {
            let slot = sensor_type.rank() as usize;
            let start = self.ordered_counts[slot];
            let end = self.queue_len(sensor_type);
            for index in start..end {
                self.sensor_ordering.push(TimestampedType {
                    time: self.timestamp_of(sensor_type, index),
                    sensor_type,
                    index,
                });
            }
            self.ordered_counts[slot] = end;
        }
        // Stable: equal (time, type) keep arrival order.
        self.sensor_ordering[self.pending_index..].sort_by(TimestampedType::compare);
    }

    pub fn next_message_exists(&self) -> bool {
        self.pending_index < self.sensor_ordering.len()
    }

    /// The next `(type, index)` in global order, or `None` once exhausted.
    pub fn get_next_message(&mut self) -> Option<(SensorType, usize)> {
        let entry = self.sensor_ordering.get(self.pending_index)?;
        self.pending_index += 1;
        Some((entry.sensor_type, entry.index))
    }

    /// Number of ordered entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.sensor_ordering.len() - self.pending_index
    }

    /// Empties every queue and the ordering, and rewinds the cursor.
    pub fn clear_messages(&mut self) {
        self.pending_pclds.clear();
        self.pending_pcl_pclds.clear();
        self.pending_imus.clear();
        self.pending_odoms.clear();
        self.pending_gts.clear();
        self.ordered_counts = [0; 5];
        self.sensor_ordering.clear();
        self.pending_index = 0;
    }
}
