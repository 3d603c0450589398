// lofront_core/src/frontend.rs

//! The per-scan pipeline: buffered auxiliary samples -> modality selection ->
//! scan-to-scan registration -> keyframe / map-window decision -> output.
//!
//! Auxiliary sensors are written through a [`SensorInbox`], which may live on
//! other threads. A cycle runs only through `&mut Frontend`, so at most one
//! cycle executes at a time.

use crate::buffer::{Interpolate, SharedBuffer};
use crate::config::{BufferConfig, FrontendConfig};
use crate::error::FrontendError;
use crate::estimation::{
    CycleSamples, DataIntegrationSelector, IntegrationContext, IntegrationMode, Modality,
};
use crate::mapping::MapPolicy;
use crate::messages::{
    pose_is_finite, ImuSample, OdometrySample, PointCloud, PoseStampedSample, RawPointCloud,
    Stamped,
};
use crate::registration::{
    FlatGroundFlag, PointCloudOdometry, RegistrationStatus, ScanRegistration,
};
use crate::types::{Pose3, TfProvider, Timestamp};
use log::{debug, info, warn};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

// =========================================================================
// == Inbox ==
// =========================================================================

/// The write side of the frontend, handed to sensor callbacks.
///
/// Clones share the same buffers. Samples with non-finite fields are dropped
/// here so that a buffered sample is always a valid one.
#[derive(Debug, Clone)]
pub struct SensorInbox {
    imu: SharedBuffer<ImuSample>,
    odometry: SharedBuffer<OdometrySample>,
    pose_stamped: SharedBuffer<PoseStampedSample>,
    flat_ground: FlatGroundFlag,
    /// Frame of the first accepted inertial sample, kept past eviction.
    first_imu_frame: Arc<OnceLock<String>>,
}

impl SensorInbox {
    fn new(limits: &BufferConfig) -> Self {
        Self {
            imu: SharedBuffer::new(limits.imu_size_limit),
            odometry: SharedBuffer::new(limits.odometry_size_limit),
            pose_stamped: SharedBuffer::new(limits.pose_stamped_size_limit),
            flat_ground: FlatGroundFlag::default(),
            first_imu_frame: Arc::default(),
        }
    }

    pub fn push_imu(&self, sample: ImuSample) {
        if !sample.is_finite() {
            warn!("Dropping non-finite inertial sample at {:.6}", sample.timestamp);
            return;
        }
        if self.first_imu_frame.get().is_none() {
            let _ = self.first_imu_frame.set(sample.frame_id.clone());
        }
        if !self.imu.insert(sample) {
            debug!("Inertial buffer full, evicted oldest sample");
        }
    }

    pub fn push_odometry(&self, sample: OdometrySample) {
        if !pose_is_finite(&sample.pose) {
            warn!("Dropping non-finite odometry sample at {:.6}", sample.timestamp);
            return;
        }
        if !self.odometry.insert(sample) {
            debug!("Odometry buffer full, evicted oldest sample");
        }
    }

    pub fn push_pose_stamped(&self, sample: PoseStampedSample) {
        if !pose_is_finite(&sample.pose) {
            warn!("Dropping non-finite pose sample at {:.6}", sample.timestamp);
            return;
        }
        if !self.pose_stamped.insert(sample) {
            debug!("Pose buffer full, evicted oldest sample");
        }
    }

    pub fn set_flat_ground(&self, enabled: bool) {
        if enabled != self.flat_ground.get() {
            info!("Flat ground assumption {}", if enabled { "enabled" } else { "disabled" });
        }
        self.flat_ground.set(enabled);
    }

    pub fn imu(&self) -> &SharedBuffer<ImuSample> {
        &self.imu
    }

    pub fn odometry(&self) -> &SharedBuffer<OdometrySample> {
        &self.odometry
    }

    pub fn pose_stamped(&self) -> &SharedBuffer<PoseStampedSample> {
        &self.pose_stamped
    }

    /// The frame of the first inertial sample this inbox accepted.
    pub fn first_imu_frame(&self) -> Option<&str> {
        self.first_imu_frame.get().map(String::as_str)
    }
}

// =========================================================================
// == Outputs ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    /// Time spent inside registration.
    pub scan_to_scan: Duration,
    /// The whole cycle, lookup to map decision.
    pub total: Duration,
}

/// Everything one completed cycle produces.
#[derive(Debug, Clone)]
pub struct FrontendOutput {
    pub timestamp: Timestamp,
    pub incremental: Pose3,
    pub integrated: Pose3,
    /// The scan mapped into the previous scan's frame.
    pub aligned: PointCloud,
    pub keyframe: bool,
    pub refresh_map: bool,
    pub integration_mode: IntegrationMode,
    /// Whether the selected modality actually seeded registration.
    pub prior_applied: bool,
    pub status: RegistrationStatus,
    pub fitness_score: f64,
    /// Present when `enable_computation_time_profiling` is set.
    pub timing: Option<CycleTiming>,
}

// =========================================================================
// == Frontend ==
// =========================================================================

#[derive(Debug)]
pub struct Frontend {
    config: FrontendConfig,
    inbox: SensorInbox,
    context: IntegrationContext,
    selector: DataIntegrationSelector,
    odometry: PointCloudOdometry,
    map_policy: MapPolicy,
}

impl Frontend {
    /// Builds a frontend registering with point-to-point ICP.
    pub fn new(
        config: FrontendConfig,
        tf: Option<&dyn TfProvider>,
    ) -> Result<Self, FrontendError> {
        let inbox = SensorInbox::new(&config.buffers);
        let odometry =
            PointCloudOdometry::new(config.registration.clone(), inbox.flat_ground.clone());
        Self::assemble(config, tf, inbox, odometry)
    }

    /// Builds a frontend around a caller-supplied registration algorithm.
    pub fn with_registration(
        config: FrontendConfig,
        tf: Option<&dyn TfProvider>,
        registration: Box<dyn ScanRegistration>,
    ) -> Result<Self, FrontendError> {
        let inbox = SensorInbox::new(&config.buffers);
        let odometry = PointCloudOdometry::with_registration(
            config.registration.clone(),
            registration,
            inbox.flat_ground.clone(),
        );
        Self::assemble(config, tf, inbox, odometry)
    }

    fn assemble(
        config: FrontendConfig,
        tf: Option<&dyn TfProvider>,
        inbox: SensorInbox,
        odometry: PointCloudOdometry,
    ) -> Result<Self, FrontendError> {
        config.validate()?;

        let integration = &config.integration;
        let selector = DataIntegrationSelector::new(integration.clone(), tf);
        if selector.imu_disabled()
            && !integration.use_odometry_integration
            && !integration.use_pose_stamped_integration
        {
            return Err(FrontendError::MissingCalibration {
                from: integration.imu_frame_id.clone(),
                to: integration.base_frame_id.clone(),
            });
        }

        info!(
            "Frontend ready (imu: {}, odometry: {}, pose: {}, warm-up: {})",
            integration.use_imu_integration && !selector.imu_disabled(),
            integration.use_odometry_integration,
            integration.use_pose_stamped_integration,
            integration.max_number_of_calls
        );

        let map_policy = MapPolicy::new(config.keyframe.clone(), config.map_window.clone());
        Ok(Self {
            config,
            inbox,
            context: IntegrationContext::default(),
            selector,
            odometry,
            map_policy,
        })
    }

    // --- Inputs ---

    /// A handle for feeding auxiliary sensors from other threads.
    pub fn inbox(&self) -> SensorInbox {
        self.inbox.clone()
    }

    pub fn on_imu(&self, sample: ImuSample) {
        self.inbox.push_imu(sample);
    }

    pub fn on_odometry(&self, sample: OdometrySample) {
        self.inbox.push_odometry(sample);
    }

    pub fn on_pose_stamped(&self, sample: PoseStampedSample) {
        self.inbox.push_pose_stamped(sample);
    }

    pub fn set_flat_ground(&self, enabled: bool) {
        self.inbox.set_flat_ground(enabled);
    }

    pub fn flat_ground(&self) -> bool {
        self.inbox.flat_ground.get()
    }

    /// Decodes a packed scan and runs a cycle on it.
    pub fn on_raw_scan(&mut self, scan: &RawPointCloud) -> Option<FrontendOutput> {
        match scan.to_point_cloud() {
            Ok(cloud) => self.on_scan(cloud),
            Err(err) => {
                warn!("Dropping undecodable scan at {:.6}: {}", scan.timestamp, err);
                None
            }
        }
    }

    /// Runs one full pipeline cycle. `None` means the cycle was abandoned and
    /// nothing was committed beyond the registration reference.
    pub fn on_scan(&mut self, scan: PointCloud) -> Option<FrontendOutput> {
        let cycle_start = Instant::now();
        let stamp = scan.timestamp;
        if scan.is_empty() {
            warn!("Dropping empty scan at {:.6}", stamp);
            return None;
        }

        self.refresh_reception();
        let samples = self.gather_samples(stamp);
        let selection = self.selector.select(&mut self.context, &samples);
        let prior_applied = selection.prior.is_some();

        self.odometry.set_prior(selection.prior);
        self.odometry.set_lidar(scan);
        let registration_start = Instant::now();
        let status = match self.odometry.update_estimate() {
            Ok(status) => status,
            Err(err) => {
                warn!("Scan at {:.6} not registered: {}", stamp, err);
                return None;
            }
        };
        let scan_to_scan = registration_start.elapsed();

        let integrated = *self.odometry.integrated_estimate();
        let decision = self.map_policy.update(&integrated, stamp);
        if decision.keyframe {
            debug!("Keyframe at {:.6}", stamp);
        }
        if decision.refresh_map {
            debug!("Local map refresh at {:.6}", stamp);
        }

        let timing = self
            .config
            .enable_computation_time_profiling
            .then(|| CycleTiming {
                scan_to_scan,
                total: cycle_start.elapsed(),
            });

        Some(FrontendOutput {
            timestamp: stamp,
            incremental: *self.odometry.incremental_estimate(),
            integrated,
            aligned: self.odometry.aligned_points().clone(),
            keyframe: decision.keyframe,
            refresh_map: decision.refresh_map,
            integration_mode: selection.mode,
            prior_applied,
            status,
            fitness_score: self.odometry.fitness_score(),
            timing,
        })
    }

    // --- Cycle internals ---

    /// Flips `has_been_received` for every modality that has delivered a
    /// sample and runs the inertial frame check on the first one received.
    fn refresh_reception(&mut self) {
        if !self.context.imu.has_been_received {
            if let Some(frame_id) = self.inbox.first_imu_frame() {
                self.selector.check_imu_frame(&mut self.context, frame_id);
                self.context.set_received(Modality::Inertial, true);
            }
        }
        if !self.context.odometry.has_been_received && !self.inbox.odometry.lock().is_empty() {
            self.context.set_received(Modality::Odometry, true);
        }
        if !self.context.pose_stamped.has_been_received
            && !self.inbox.pose_stamped.lock().is_empty()
        {
            self.context.set_received(Modality::ExternalPose, true);
        }
    }

    fn gather_samples(&self, stamp: Timestamp) -> CycleSamples {
        let integration = &self.config.integration;
        let max_offset = integration.max_time_offset;

        let imu = if integration.use_imu_integration {
            let buffer = self.inbox.imu.lock();
            buffer
                .query_nearest(stamp)
                .filter(|s| within_offset(s.timestamp, stamp, max_offset))
                .and_then(|s| self.selector.validate_imu(&self.context, s))
        } else {
            None
        };

        let odometry = if integration.use_odometry_integration {
            lookup(&self.inbox.odometry, stamp, integration.interpolate, max_offset)
                .and_then(|s| self.selector.validate_pose(&s.pose))
        } else {
            None
        };

        let pose_stamped = if integration.use_pose_stamped_integration {
            lookup(&self.inbox.pose_stamped, stamp, integration.interpolate, max_offset)
                .and_then(|s| self.selector.validate_pose(&s.pose))
        } else {
            None
        };

        CycleSamples {
            imu,
            odometry,
            pose_stamped,
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn context(&self) -> &IntegrationContext {
        &self.context
    }

    pub fn integrated_estimate(&self) -> &Pose3 {
        self.odometry.integrated_estimate()
    }

    pub fn map_policy(&self) -> &MapPolicy {
        &self.map_policy
    }
}

fn within_offset(sample: Timestamp, stamp: Timestamp, max_offset: Option<f64>) -> bool {
    max_offset.map_or(true, |max| (sample - stamp).abs() <= max)
}

/// Nearest (or bracketing-interpolated) sample, provided the nearest one is
/// fresh enough.
fn lookup<T: Stamped + Interpolate + Clone>(
    buffer: &SharedBuffer<T>,
    stamp: Timestamp,
    interpolate: bool,
    max_offset: Option<f64>,
) -> Option<T> {
    let buffer = buffer.lock();
    let nearest = buffer.query_nearest(stamp)?;
    if !within_offset(nearest.timestamp(), stamp, max_offset) {
        return None;
    }
    if interpolate {
        buffer.query_interpolated(stamp)
    } else {
        Some(nearest.clone())
    }
}
