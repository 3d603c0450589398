// lofront_core/src/estimation/integration.rs

//! Hierarchical data integration: which auxiliary modality seeds registration.
//!
//! Priority is fixed: inertial > wheel odometry > external pose > none. Each
//! cycle the highest-priority modality that has been received and has a valid
//! sample for the scan wins. A winner only yields a prior once it has been
//! selected for more than `max_number_of_calls` consecutive cycles.

use crate::config::IntegrationConfig;
use crate::estimation::attitude::attitude_delta;
use crate::messages::{pose_is_finite, ImuSample};
use crate::types::{Pose3, TfProvider};
use log::{debug, info, warn};
use nalgebra::{Translation3, UnitQuaternion};

// --- Modalities ---

/// The auxiliary sensors that compete to provide the registration prior.
/// Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modality {
    Inertial,
    Odometry,
    ExternalPose,
}

impl Modality {
    pub const BY_PRIORITY: [Modality; 3] =
        [Modality::Inertial, Modality::Odometry, Modality::ExternalPose];
}

/// The outcome state of one selection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMode {
    #[default]
    None,
    Inertial,
    Odometry,
    ExternalPose,
}

impl From<Modality> for IntegrationMode {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Inertial => IntegrationMode::Inertial,
            Modality::Odometry => IntegrationMode::Odometry,
            Modality::ExternalPose => IntegrationMode::ExternalPose,
        }
    }
}

// --- Health ---

/// Per-modality bookkeeping, owned by the [`IntegrationContext`].
#[derive(Debug, Clone)]
pub struct ModalityHealth<S> {
    pub has_been_received: bool,
    /// Consecutive cycles this modality has been the active selection.
    pub consecutive_calls: u32,
    /// The sample used on the previous cycle, if this modality was selected
    /// then. Cleared on deselection so a delta never spans a gap.
    pub last_known_good: Option<S>,
}

impl<S> Default for ModalityHealth<S> {
    fn default() -> Self {
        Self {
            has_been_received: false,
            consecutive_calls: 0,
            last_known_good: None,
        }
    }
}

impl<S> ModalityHealth<S> {
    fn deselect(&mut self) {
        self.consecutive_calls = 0;
        self.last_known_good = None;
    }
}

/// Outcome of the one-time inertial frame check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameCheck {
    #[default]
    Unchecked,
    Confirmed,
    /// The inertial stream is not in the configured frame; it stays disabled.
    Mismatch,
}

/// Everything the selector reads and writes, held explicitly instead of as
/// process-wide flags.
#[derive(Debug, Clone, Default)]
pub struct IntegrationContext {
    pub imu: ModalityHealth<UnitQuaternion<f64>>,
    pub odometry: ModalityHealth<Pose3>,
    pub pose_stamped: ModalityHealth<Pose3>,
    pub imu_frame: FrameCheck,
}

impl IntegrationContext {
    pub fn has_been_received(&self, modality: Modality) -> bool {
        match modality {
            Modality::Inertial => self.imu.has_been_received,
            Modality::Odometry => self.odometry.has_been_received,
            Modality::ExternalPose => self.pose_stamped.has_been_received,
        }
    }

    pub fn set_received(&mut self, modality: Modality, received: bool) {
        match modality {
            Modality::Inertial => self.imu.has_been_received = received,
            Modality::Odometry => self.odometry.has_been_received = received,
            Modality::ExternalPose => self.pose_stamped.has_been_received = received,
        }
    }

    pub fn consecutive_calls(&self, modality: Modality) -> u32 {
        match modality {
            Modality::Inertial => self.imu.consecutive_calls,
            Modality::Odometry => self.odometry.consecutive_calls,
            Modality::ExternalPose => self.pose_stamped.consecutive_calls,
        }
    }
}

// --- Per-cycle input and output ---

/// The validated sample of each modality for the scan being processed.
/// `None` means missing or rejected this cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSamples {
    pub imu: Option<UnitQuaternion<f64>>,
    pub odometry: Option<Pose3>,
    pub pose_stamped: Option<Pose3>,
}

impl CycleSamples {
    fn has(&self, modality: Modality) -> bool {
        match modality {
            Modality::Inertial => self.imu.is_some(),
            Modality::Odometry => self.odometry.is_some(),
            Modality::ExternalPose => self.pose_stamped.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub mode: IntegrationMode,
    /// The initial guess for registration. `None` while the selected modality
    /// is still warming up, or when nothing was selected.
    pub prior: Option<Pose3>,
}

// =========================================================================
// == Selector ==
// =========================================================================

#[derive(Debug, Clone)]
pub struct DataIntegrationSelector {
    config: IntegrationConfig,
    /// imu -> base rotation, resolved once at startup.
    imu_to_base: Option<UnitQuaternion<f64>>,
    /// Set once inertial integration can never succeed in this run.
    imu_disabled: bool,
}

impl DataIntegrationSelector {
    /// Resolves the inertial calibration through `tf`.
    ///
    /// If conversion to the base frame is required and the lookup fails, the
    /// inertial modality is disabled for the run; the caller decides whether
    /// that is fatal via [`DataIntegrationSelector::imu_disabled`].
    pub fn new(config: IntegrationConfig, tf: Option<&dyn TfProvider>) -> Self {
        let mut imu_to_base = None;
        let mut imu_disabled = false;
        if config.use_imu_integration && config.convert_imu_to_base_frame {
            imu_to_base = tf
                .and_then(|tf| tf.get_transform(&config.imu_frame_id, &config.base_frame_id))
                .map(|pose| pose.rotation);
            match imu_to_base {
                Some(rotation) => info!(
                    "Resolved {} -> {} calibration ({:.4} rad)",
                    config.imu_frame_id,
                    config.base_frame_id,
                    rotation.angle()
                ),
                None => {
                    warn!(
                        "No calibration from {} to {}; inertial integration disabled",
                        config.imu_frame_id, config.base_frame_id
                    );
                    imu_disabled = true;
                }
            }
        }
        Self {
            config,
            imu_to_base,
            imu_disabled,
        }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn imu_disabled(&self) -> bool {
        self.imu_disabled
    }

    fn enabled(&self, modality: Modality) -> bool {
        match modality {
            Modality::Inertial => self.config.use_imu_integration && !self.imu_disabled,
            Modality::Odometry => self.config.use_odometry_integration,
            Modality::ExternalPose => self.config.use_pose_stamped_integration,
        }
    }

    /// Decides the inertial frame check from the frame of the first inertial
    /// sample received.
    ///
    /// Later calls are no-ops; a mismatch disables inertial integration.
    pub fn check_imu_frame(&mut self, ctx: &mut IntegrationContext, frame_id: &str) {
        if ctx.imu_frame != FrameCheck::Unchecked {
            return;
        }
        if !self.config.convert_imu_to_base_frame || frame_id == self.config.imu_frame_id {
            ctx.imu_frame = FrameCheck::Confirmed;
            return;
        }
        warn!(
            "Inertial samples arrive in frame `{}`, expected `{}`; inertial integration disabled",
            frame_id, self.config.imu_frame_id
        );
        ctx.imu_frame = FrameCheck::Mismatch;
        self.imu_disabled = true;
    }

    /// Validates an inertial sample for this cycle, returning its attitude in
    /// the base frame.
    pub fn validate_imu(
        &self,
        ctx: &IntegrationContext,
        sample: &ImuSample,
    ) -> Option<UnitQuaternion<f64>> {
        if self.imu_disabled || ctx.imu_frame != FrameCheck::Confirmed {
            return None;
        }
        let Some(attitude) = sample.attitude() else {
            warn!("Rejecting non-finite inertial sample at {:.6}", sample.timestamp);
            return None;
        };
        match (self.config.convert_imu_to_base_frame, self.imu_to_base) {
            (true, Some(q_cal)) => Some(q_cal * attitude * q_cal.inverse()),
            (true, None) => None,
            (false, _) => Some(attitude),
        }
    }

    /// Validates an odometry or external-pose sample.
    pub fn validate_pose(&self, pose: &Pose3) -> Option<Pose3> {
        if pose_is_finite(pose) {
            Some(*pose)
        } else {
            warn!("Rejecting non-finite pose sample");
            None
        }
    }

    /// Runs one selection cycle.
    pub fn select(&self, ctx: &mut IntegrationContext, samples: &CycleSamples) -> Selection {
        let chosen = Modality::BY_PRIORITY.into_iter().find(|&m| {
            self.enabled(m) && ctx.has_been_received(m) && samples.has(m)
        });

        for modality in Modality::BY_PRIORITY {
            if Some(modality) != chosen {
                match modality {
                    Modality::Inertial => ctx.imu.deselect(),
                    Modality::Odometry => ctx.odometry.deselect(),
                    Modality::ExternalPose => ctx.pose_stamped.deselect(),
                }
            }
        }

        let warm_up = self.config.max_number_of_calls;
        let yaw_only = self.config.use_imu_yaw_only;
        let prior = match chosen {
            None => None,
            Some(Modality::Inertial) => samples.imu.and_then(|current| {
                advance(&mut ctx.imu, current, warm_up, |prev, curr| {
                    let rotation = attitude_delta(prev, curr, yaw_only);
                    Pose3::from_parts(Translation3::identity(), rotation.into())
                })
            }),
            Some(Modality::Odometry) => samples.odometry.and_then(|current| {
                advance(&mut ctx.odometry, current, warm_up, |prev, curr| {
                    prev.inverse() * curr
                })
            }),
            Some(Modality::ExternalPose) => samples.pose_stamped.and_then(|current| {
                advance(&mut ctx.pose_stamped, current, warm_up, |prev, curr| {
                    prev.inverse() * curr
                })
            }),
        };

        let mode = chosen.map(IntegrationMode::from).unwrap_or_default();
        debug!(
            "Data integration: {:?} (prior {})",
            mode,
            if prior.is_some() { "applied" } else { "none" }
        );
        Selection { mode, prior }
    }
}

/// Counts one more consecutive call and, past warm-up, differences against the
/// last known good sample. The current sample always becomes the new reference.
fn advance<S: Copy>(
    health: &mut ModalityHealth<S>,
    current: S,
    warm_up: u32,
    delta: impl Fn(&S, &S) -> Pose3,
) -> Option<Pose3> {
    health.consecutive_calls = health.consecutive_calls.saturating_add(1);
    let prior = match &health.last_known_good {
        Some(previous) if health.consecutive_calls > warm_up => Some(delta(previous, &current)),
        _ => None,
    };
    health.last_known_good = Some(current);
    prior
}
