// lofront_core/src/registration/mod.rs

use crate::error::RegistrationError;
use crate::messages::PointCloud;
use crate::types::Pose3;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// --- Alignment Result ---
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Maps query points into the reference frame.
    pub transform: Pose3,
    /// Mean squared distance between corresponding points after alignment.
    pub fitness_score: f64,
    pub iterations: u32,
    /// False if the iteration cap was hit before the update fell below epsilon.
    pub converged: bool,
}

// --- The Registration Trait ("Contract") ---
/// The contract for any algorithm that aligns a query scan to a reference.
pub trait ScanRegistration: Debug + Send + Sync {
    /// Aligns `query` onto `reference`, seeded with `initial_guess`.
    fn align(
        &self,
        query: &PointCloud,
        reference: &PointCloud,
        initial_guess: &Pose3,
    ) -> Result<Alignment, RegistrationError>;
}

// --- Flat Ground Assumption ---
/// Process-wide "flat ground" switch.
///
/// Cloned handles share one flag: the transport side stores, the registration
/// engine loads once per cycle.
#[derive(Debug, Clone, Default)]
pub struct FlatGroundFlag(Arc<AtomicBool>);

impl FlatGroundFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

mod icp;
mod odometry;

pub use icp::{IcpConfig, PointToPointIcp};
pub use odometry::{PointCloudOdometry, RegistrationStatus};
