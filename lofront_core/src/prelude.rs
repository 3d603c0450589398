// lofront_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::buffer::Interpolate;
pub use crate::messages::Stamped;
pub use crate::registration::ScanRegistration;
pub use crate::types::{Pose3, StaticTf, TfProvider, Timestamp};

// --- Sensor Data ---
pub use crate::messages::{
    ImuSample, OdometrySample, Point, PointCloud, PoseStampedSample, RawPointCloud,
};

// --- Configuration & Errors ---
pub use crate::config::FrontendConfig;
pub use crate::error::{FrontendError, RegistrationError};

// --- Pipeline ---
pub use crate::estimation::IntegrationMode;
pub use crate::frontend::{CycleTiming, Frontend, FrontendOutput, SensorInbox};
pub use crate::registration::{FlatGroundFlag, PointToPointIcp, RegistrationStatus};
pub use crate::synchronizer::{MeasurementSynchronizer, Message, SensorType};
