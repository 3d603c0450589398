// lofront_core/src/estimation/mod.rs

//! Auxiliary-sensor estimation: turning inertial, odometry and external-pose
//! samples into a registration prior.

pub mod attitude;
pub mod integration;

pub use attitude::{attitude_delta, yaw_twist};
pub use integration::{
    CycleSamples, DataIntegrationSelector, FrameCheck, IntegrationContext, IntegrationMode,
    Modality, ModalityHealth, Selection,
};
