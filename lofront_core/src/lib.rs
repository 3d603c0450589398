// lofront_core/src/lib.rs

//! LiDAR odometry frontend: scan-to-scan registration seeded by whichever
//! auxiliary sensor is currently healthy, plus the keyframe and local-map
//! bookkeeping that rides on its output.

pub mod buffer;
pub mod config;
pub mod error;
pub mod estimation;
pub mod frontend;
pub mod mapping;
pub mod messages;
pub mod prelude;
pub mod registration;
pub mod synchronizer;
pub mod types;
