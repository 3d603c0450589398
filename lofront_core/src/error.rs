// lofront_core/src/error.rs

use thiserror::Error;

/// Invalid values in a [`crate::config::FrontendConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("`{field}` must be at least 1")]
    ZeroSize { field: &'static str },
    #[error("`{field}` must be finite and positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Failures that prevent a [`crate::frontend::Frontend`] from starting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrontendError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Inertial integration needs the imu -> base extrinsic and nothing else
    /// is enabled to fall back on.
    #[error("no calibration transform from `{from}` to `{to}` and no fallback modality enabled")]
    MissingCalibration { from: String, to: String },
}

/// Soft, per-cycle registration failures. None of them poison the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("query scan has no points")]
    EmptyQuery,
    #[error("reference scan has no points")]
    EmptyReference,
    #[error("only {found} correspondences within range, need {required}")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("degenerate correspondence geometry")]
    Degenerate,
}

/// Errors decoding a [`crate::messages::RawPointCloud`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("point_step {point_step} is smaller than the {required} bytes each record needs")]
    PointStepTooSmall { point_step: usize, required: usize },
    #[error("buffer of {len} bytes is not a multiple of point_step {point_step}")]
    TruncatedBuffer { len: usize, point_step: usize },
}
