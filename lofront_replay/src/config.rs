// lofront_replay/src/config.rs

//! Loading the frontend configuration from disk and the environment.

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use lofront_core::config::FrontendConfig;
use log::info;
use std::path::Path;

pub const ENV_PREFIX: &str = "LOFRONT_";

/// Layers, lowest precedence first: built-in defaults, the TOML file (if
/// any), then `LOFRONT_*` environment variables.
pub fn frontend_figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extracts and validates a [`FrontendConfig`].
pub fn load_frontend_config(path: Option<&Path>) -> Result<FrontendConfig> {
    // Figment treats a missing file as empty; a typo in the path should not
    // silently fall back to defaults.
    if let Some(path) = path {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
        info!("Loading frontend config from: {}", path.display());
    }

    let config: FrontendConfig = frontend_figment(path)
        .extract()
        .context("failed to parse frontend configuration")?;
    config
        .validate()
        .context("frontend configuration rejected")?;
    Ok(config)
}
