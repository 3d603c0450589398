// lofront_core/src/mapping/mod.rs

//! Map bookkeeping decisions: keyframes and local-map-window refreshes.
//!
//! The map itself is built downstream; this module only decides *when*.

use crate::config::{KeyframeConfig, MapWindowConfig};
use crate::types::{Pose3, Timestamp};

// --- Declare the implementation sub-modules ---
mod keyframe;
mod map_window;

// --- Re-export the public structs for a clean API ---
pub use keyframe::KeyframePolicy;
pub use map_window::MapRefreshPolicy;

/// This cycle's map bookkeeping outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapDecision {
    pub keyframe: bool,
    pub refresh_map: bool,
}

/// Runs both tests on every cycle's integrated pose.
///
/// With the velocity-gated window disabled, the local map is refreshed on
/// every keyframe instead.
#[derive(Debug, Clone)]
pub struct MapPolicy {
    keyframes: KeyframePolicy,
    window: Option<MapRefreshPolicy>,
}

impl MapPolicy {
    pub fn new(keyframe: KeyframeConfig, map_window: MapWindowConfig) -> Self {
        let window = map_window
            .enabled
            .then(|| MapRefreshPolicy::new(map_window));
        Self {
            keyframes: KeyframePolicy::new(keyframe),
            window,
        }
    }

    pub fn update(&mut self, pose: &Pose3, stamp: Timestamp) -> MapDecision {
        let keyframe = self.keyframes.check(pose);
        let refresh_map = match self.window.as_mut() {
            Some(window) => window.update(pose, stamp),
            None => keyframe,
        };
        MapDecision {
            keyframe,
            refresh_map,
        }
    }

    pub fn keyframes(&self) -> &KeyframePolicy {
        &self.keyframes
    }

    pub fn window(&self) -> Option<&MapRefreshPolicy> {
        self.window.as_ref()
    }
}
