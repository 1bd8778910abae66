//! Renderer Settings
//!
//! Runtime configuration for the render host: culling and sorting toggles,
//! the thresholds that switch work between serial and parallel execution,
//! post-processing, background updates, frame regulation and the main target
//! format.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prism::render::RendererSettings;
//!
//! // Defaults: culling and sorting on, post effects on demand, 2-frame
//! // minimum update window, no FPS cap.
//! let settings = RendererSettings::default();
//!
//! // Throttled host without culling, loaded from JSON.
//! let settings = RendererSettings::from_json(r#"{ "enable_render_frustum": false, "max_fps": 30 }"#)?;
//! ```
//!
//! Every field has a default, so partial JSON documents are accepted.

use prism_core::{PrismError, Result};
use serde::{Deserialize, Serialize};

/// Scene size at which frustum testing switches to the parallel strategy.
pub const DEFAULT_FRUSTUM_PARALLEL_THRESHOLD: usize = 500;

/// In-frustum opaque + transparent count above which post-effect collection
/// runs in parallel.
pub const POST_EFFECT_PARALLEL_THRESHOLD: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    // === Culling & Ordering ===
    /// Test Opaque and Transparent nodes against the view frustum.
    ///
    /// When `false` every node counts as in-frustum.
    pub enable_render_frustum: bool,

    /// Sort the Opaque, PreProc, PostProc and Particle buckets by
    /// [`OrderKey`](prism_core::OrderKey) every frame.
    pub enable_render_order: bool,

    /// Node count at which frustum testing goes parallel.
    pub frustum_parallel_threshold: usize,

    /// In-frustum count at which post-effect collection goes parallel.
    pub post_effect_parallel_threshold: usize,

    // === Passes ===
    /// Always resolve to the ping-pong target and run PostProc nodes, even
    /// when no node requested a post effect.
    pub enable_post_effects: bool,

    // === Background Work ===
    /// Run `update_not_render` of async cores on a background task that
    /// overlaps submission. When `false` they run inline before drawing.
    pub enable_async_scene_update: bool,

    /// Count triangles of drawn nodes on a background task each frame.
    pub show_triangle_count: bool,

    // === Frame Regulation ===
    /// Upper bound on presented frames per second. `None` disables throttling.
    pub max_fps: Option<u32>,

    /// Frames rendered after each update request. Values below 1 behave as 1.
    pub min_update_count: u32,

    // === Targets ===
    /// Main target clear color (linear RGBA).
    pub clear_color: [f32; 4],

    /// MSAA sample count for the main target. 1 disables multisampling.
    pub msaa_samples: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            enable_render_frustum: true,
            enable_render_order: true,
            frustum_parallel_threshold: DEFAULT_FRUSTUM_PARALLEL_THRESHOLD,
            post_effect_parallel_threshold: POST_EFFECT_PARALLEL_THRESHOLD,
            enable_post_effects: false,
            enable_async_scene_update: true,
            show_triangle_count: false,
            max_fps: None,
            min_update_count: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            msaa_samples: 1,
        }
    }
}

impl RendererSettings {
    /// Parses and validates settings from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).map_err(|e| PrismError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PrismError::InvalidSettings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(PrismError::InvalidSettings(format!(
                "msaa_samples must be 1, 2, 4 or 8 (got {})",
                self.msaa_samples
            )));
        }
        if self.max_fps == Some(0) {
            return Err(PrismError::InvalidSettings("max_fps must be positive".into()));
        }
        if self.frustum_parallel_threshold == 0 {
            return Err(PrismError::InvalidSettings(
                "frustum_parallel_threshold must be positive".into(),
            ));
        }
        Ok(())
    }

    /// `min_update_count` with the lower bound applied.
    #[must_use]
    pub fn effective_min_update_count(&self) -> u32 {
        self.min_update_count.max(1)
    }
}
