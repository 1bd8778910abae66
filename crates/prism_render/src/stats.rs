use std::time::Duration;

use crate::frustum::FrustumStrategy;
use crate::renderables::SeparationStats;

/// What one call to [`Renderer::render`](crate::Renderer::render) submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Nodes whose `render` returned successfully.
    pub drawn: usize,
    /// Nodes skipped after a non-device error.
    pub failed: usize,
    pub gpu_updates: usize,
    pub post_effect_nodes: usize,
    pub post_effects_ran: bool,
}

/// Host-level telemetry, refreshed every rendered frame.
#[derive(Debug, Clone, Default)]
pub struct RenderStatistics {
    pub frames_rendered: u64,
    pub device_losses: u64,
    pub last_frame_time: Duration,

    pub flattened: usize,
    pub renderable: usize,
    pub skipped: usize,
    pub faulted: usize,
    pub opaque: usize,
    pub opaque_in_frustum: usize,
    pub transparent: usize,
    pub transparent_in_frustum: usize,
    pub frustum_strategy: FrustumStrategy,

    pub passes: PassStats,
    pub async_updates: usize,
    /// Triangles in drawn nodes, when counting is enabled.
    pub triangle_count: Option<u64>,
}

impl RenderStatistics {
    pub(crate) fn record_separation(&mut self, separation: &SeparationStats) {
        self.flattened = separation.flattened;
        self.renderable = separation.renderable;
        self.skipped = separation.skipped;
        self.faulted = separation.faulted;
        self.frustum_strategy = separation.strategy;
    }
}
