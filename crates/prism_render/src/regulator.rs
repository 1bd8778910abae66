//! Frame regulation.
//!
//! The host renders only while frames are pending. Every update request tops
//! the pending count up to `min_update_count`, so one invalidation produces a
//! short burst of frames (letting double-buffered targets and async updates
//! settle) and an idle scene produces none. An optional FPS cap spaces the
//! frames out.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FrameRegulator {
    pending_frames: u32,
    min_update_count: u32,
    min_interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl FrameRegulator {
    #[must_use]
    pub fn new(min_update_count: u32, max_fps: Option<u32>) -> Self {
        let mut regulator = Self {
            pending_frames: 0,
            min_update_count: min_update_count.max(1),
            min_interval: None,
            last_frame: None,
        };
        regulator.set_max_fps(max_fps);
        regulator
    }

    pub fn set_min_update_count(&mut self, count: u32) {
        self.min_update_count = count.max(1);
    }

    pub fn set_max_fps(&mut self, max_fps: Option<u32>) {
        self.min_interval = max_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
    }

    #[must_use]
    pub fn pending_frames(&self) -> u32 {
        self.pending_frames
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_frames > 0
    }

    pub fn request_update(&mut self) {
        self.pending_frames = self.pending_frames.max(self.min_update_count);
    }

    /// Whether a frame should be rendered at `now`.
    #[must_use]
    pub fn should_render(&self, now: Instant) -> bool {
        if self.pending_frames == 0 {
            return false;
        }
        match (self.min_interval, self.last_frame) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    pub fn frame_rendered(&mut self, now: Instant) {
        self.pending_frames = self.pending_frames.saturating_sub(1);
        self.last_frame = Some(now);
    }

    /// Drops pending frames, e.g. when the host stops.
    pub fn reset(&mut self) {
        self.pending_frames = 0;
        self.last_frame = None;
    }
}
