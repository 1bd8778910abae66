use glam::Vec2;
use prism_core::Result;
use prism_core::math::Rect;
use prism_resources::{AttachContext, DeviceContext};

/// Drawable part of a 2D node.
///
/// `render` draws in local coordinates: the host has already set the node's
/// layout offset as the 2D transform, so `(0, 0)` is the top-left corner of
/// the arranged bound.
pub trait RenderCore2D: Send + Sync {
    fn attach(&mut self, _ctx: &AttachContext) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) {}

    /// Content size for the given available size (margin already removed).
    fn measure_override(&mut self, _available: Vec2) -> Vec2 {
        Vec2::ZERO
    }

    fn render(&self, dc: &mut dyn DeviceContext, size: Vec2) -> Result<()>;
}

/// Solid rectangle with an intrinsic size.
pub struct RectangleCore2D {
    pub fill: [f32; 4],
    pub size: Vec2,
}

impl RectangleCore2D {
    #[must_use]
    pub fn new(size: Vec2, fill: [f32; 4]) -> Self {
        Self { fill, size }
    }
}

impl RenderCore2D for RectangleCore2D {
    fn measure_override(&mut self, _available: Vec2) -> Vec2 {
        self.size
    }

    fn render(&self, dc: &mut dyn DeviceContext, size: Vec2) -> Result<()> {
        dc.fill_rect(Rect::from_origin_size(Vec2::ZERO, size), self.fill);
        Ok(())
    }
}
