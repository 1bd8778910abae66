use glam::{Mat4, Quat, Vec2, Vec3};
use prism_core::Result;
use prism_core::math::BoundingBox;
use prism_resources::{AttachContext, DeviceContext};

use crate::context::RenderContext;
use crate::core::RenderCore;
use crate::cores::mesh::MeshCore;

/// Mesh pinned to a corner of the viewport (view cube, axis gizmo).
///
/// The mesh follows the camera's rotation but ignores its translation and the
/// frustum; it is drawn after post effects.
pub struct ScreenSpacedCore {
    inner: MeshCore,
    /// Normalized device position of the gizmo centre.
    anchor: Vec2,
    /// Fraction of the viewport height the gizmo occupies.
    scale: f32,
}

impl ScreenSpacedCore {
    #[must_use]
    pub fn new(inner: MeshCore, anchor: Vec2, scale: f32) -> Self {
        Self { inner, anchor, scale }
    }

    #[must_use]
    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    fn screen_matrix(&self, ctx: &RenderContext) -> Mat4 {
        let rotation = Quat::from_mat4(&ctx.view).normalize();
        let aspect = if ctx.actual_height > 0.0 {
            ctx.actual_width / ctx.actual_height
        } else {
            1.0
        };
        Mat4::from_scale_rotation_translation(
            Vec3::new(self.scale / aspect, self.scale, self.scale * 0.1),
            rotation,
            self.anchor.extend(0.5),
        )
    }
}

impl RenderCore for ScreenSpacedCore {
    fn attach(&mut self, ctx: &AttachContext) -> Result<()> {
        self.inner.attach(ctx)
    }

    fn detach(&mut self) {
        self.inner.detach();
    }

    /// Unbounded; never culled.
    fn local_bounds(&self) -> Option<BoundingBox> {
        None
    }

    fn on_update(&mut self, ctx: &RenderContext, _world: &Mat4) -> Result<()> {
        let matrix = self.screen_matrix(ctx);
        self.inner.on_update(ctx, &matrix)
    }

    fn needs_gpu_update(&self) -> bool {
        self.inner.needs_gpu_update()
    }

    fn update_gpu(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        self.inner.update_gpu(ctx, dc)
    }

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        self.inner.render(ctx, dc)
    }

    fn triangle_count(&self) -> u64 {
        self.inner.triangle_count()
    }
}
