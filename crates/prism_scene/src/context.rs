//! Per-frame render context.
//!
//! Rebuilt by the host at the start of every frame from the viewport (camera,
//! world matrix, size, DPI) and the frame clock, then read by every render
//! core during classification and submission.

use glam::{Mat4, Vec3, Vec4};
use prism_core::math::Frustum;
use prism_resources::{GlobalConstants, LightData, MAX_LIGHTS, RenderStage};

use crate::camera::CameraCore;
use crate::scene::NodeHandle;

#[derive(Debug, Clone)]
pub struct RenderContext {
    pub camera: CameraCore,
    pub world_matrix: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub frustum: Frustum,
    /// Camera position in scene space (world matrix removed).
    pub eye: Vec3,

    pub actual_width: f32,
    pub actual_height: f32,
    pub dpi_scale: f32,

    pub total_seconds: f32,
    pub delta_seconds: f32,
    pub frame_index: u64,

    /// Lights collected from the Light bucket this frame.
    pub lights: Vec<LightData>,
    /// Nodes whose cores requested a post effect, in scene order.
    pub post_effect_nodes: Vec<NodeHandle>,
    /// Pass currently being submitted.
    pub stage: RenderStage,
}

impl Default for RenderContext {
    fn default() -> Self {
        let mut ctx = Self {
            camera: CameraCore::default(),
            world_matrix: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            frustum: Frustum::default(),
            eye: Vec3::ZERO,
            actual_width: 1.0,
            actual_height: 1.0,
            dpi_scale: 1.0,
            total_seconds: 0.0,
            delta_seconds: 0.0,
            frame_index: 0,
            lights: Vec::new(),
            post_effect_nodes: Vec::new(),
            stage: RenderStage::Setup,
        };
        ctx.refresh_matrices();
        ctx
    }
}

impl RenderContext {
    /// Pushes viewport state in and recomputes derived matrices and planes.
    pub fn update_view(&mut self, camera: CameraCore, world_matrix: Mat4, width: f32, height: f32, dpi_scale: f32) {
        self.camera = camera;
        if height > 0.0 {
            self.camera.aspect = width / height;
        }
        self.world_matrix = world_matrix;
        self.actual_width = width;
        self.actual_height = height;
        self.dpi_scale = dpi_scale;
        self.refresh_matrices();
    }

    pub fn update_time(&mut self, total_seconds: f32, delta_seconds: f32, frame_index: u64) {
        self.total_seconds = total_seconds;
        self.delta_seconds = delta_seconds;
        self.frame_index = frame_index;
    }

    fn refresh_matrices(&mut self) {
        self.view = self.camera.view_matrix() * self.world_matrix;
        self.projection = self.camera.projection_matrix();
        self.view_projection = self.projection * self.view;
        self.frustum = Frustum::from_matrix(self.view_projection);
        self.eye = self.world_matrix.inverse().transform_point3(self.camera.position);
    }

    /// Distance from the camera to a world-space point.
    #[inline]
    #[must_use]
    pub fn camera_distance(&self, point: Vec3) -> f32 {
        self.eye.distance(point)
    }

    /// Global constant block for this frame. Lights beyond [`MAX_LIGHTS`] are
    /// dropped.
    #[must_use]
    pub fn globals(&self) -> GlobalConstants {
        let (w, h) = (self.actual_width.max(1.0), self.actual_height.max(1.0));
        GlobalConstants {
            view: self.view,
            projection: self.projection,
            view_projection: self.view_projection,
            world: self.world_matrix,
            camera_position: self.camera.position.extend(1.0),
            viewport: Vec4::new(w, h, 1.0 / w, 1.0 / h),
            time: Vec4::new(
                self.total_seconds,
                self.delta_seconds,
                self.dpi_scale,
                self.lights.len().min(MAX_LIGHTS) as f32,
            ),
        }
    }

    #[must_use]
    pub fn uploaded_lights(&self) -> &[LightData] {
        &self.lights[..self.lights.len().min(MAX_LIGHTS)]
    }
}
