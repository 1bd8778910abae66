//! Viewport Provider
//!
//! The host's window onto the application: it supplies the camera, the world
//! matrix, the logical size and DPI scale, and owns the 3D scene and the
//! optional 2D overlay the host renders.

use glam::Mat4;
use prism_scene::{CameraCore, Scene, Scene2D};

use crate::clock::FrameTime;

pub trait ViewportProvider: Send {
    /// Called once per rendered frame before classification.
    fn update(&mut self, _time: &FrameTime) {}

    fn camera(&self) -> CameraCore;

    fn world_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    /// Logical size in device-independent pixels.
    fn actual_size(&self) -> (f32, f32);

    fn dpi_scale(&self) -> f32 {
        1.0
    }

    /// Notified when the host's render target is resized.
    fn resize(&mut self, _width: f32, _height: f32) {}

    fn scene(&self) -> &Scene;
    fn scene_mut(&mut self) -> &mut Scene;

    fn overlay(&self) -> Option<&Scene2D> {
        None
    }

    fn overlay_mut(&mut self) -> Option<&mut Scene2D> {
        None
    }

    /// Both scenes at once, for submitting the overlay while background
    /// tasks still read the 3D scene.
    fn scenes_mut(&mut self) -> (&mut Scene, Option<&mut Scene2D>);
}

/// Ready-made provider with a fixed camera and an owned scene.
pub struct Viewport {
    pub camera: CameraCore,
    pub world_matrix: Mat4,
    pub width: f32,
    pub height: f32,
    pub dpi_scale: f32,
    scene: Scene,
    overlay: Option<Scene2D>,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            camera: CameraCore::default(),
            world_matrix: Mat4::IDENTITY,
            width,
            height,
            dpi_scale: 1.0,
            scene: Scene::new(),
            overlay: None,
        }
    }

    #[must_use]
    pub fn with_camera(mut self, camera: CameraCore) -> Self {
        self.camera = camera;
        self
    }

    #[must_use]
    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scene = scene;
        self
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay: Scene2D) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

impl ViewportProvider for Viewport {
    fn camera(&self) -> CameraCore {
        self.camera
    }

    fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    fn actual_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn dpi_scale(&self) -> f32 {
        self.dpi_scale
    }

    fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn overlay(&self) -> Option<&Scene2D> {
        self.overlay.as_ref()
    }

    fn overlay_mut(&mut self) -> Option<&mut Scene2D> {
        self.overlay.as_mut()
    }

    fn scenes_mut(&mut self) -> (&mut Scene, Option<&mut Scene2D>) {
        (&mut self.scene, self.overlay.as_mut())
    }
}
