use glam::{Mat4, Vec3};
use prism_core::math::Frustum;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fov_y: f32 },
    /// Visible height in world units.
    Orthographic { height: f32 },
}

/// Camera state consumed by a frame.
///
/// Depth maps to `[0, 1]` (right-handed, looking down -Z), matching the
/// near-plane extraction of [`Frustum::from_matrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCore {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraCore {
    fn default() -> Self {
        Self::perspective(45.0, 1.0, 0.1, 1000.0).looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
    }
}

impl CameraCore {
    #[must_use]
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov_y: fov_degrees.to_radians(),
            },
            aspect,
            near,
            far,
        }
    }

    #[must_use]
    pub fn orthographic(height: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height },
            ..Self::perspective(45.0, aspect, near, far)
        }
    }

    #[must_use]
    pub fn looking_at(mut self, position: Vec3, target: Vec3) -> Self {
        self.position = position;
        self.target = target;
        self
    }

    #[must_use]
    pub fn look_direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y } => Mat4::perspective_rh(fov_y, self.aspect, self.near, self.far),
            Projection::Orthographic { height } => {
                let h = height * 0.5;
                let w = h * self.aspect;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        }
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection())
    }
}
