//! GPU-side constant layouts.
//!
//! All structs are `#[repr(C)]` + `Pod` so they can be uploaded with
//! `bytemuck::bytes_of` without further packing.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Maximum number of lights uploaded per frame.
pub const MAX_LIGHTS: usize = 16;

/// Per-frame globals: camera, viewport and time.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub world: Mat4,
    pub camera_position: Vec4,
    /// x: width, y: height, z: 1/width, w: 1/height.
    pub viewport: Vec4,
    /// x: total seconds, y: frame delta, z: dpi scale, w: light count.
    pub time: Vec4,
}

impl Default for GlobalConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            camera_position: Vec4::ZERO,
            viewport: Vec4::ZERO,
            time: Vec4::ZERO,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Ambient = 0,
    Directional = 1,
    Point = 2,
    Spot = 3,
}

/// Packed light record.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightData {
    /// rgb + intensity.
    pub color: Vec4,
    /// xyz position, w = range.
    pub position: Vec4,
    /// xyz direction, w = cos(outer cone).
    pub direction: Vec4,
    pub kind: u32,
    pub _pad: [u32; 3],
}

impl LightData {
    #[must_use]
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            color: color.extend(intensity),
            position: Vec4::ZERO,
            direction: Vec4::new(0.0, 0.0, -1.0, 0.0),
            kind: kind as u32,
            _pad: [0; 3],
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3, range: f32) -> Self {
        self.position = position.extend(range);
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Vec3) -> Self {
        let w = self.direction.w;
        self.direction = direction.normalize_or_zero().extend(w);
        self
    }
}

/// Per-object constants written by mesh cores.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelConstants {
    pub world: Mat4,
    pub normal_matrix: Mat4,
}

impl ModelConstants {
    #[must_use]
    pub fn from_world(world: Mat4) -> Self {
        Self {
            world,
            normal_matrix: world.inverse().transpose(),
        }
    }
}
