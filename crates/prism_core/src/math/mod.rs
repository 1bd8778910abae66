//! Math primitives used by culling and layout.
//!
//! Vector and matrix types come from `glam` and are re-exported here so that
//! downstream crates share one version.

pub mod bounds;
pub mod frustum;
pub mod rect;

pub use bounds::{BoundingBox, BoundingSphere};
pub use frustum::{Frustum, PlaneIntersection};
pub use glam::{Affine2, Mat4, Vec2, Vec3, Vec4};
pub use rect::{Rect, Thickness};
