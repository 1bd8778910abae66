use glam::{Mat4, Vec3, Vec4};

use super::bounds::{BoundingBox, BoundingSphere};

/// Result of classifying a volume against a single plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneIntersection {
    /// Entirely on the negative side.
    Back,
    /// Entirely on the positive side.
    Front,
    /// Straddles the plane.
    Intersecting,
}

/// View frustum as six inward-facing planes.
///
/// Plane order: Left, Right, Bottom, Top, Near, Far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Default for Frustum {
    /// A frustum that contains everything.
    fn default() -> Self {
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, f32::MAX); 6],
        }
    }
}

impl Frustum {
    /// Extracts planes from a view-projection matrix (Gribb-Hartmann),
    /// assuming a `[0, 1]` clip-space depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0], // Left
            rows[3] - rows[0], // Right
            rows[3] + rows[1], // Bottom
            rows[3] - rows[1], // Top
            rows[2],           // Near
            rows[3] - rows[2], // Far
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[inline]
    fn distance(plane: Vec4, point: Vec3) -> f32 {
        plane.truncate().dot(point) + plane.w
    }

    /// Box test: rejects when the positive vertex is behind any plane.
    #[must_use]
    pub fn intersects_box(&self, aabb: &BoundingBox) -> bool {
        self.planes.iter().all(|plane| {
            let p = aabb.positive_vertex(plane.truncate());
            Self::distance(*plane, p) >= 0.0
        })
    }

    /// Classifies a sphere against a single plane.
    #[must_use]
    pub fn classify_sphere_plane(plane: Vec4, sphere: &BoundingSphere) -> PlaneIntersection {
        let d = Self::distance(plane, sphere.center);
        if d < -sphere.radius {
            PlaneIntersection::Back
        } else if d < sphere.radius {
            PlaneIntersection::Intersecting
        } else {
            PlaneIntersection::Front
        }
    }

    /// Sphere test: `Back` on any plane rejects, `Intersecting` accepts early.
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        for plane in &self.planes {
            match Self::classify_sphere_plane(*plane, sphere) {
                PlaneIntersection::Back => return false,
                PlaneIntersection::Intersecting => return true,
                PlaneIntersection::Front => {}
            }
        }
        true
    }

    /// Dual test used by the culling pass: box first, then sphere.
    #[must_use]
    pub fn test_bounds(&self, aabb: &BoundingBox, sphere: &BoundingSphere) -> bool {
        self.intersects_box(aabb) && self.intersects_sphere(sphere)
    }
}
