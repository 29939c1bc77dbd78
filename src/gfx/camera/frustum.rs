//! Bounding volumes and view frustum tests
//!
//! Used for node culling against the camera in shading passes and against
//! the light view in depth passes.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3, Vector4};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all points, `None` for an empty slice
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Aabb::new(first, first);
        for p in iter {
            bounds.include(p);
        }
        Some(bounds)
    }

    pub fn include(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut merged = *self;
        merged.include(other.min);
        merged.include(other.max);
        merged
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    /// Radius of the bounding sphere around [`Aabb::center`]
    pub fn radius(&self) -> f32 {
        self.half_extents().magnitude()
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// World-space box enclosing this box after `matrix`
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Aabb {
        let corners = self.corners().map(|c| matrix.transform_point(c));
        let mut bounds = Aabb::new(corners[0], corners[0]);
        for c in &corners[1..] {
            bounds.include(*c);
        }
        bounds
    }
}

/// Six clip planes extracted from a view-projection matrix.
///
/// Plane order is left, right, bottom, top, near, far. A point is inside a
/// plane when `dot(plane.xyz, p) + plane.w >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts planes from a matrix producing wgpu clip space (depth in 0..1)
    pub fn from_view_projection(m: &Matrix4<f32>) -> Self {
        let row = |i: usize| Vector4::new(m.x[i], m.y[i], m.z[i], m.w[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let len = p.truncate().magnitude();
            if len > f32::EPSILON {
                p / len
            } else {
                p
            }
        });

        Self { planes }
    }

    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p.to_vec()) + plane.w >= 0.0)
    }

    /// Conservative box test: false only when the box is fully outside one plane
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Point3::new(
                if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.truncate().dot(positive.to_vec()) + plane.w >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::camera::Camera;
    use cgmath::{Deg, Vector3};

    fn unit_box() -> Aabb {
        Aabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_aabb_transform_and_union() {
        let moved = unit_box().transformed(&Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Point3::new(2.0, 0.0, 0.0));

        let merged = unit_box().union(&moved);
        assert_eq!(merged.min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(merged.max, Point3::new(2.5, 0.5, 0.5));
    }

    #[test]
    fn test_aabb_from_points() {
        assert!(Aabb::from_points(Vec::new()).is_none());
        let bounds = Aabb::from_points(vec![
            Point3::new(1.0, -2.0, 0.0),
            Point3::new(-1.0, 3.0, 0.5),
        ])
        .unwrap();
        assert_eq!(bounds.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Point3::new(1.0, 3.0, 0.5));
    }

    #[test]
    fn test_frustum_culls_boxes_behind_camera() {
        let camera = Camera::perspective(
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
            Deg(60.0),
            1.0,
            0.1,
            100.0,
        );
        let frustum = camera.frustum();

        assert!(frustum.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(frustum.intersects_aabb(&unit_box()));

        let behind = unit_box().transformed(&Matrix4::from_translation(Vector3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.intersects_aabb(&behind));

        let far_left = unit_box().transformed(&Matrix4::from_translation(Vector3::new(-50.0, 0.0, 0.0)));
        assert!(!frustum.intersects_aabb(&far_left));
    }
}
