//! # Primitive Shape Generation
//!
//! All shapes are Y-up, centred on the origin and wound counter-clockwise.

use cgmath::{InnerSpace, Vector3};
use std::f32::consts::PI;

use super::GeometryData;

/// Unit cube spanning -0.5..0.5 on every axis, four vertices per face
pub fn generate_cube() -> GeometryData {
    // (normal, u axis, v axis) with u x v == normal
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

    let mut data = GeometryData::new();
    for (normal, u, v) in faces {
        let (n, u, v) = (Vector3::from(normal), Vector3::from(u), Vector3::from(v));
        let base = data.vertices.len() as u32;
        for (su, sv) in corners {
            let p = n * 0.5 + u * su + v * sv;
            data.push(p.into(), normal, [su + 0.5, 0.5 - sv]);
        }
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    data
}

/// Flat plane in the XZ plane facing +Y
///
/// # Arguments
/// * `width` - Extent along X
/// * `depth` - Extent along Z
/// * `width_segments`, `depth_segments` - Subdivisions per axis (at least 1)
pub fn generate_plane(width: f32, depth: f32, width_segments: u32, depth_segments: u32) -> GeometryData {
    let w_segs = width_segments.max(1);
    let d_segs = depth_segments.max(1);

    let mut data = GeometryData::new();
    for row in 0..=d_segs {
        let v = row as f32 / d_segs as f32;
        for col in 0..=w_segs {
            let u = col as f32 / w_segs as f32;
            data.push(
                [(u - 0.5) * width, 0.0, (v - 0.5) * depth],
                [0.0, 1.0, 0.0],
                [u, v],
            );
        }
    }

    for row in 0..d_segs {
        for col in 0..w_segs {
            let i = row * (w_segs + 1) + col;
            let next_row = i + w_segs + 1;
            data.indices
                .extend_from_slice(&[i, next_row, i + 1, next_row, next_row + 1, i + 1]);
        }
    }
    data
}

/// UV sphere of radius 1
pub fn generate_sphere(longitude_segments: u32, latitude_segments: u32) -> GeometryData {
    let long_segs = longitude_segments.max(3);
    let lat_segs = latitude_segments.max(2);

    let mut data = GeometryData::new();
    for lat in 0..=lat_segs {
        let theta = lat as f32 * PI / lat_segs as f32;
        for long in 0..=long_segs {
            let phi = long as f32 * 2.0 * PI / long_segs as f32;
            let p = Vector3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            let normal = if p.magnitude2() > 0.0 { p.normalize() } else { Vector3::unit_y() };
            data.push(
                p.into(),
                normal.into(),
                [long as f32 / long_segs as f32, lat as f32 / lat_segs as f32],
            );
        }
    }

    for lat in 0..lat_segs {
        for long in 0..long_segs {
            let first = lat * (long_segs + 1) + long;
            let second = first + long_segs + 1;
            data.indices
                .extend_from_slice(&[first, first + 1, second, second, first + 1, second + 1]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::scene::vertex::Vertex3D;

    fn face_normal(data: &GeometryData, tri: usize) -> Vector3<f32> {
        let p = |i: usize| Vector3::from(data.vertices[data.indices[tri * 3 + i] as usize].position);
        (p(1) - p(0)).cross(p(2) - p(0))
    }

    fn vertex_normal(v: &Vertex3D) -> Vector3<f32> {
        Vector3::from(v.normal)
    }

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);

        for tri in 0..cube.triangle_count() {
            let n = vertex_normal(&cube.vertices[cube.indices[tri * 3] as usize]);
            assert!(face_normal(&cube, tri).dot(n) > 0.0, "triangle {} winds inward", tri);
        }
    }

    #[test]
    fn test_plane_generation() {
        let plane = generate_plane(2.0, 4.0, 2, 2);
        assert_eq!(plane.vertex_count(), 9);
        assert_eq!(plane.triangle_count(), 8);
        for tri in 0..plane.triangle_count() {
            assert!(face_normal(&plane, tri).y > 0.0);
        }
    }

    #[test]
    fn test_sphere_faces_outward() {
        let sphere = generate_sphere(16, 8);
        assert_eq!(sphere.vertex_count(), 17 * 9);
        for tri in 0..sphere.triangle_count() {
            let n = face_normal(&sphere, tri);
            if n.magnitude2() < 1e-10 {
                continue; // degenerate pole triangle
            }
            let centroid: Vector3<f32> = (0..3)
                .map(|i| Vector3::from(sphere.vertices[sphere.indices[tri * 3 + i] as usize].position))
                .fold(Vector3::new(0.0, 0.0, 0.0), |acc, p| acc + p);
            assert!(n.dot(centroid) > 0.0);
        }
    }
}
