use cgmath::{Deg, InnerSpace, Matrix4, Point3, Vector3};

use super::frustum::Frustum;

/// cgmath builds OpenGL clip space (z in -1..1); wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// View and projection matrices plus the eye position.
///
/// The renderer treats a camera as a read-only input. Light views used
/// during shadow generation are plain cameras too, which keeps the depth
/// traversal and the shading traversal on the same code path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub eye: Point3<f32>,
}

impl Camera {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>, eye: Point3<f32>) -> Self {
        Self {
            view,
            projection,
            eye,
        }
    }

    /// Creates a perspective camera looking from `eye` towards `target`
    ///
    /// # Arguments
    /// * `fovy` - Vertical field of view
    /// * `aspect` - Width over height of the target
    /// * `znear`, `zfar` - Clip plane distances
    pub fn perspective(
        eye: Point3<f32>,
        target: Point3<f32>,
        up: Vector3<f32>,
        fovy: Deg<f32>,
        aspect: f32,
        znear: f32,
        zfar: f32,
    ) -> Self {
        Self {
            view: Matrix4::look_at_rh(eye, target, up),
            projection: cgmath::perspective(fovy, aspect, znear, zfar),
            eye,
        }
    }

    /// Creates an orthographic camera covering a `2*half_width` by `2*half_height` window
    pub fn orthographic(
        eye: Point3<f32>,
        target: Point3<f32>,
        up: Vector3<f32>,
        half_width: f32,
        half_height: f32,
        znear: f32,
        zfar: f32,
    ) -> Self {
        Self {
            view: Matrix4::look_at_rh(eye, target, up),
            projection: cgmath::ortho(
                -half_width,
                half_width,
                -half_height,
                half_height,
                znear,
                zfar,
            ),
            eye,
        }
    }

    /// Combined view-projection in wgpu clip space
    pub fn view_projection(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.projection * self.view
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    pub fn distance_to(&self, point: Point3<f32>) -> f32 {
        (point - self.eye).magnitude()
    }
}

/// Picks an up vector that is not parallel to `direction`
pub fn stable_up(direction: Vector3<f32>) -> Vector3<f32> {
    if direction.normalize().y.abs() > 0.99 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    }
}

pub fn convert_matrix4_to_array(matrix4: Matrix4<f32>) -> [[f32; 4]; 4] {
    let mut result = [[0.0; 4]; 4];

    for i in 0..4 {
        for j in 0..4 {
            result[i][j] = matrix4[i][j];
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    #[test]
    fn test_view_projection_maps_depth_to_unit_range() {
        let camera = Camera::perspective(
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
            Deg(60.0),
            1.0,
            1.0,
            10.0,
        );
        let vp = camera.view_projection();

        let near = vp * Vector4::new(0.0, 0.0, 4.0, 1.0);
        let far = vp * Vector4::new(0.0, 0.0, -5.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stable_up_avoids_parallel_axis() {
        assert_eq!(stable_up(Vector3::new(0.0, -1.0, 0.0)), Vector3::unit_z());
        assert_eq!(stable_up(Vector3::new(1.0, -1.0, 0.0)), Vector3::unit_y());
    }

    #[test]
    fn test_convert_matrix_is_column_major() {
        let m = Matrix4::from_translation(Vector3::new(4.0, 5.0, 6.0));
        let array = convert_matrix4_to_array(m);
        assert_eq!(array[3], [4.0, 5.0, 6.0, 1.0]);
    }
}
