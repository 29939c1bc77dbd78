//! # Procedural Geometry Generation
//!
//! Generates primitive shapes in the renderer's vertex format so scenes can be
//! assembled without an asset pipeline.
//!
//! ```no_run
//! use umbra::gfx::geometry::{generate_cube, generate_plane, generate_sphere};
//!
//! let cube = generate_cube();
//! let ground = generate_plane(20.0, 20.0, 4, 4);
//! let ball = generate_sphere(32, 16);
//! ```

pub mod primitives;

pub use primitives::*;

use crate::gfx::scene::vertex::Vertex3D;

/// Generated geometry ready for GPU upload
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    pub vertices: Vec<Vertex3D>,
    /// Triangle indices, counter-clockwise when seen from outside
    pub indices: Vec<u32>,
}

impl GeometryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push(&mut self, position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) {
        self.vertices.push(Vertex3D {
            position,
            normal,
            tex_coords,
        });
    }
}
