//! Mesh handles
//!
//! A [`Mesh`] is a lightweight, copyable reference to geometry that already
//! lives on the GPU, together with its local-space bounds.

use cgmath::Point3;

use crate::gfx::camera::Aabb;
use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::geometry::GeometryData;
use crate::gfx::rendering::gpu::{GpuContext, MeshHandle};
use crate::gfx::scene::vertex::Vertex3D;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub handle: MeshHandle,
    pub index_count: u32,
    /// Local-space bounds used for culling and light range tests
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new(handle: MeshHandle, index_count: u32, bounds: Aabb) -> Self {
        Self {
            handle,
            index_count,
            bounds,
        }
    }

    /// Uploads vertex and index data and computes local bounds
    ///
    /// # Arguments
    /// * `gpu` - Context owning the GPU buffers
    /// * `vertices` - Vertex data
    /// * `indices` - Triangle list indices into `vertices`
    pub fn upload<G: GpuContext + ?Sized>(
        gpu: &mut G,
        vertices: &[Vertex3D],
        indices: &[u32],
    ) -> RenderResult<Self> {
        let bounds = Aabb::from_points(vertices.iter().map(|v| Point3::from(v.position)))
            .ok_or_else(|| RenderError::missing("mesh has no vertices"))?;

        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RenderError::missing(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }

        let handle = gpu.upload_mesh(vertices, indices)?;
        Ok(Self::new(handle, indices.len() as u32, bounds))
    }

    pub fn from_geometry<G: GpuContext + ?Sized>(
        gpu: &mut G,
        geometry: &GeometryData,
    ) -> RenderResult<Self> {
        Self::upload(gpu, &geometry.vertices, &geometry.indices)
    }
}
