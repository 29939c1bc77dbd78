//! Per-draw shader uniforms
//!
//! One [`DrawUniforms`] block is bound for every draw. The layout matches the
//! `DrawUniforms` struct in `forward.wgsl`; every member is 16-byte
//! aligned so the Rust and WGSL layouts agree without padding fields.

use cgmath::{Matrix, Matrix4, SquareMatrix};

use crate::gfx::camera::{convert_matrix4_to_array, Camera};
use crate::gfx::rendering::forward::ActiveLight;
use crate::gfx::resources::material::Material;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model`
    pub normal_matrix: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub base_color: [f32; 4],
    pub ambient: [f32; 4],
    /// Light colour premultiplied by intensity
    pub light_color: [f32; 4],
    /// xyz position, w range
    pub light_position: [f32; 4],
    /// xyz direction, w cosine of the spot cone
    pub light_direction: [f32; 4],
    /// x light type, y shadowed flag
    pub flags: [u32; 4],
    /// x depth bias
    pub shadow_params: [f32; 4],
    /// Light-space transforms, one per shadow map layer
    pub shadow_view_proj: [[[f32; 4]; 4]; 6],
}

impl DrawUniforms {
    /// Uniforms for a base pass: material colour and ambient, no light
    pub fn for_surface(model: &Matrix4<f32>, camera: &Camera, material: &Material, ambient: [f32; 3]) -> Self {
        let mut uniforms = Self::for_view(model, camera);
        uniforms.base_color = material.base_color;
        uniforms.ambient = [ambient[0], ambient[1], ambient[2], 1.0];
        uniforms
    }

    /// Uniforms for a depth-only draw seen from `camera`
    pub fn for_view(model: &Matrix4<f32>, camera: &Camera) -> Self {
        let normal_matrix = model.invert().map(|m| m.transpose()).unwrap_or(*model);
        let identity = convert_matrix4_to_array(Matrix4::identity());

        Self {
            model: convert_matrix4_to_array(*model),
            normal_matrix: convert_matrix4_to_array(normal_matrix),
            view_proj: convert_matrix4_to_array(camera.view_projection()),
            camera_position: [camera.eye.x, camera.eye.y, camera.eye.z, 1.0],
            base_color: [1.0; 4],
            ambient: [0.0; 4],
            light_color: [0.0; 4],
            light_position: [0.0; 4],
            light_direction: [0.0; 4],
            flags: [0; 4],
            shadow_params: [0.0; 4],
            shadow_view_proj: [identity; 6],
        }
    }

    /// Copy of these uniforms carrying one light's parameters and shadow transforms
    pub fn with_light(&self, light: &ActiveLight) -> Self {
        let mut uniforms = *self;
        let [r, g, b] = light.radiance;
        uniforms.light_color = [r, g, b, 1.0];
        uniforms.light_position = [light.position.x, light.position.y, light.position.z, light.range];
        uniforms.light_direction = [light.direction.x, light.direction.y, light.direction.z, light.cos_cutoff];
        uniforms.flags = [light.light_type.shader_index(), 0, 0, 0];

        if let Some(shadow) = &light.shadow {
            uniforms.flags[1] = 1;
            uniforms.shadow_params = [shadow.bias, 0.0, 0.0, 0.0];
            for (slot, matrix) in uniforms
                .shadow_view_proj
                .iter_mut()
                .zip(shadow.projection.matrices())
            {
                *slot = convert_matrix4_to_array(*matrix);
            }
        }
        uniforms
    }

    /// Copy with shadow sampling switched off
    pub fn without_shadow(&self) -> Self {
        let mut uniforms = *self;
        uniforms.flags[1] = 0;
        uniforms
    }

    pub fn is_shadowed(&self) -> bool {
        self.flags[1] != 0
    }

    pub fn light_type_index(&self) -> u32 {
        self.flags[0]
    }
}
