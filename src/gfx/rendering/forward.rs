//! Forward lighting accumulation
//!
//! Every mesh is drawn once with its material and the ambient term, then once
//! more per affecting light with additive blending and an equal depth test.
//! The framebuffer ends up holding `base + sum(light contributions)`, each light
//! pass attenuated by its own shadow test.

use cgmath::{InnerSpace, Matrix4, MetricSpace, Point3, Vector3};
use log::{debug, warn};

use super::gpu::{GpuContext, ShaderPass, ShadowTargetHandle};
use super::render_state::RenderStateManager;
use super::shadow_map::ShadowProjection;
use super::uniforms::DrawUniforms;
use crate::gfx::camera::{Aabb, Camera};
use crate::gfx::error::RenderResult;
use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;
use crate::gfx::scene::light::{Light, LightId, LightType};
use crate::gfx::scene::Scene;

/// Shadow map a light pass samples from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBinding {
    pub target: ShadowTargetHandle,
    pub projection: ShadowProjection,
    pub bias: f32,
}

/// Per-frame snapshot of a light, ready to be packed into uniforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveLight {
    pub id: LightId,
    pub light_type: LightType,
    pub position: Point3<f32>,
    /// Normalized
    pub direction: Vector3<f32>,
    pub radiance: [f32; 3],
    pub range: f32,
    /// Cosine of the spot half-angle, -1 for lights without a cone
    pub cos_cutoff: f32,
    /// Present only when the light casts shadows and its map is valid
    pub shadow: Option<ShadowBinding>,
}

impl ActiveLight {
    pub fn from_light(light: &Light) -> Self {
        let direction = if light.direction.magnitude2() > 0.0 {
            light.direction.normalize()
        } else {
            -Vector3::unit_y()
        };

        let cos_cutoff = match light.light_type {
            LightType::Spot => cgmath::Rad::from(light.cone_angle).0.cos(),
            LightType::Directional | LightType::Point => -1.0,
        };

        let shadow = match light.shadow_map() {
            Some(map) if light.casts_shadow && map.is_valid() => Some(ShadowBinding {
                target: map.target,
                projection: map.projection,
                bias: light.shadow_bias,
            }),
            _ => None,
        };

        Self {
            id: light.id(),
            light_type: light.light_type,
            position: light.position,
            direction,
            radiance: light.radiance(),
            range: light.range,
            cos_cutoff,
            shadow,
        }
    }

    pub fn from_scene(scene: &Scene) -> Vec<ActiveLight> {
        scene.lights().iter().map(Self::from_light).collect()
    }

    /// Whether the light can reach anything inside `world_bounds`
    pub fn affects(&self, world_bounds: &Aabb) -> bool {
        match self.light_type {
            LightType::Directional => true,
            LightType::Spot | LightType::Point => {
                self.position.distance(world_bounds.center()) - world_bounds.radius() <= self.range
            }
        }
    }
}

/// Issues the base and per-light passes for single meshes
#[derive(Debug, Clone)]
pub struct ForwardLighting {
    pub ambient: [f32; 3],
}

impl Default for ForwardLighting {
    fn default() -> Self {
        Self { ambient: [0.1; 3] }
    }
}

impl ForwardLighting {
    pub fn new(ambient: [f32; 3]) -> Self {
        Self { ambient }
    }

    /// Draws `mesh` once for the base pass and once per affecting light
    ///
    /// Returns the number of draw submissions. An error means the base pass
    /// itself failed and nothing was drawn; a failing light pass is logged and
    /// skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn render_mesh_with_material<G: GpuContext + ?Sized>(
        &self,
        gpu: &mut G,
        states: &mut RenderStateManager,
        model: &Matrix4<f32>,
        mesh: &Mesh,
        material: &Material,
        camera: &Camera,
        lights: &[ActiveLight],
    ) -> RenderResult<usize> {
        let base = DrawUniforms::for_surface(model, camera, material, self.ambient);

        gpu.bind_shader(&material.shader, ShaderPass::Base, &base)?;
        Self::bind_material_texture(gpu, material);
        gpu.bind_shadow_map(None)?;
        states.apply_state(gpu, material, false, true);
        gpu.draw_mesh(mesh.handle)?;

        let world_bounds = mesh.bounds.transformed(model);
        let mut draws = 1;

        for light in lights.iter().filter(|light| light.affects(&world_bounds)) {
            match Self::light_pass(gpu, states, mesh, material, &base, light) {
                Ok(()) => draws += 1,
                Err(err) => warn!(
                    "Skipping light {:?} pass for material '{}': {}",
                    light.id, material.name, err
                ),
            }
        }

        Ok(draws)
    }

    fn light_pass<G: GpuContext + ?Sized>(
        gpu: &mut G,
        states: &mut RenderStateManager,
        mesh: &Mesh,
        material: &Material,
        base: &DrawUniforms,
        light: &ActiveLight,
    ) -> RenderResult<()> {
        let mut uniforms = base.with_light(light);

        let shadow = light.shadow.map(|binding| binding.target);
        if let Err(err) = gpu.bind_shadow_map(shadow) {
            warn!("Light {:?} drawn unshadowed: {}", light.id, err);
            uniforms = uniforms.without_shadow();
            gpu.bind_shadow_map(None)?;
        }

        gpu.bind_shader(&material.shader, ShaderPass::Light(light.light_type), &uniforms)?;
        Self::bind_material_texture(gpu, material);
        states.apply_state(gpu, material, true, false);
        gpu.draw_mesh(mesh.handle)
    }

    fn bind_material_texture<G: GpuContext + ?Sized>(gpu: &mut G, material: &Material) {
        if let Err(err) = gpu.bind_texture(material.texture) {
            warn!("Material '{}' falls back to white: {}", material.name, err);
            if let Err(err) = gpu.bind_texture(None) {
                warn!("Default texture unavailable: {}", err);
            }
        }
    }

    /// Draws `mesh` depth-only from `light_camera` into the bound shadow layer
    ///
    /// Returns `false` when the mesh contributes nothing to the map: blended
    /// materials cast no shadow, and a missing depth shader or mesh skips the
    /// draw.
    pub fn render_shadow_map<G: GpuContext + ?Sized>(
        &self,
        gpu: &mut G,
        material: &Material,
        light_camera: &Camera,
        model: &Matrix4<f32>,
        mesh: &Mesh,
    ) -> bool {
        if material.is_blended() {
            return false;
        }

        let uniforms = DrawUniforms::for_view(model, light_camera);
        if let Err(err) = gpu.bind_shader(&material.shader, ShaderPass::Depth, &uniforms) {
            debug!("No depth pass for material '{}': {}", material.name, err);
            return false;
        }

        match gpu.draw_mesh(mesh.handle) {
            Ok(()) => true,
            Err(err) => {
                warn!("Shadow draw failed for material '{}': {}", material.name, err);
                false
            }
        }
    }
}
