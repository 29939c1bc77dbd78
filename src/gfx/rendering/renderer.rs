//! Frame orchestration
//!
//! [`Renderer`] owns a [`GpuContext`] and runs the fixed frame sequence:
//! clear, default flags, shadow maps for every shadow-casting light, then the
//! forward-lit scene. It also exposes each stage on its own so callers can
//! assemble custom frames or render single prefabs.

use cgmath::Matrix4;
use log::{debug, warn};
use std::sync::Arc;

use super::config::RendererConfig;
use super::forward::{ActiveLight, ForwardLighting};
use super::gpu::{ClearOp, GpuContext, RenderTarget, Viewport};
use super::render_state::{RenderState, RenderStateManager};
use super::shadow_cache::ShadowCacheStats;
use super::shadow_map::ShadowMapGenerator;
use super::traversal::{self, DrawSink};
use crate::gfx::camera::{Camera, Frustum};
use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;
use crate::gfx::scene::light::{Light, LightId, LightType};
use crate::gfx::scene::node::{Node, Prefab};
use crate::gfx::scene::Scene;

/// Counters for the most recent shading traversal
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Meshes that reached the forward accumulator
    pub meshes: usize,
    /// Draw submissions across base and light passes
    pub draws: usize,
    pub culled: usize,
    /// Blended meshes drawn after opaque geometry
    pub deferred: usize,
    /// Meshes whose base pass failed
    pub failed: usize,
}

/// A blended mesh waiting for the back-to-front flush
#[derive(Debug, Clone)]
struct DeferredDraw {
    world: Matrix4<f32>,
    mesh: Mesh,
    material: Arc<Material>,
    distance: f32,
}

/// Forward shading sink used by every scene, prefab and node render
struct ShadingSink<'a, G: GpuContext> {
    gpu: &'a mut G,
    states: &'a mut RenderStateManager,
    forward: &'a ForwardLighting,
    camera: &'a Camera,
    lights: &'a [ActiveLight],
    frustum: Option<Frustum>,
    deferred: Option<&'a mut Vec<DeferredDraw>>,
    stats: &'a mut FrameStats,
}

impl<G: GpuContext> ShadingSink<'_, G> {
    fn draw(&mut self, world: &Matrix4<f32>, mesh: &Mesh, material: &Material) {
        self.stats.meshes += 1;
        match self.forward.render_mesh_with_material(
            &mut *self.gpu,
            &mut *self.states,
            world,
            mesh,
            material,
            self.camera,
            self.lights,
        ) {
            Ok(draws) => self.stats.draws += draws,
            Err(err) => {
                self.stats.failed += 1;
                warn!("Skipping mesh with material '{}': {}", material.name, err);
            }
        }
    }
}

impl<G: GpuContext> DrawSink for ShadingSink<'_, G> {
    fn submit(&mut self, world: &Matrix4<f32>, mesh: &Mesh, material: &Arc<Material>) {
        if let Some(frustum) = &self.frustum {
            if !frustum.intersects_aabb(&mesh.bounds.transformed(world)) {
                self.stats.culled += 1;
                return;
            }
        }

        if material.is_blended() {
            if let Some(deferred) = self.deferred.as_mut() {
                let center = mesh.bounds.transformed(world).center();
                deferred.push(DeferredDraw {
                    world: *world,
                    mesh: *mesh,
                    material: Arc::clone(material),
                    distance: self.camera.distance_to(center),
                });
                return;
            }
        }

        self.draw(world, mesh, material);
    }
}

/// Multi-pass forward renderer with shadow mapping
pub struct Renderer<G: GpuContext> {
    gpu: G,
    config: RendererConfig,
    states: RenderStateManager,
    forward: ForwardLighting,
    shadows: ShadowMapGenerator,
    active_lights: Vec<ActiveLight>,
    stats: FrameStats,
}

impl<G: GpuContext> Renderer<G> {
    pub fn new(gpu: G, config: RendererConfig) -> Self {
        let shadows = ShadowMapGenerator::new(&config);
        Self {
            gpu,
            config,
            states: RenderStateManager::new(),
            forward: ForwardLighting::default(),
            shadows,
            active_lights: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The render state most recently pushed to the GPU
    pub fn state(&self) -> RenderState {
        self.states.current()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn shadow_stats(&self) -> ShadowCacheStats {
        self.shadows.stats()
    }

    pub fn begin_frame(&mut self) -> RenderResult<()> {
        self.gpu.begin_frame()
    }

    pub fn end_frame(&mut self) -> RenderResult<()> {
        self.gpu.end_frame()
    }

    /// Frees the shadow target of a light that is being dropped
    pub fn release_light(&mut self, light: &mut Light) {
        ShadowMapGenerator::release(&mut self.gpu, light);
    }

    /// Renders a full frame into the screen target
    ///
    /// Returns the lights whose shadow maps were rendered. Failures of single
    /// meshes or lights are logged and never abort the frame.
    pub fn render_scene_to_screen(&mut self, scene: &mut Scene, camera: &Camera, bg_color: [f32; 4]) -> Vec<LightId> {
        self.bind_screen();
        self.gpu.clear(ClearOp::color_and_depth(bg_color));
        self.set_default_flags();

        let processed = self.render_scene_shadowmaps(scene);
        self.render_scene(scene, camera);

        self.set_default_flags();
        processed
    }

    /// Restores depth test on, back-face culling on, blending off
    pub fn set_default_flags(&mut self) -> RenderState {
        self.states.set_default_flags(&mut self.gpu)
    }

    /// Renders the shadow map of every shadow-casting light
    pub fn render_scene_shadowmaps(&mut self, scene: &mut Scene) -> Vec<LightId> {
        self.shadows
            .generate(&mut self.gpu, &mut self.states, &self.forward, scene)
    }

    /// Renders the six cube faces of one point light
    ///
    /// Returns `true` when the light ends up with a valid shadow map.
    pub fn render_point_shadowmap(&mut self, scene: &mut Scene, light: LightId) -> bool {
        match scene.light(light).map(|l| (l.light_type, l.casts_shadow)) {
            Some((LightType::Point, true)) => {}
            Some((LightType::Point, false)) => {
                warn!("Point light {:?} casts no shadow, skipping its cube map", light);
                return false;
            }
            Some((other, _)) => {
                let err = RenderError::invalid_light(
                    &format!("{:?}", light),
                    format!("{:?} light passed to the point shadow pass", other),
                );
                warn!("{}", err);
                return false;
            }
            None => {
                warn!("{}", RenderError::missing(format!("light {:?}", light)));
                return false;
            }
        }

        match self
            .shadows
            .render_light(&mut self.gpu, &mut self.states, &self.forward, scene, light)
        {
            Ok(rendered) => {
                debug!("Point light {:?} shadow map rendered: {}", light, rendered);
                true
            }
            Err(_) => false,
        }
    }

    /// Renders every prefab instance of `scene` with forward lighting
    pub fn render_scene(&mut self, scene: &Scene, camera: &Camera) {
        self.forward.ambient = scene.ambient_light;
        self.active_lights = ActiveLight::from_scene(scene);
        self.stats = FrameStats::default();

        self.shade(camera, |sink| traversal::render_scene(sink, scene));
        debug!("Scene rendered: {:?}", self.stats);
    }

    /// Renders one prefab with the lights captured by the last
    /// [`Renderer::render_scene`] or [`Renderer::set_active_lights`]
    pub fn render_prefab(&mut self, model: &Matrix4<f32>, prefab: &Prefab, camera: &Camera) {
        self.shade(camera, |sink| traversal::render_prefab(sink, model, prefab));
    }

    /// Renders a node subtree whose parent sits at `model`
    pub fn render_node(&mut self, model: &Matrix4<f32>, node: &Node, camera: &Camera) {
        self.shade(camera, |sink| traversal::render_node(sink, model, node));
    }

    /// Replaces the lights used by prefab and node renders
    pub fn set_active_lights(&mut self, scene: &Scene) {
        self.forward.ambient = scene.ambient_light;
        self.active_lights = ActiveLight::from_scene(scene);
    }

    pub fn active_lights(&self) -> &[ActiveLight] {
        &self.active_lights
    }

    fn shade<F>(&mut self, camera: &Camera, walk: F)
    where
        F: FnOnce(&mut ShadingSink<'_, G>),
    {
        let mut deferred = Vec::new();
        {
            let mut sink = ShadingSink {
                gpu: &mut self.gpu,
                states: &mut self.states,
                forward: &self.forward,
                camera,
                lights: &self.active_lights,
                frustum: self.config.frustum_culling.then(|| camera.frustum()),
                deferred: self.config.sort_transparent.then_some(&mut deferred),
                stats: &mut self.stats,
            };
            walk(&mut sink);
        }
        self.flush_deferred(deferred, camera);
    }

    fn flush_deferred(&mut self, mut deferred: Vec<DeferredDraw>, camera: &Camera) {
        if deferred.is_empty() {
            return;
        }
        deferred.sort_by(|a, b| b.distance.total_cmp(&a.distance));
        self.stats.deferred += deferred.len();

        let mut sink = ShadingSink {
            gpu: &mut self.gpu,
            states: &mut self.states,
            forward: &self.forward,
            camera,
            lights: &self.active_lights,
            frustum: None,
            deferred: None,
            stats: &mut self.stats,
        };
        for draw in &deferred {
            sink.draw(&draw.world, &draw.mesh, &draw.material);
        }
    }

    /// Sets culling, blending and depth for one pass over `material`
    pub fn manage_blending_and_culling(
        &mut self,
        material: &Material,
        rendering_light: bool,
        is_first_pass: bool,
    ) -> RenderState {
        self.states
            .apply_state(&mut self.gpu, material, rendering_light, is_first_pass)
    }

    /// Draws one mesh with its base pass plus one pass per active light
    pub fn render_mesh_with_material(
        &mut self,
        model: &Matrix4<f32>,
        mesh: &Mesh,
        material: &Material,
        camera: &Camera,
    ) -> RenderResult<usize> {
        self.forward.render_mesh_with_material(
            &mut self.gpu,
            &mut self.states,
            model,
            mesh,
            material,
            camera,
            &self.active_lights,
        )
    }

    /// Draws one mesh into the currently bound shadow layer
    pub fn render_shadow_map(
        &mut self,
        material: &Material,
        light_camera: &Camera,
        model: &Matrix4<f32>,
        mesh: &Mesh,
    ) -> bool {
        self.forward
            .render_shadow_map(&mut self.gpu, material, light_camera, model, mesh)
    }

    /// Blits every layer of each listed light's shadow map into screen tiles
    ///
    /// Tiles are a quarter of the shorter screen edge, laid out left to right
    /// from the top-left corner. Returns the number of blits issued.
    pub fn show_scene_shadowmaps(&mut self, scene: &Scene, lights: &[LightId]) -> usize {
        self.bind_screen();
        let (width, height) = self.gpu.surface_size();
        let tile = (width.min(height) / 4).max(1);
        let columns = (width / tile).max(1);

        self.states.apply_blit_state(&mut self.gpu);

        let mut slot = 0;
        let mut blits = 0;
        for id in lights {
            let Some(light) = scene.light(*id) else {
                warn!("Cannot show shadow map of unknown light {:?}", id);
                continue;
            };
            let Some(map) = light.shadow_map() else {
                warn!("Light '{}' has no shadow map to show", light.name);
                continue;
            };

            for layer in 0..map.layers() {
                let (x, y) = ((slot % columns) * tile, (slot / columns) * tile);
                slot += 1;
                if y + tile > height {
                    warn!("No room left on screen for shadow map of '{}'", light.name);
                    break;
                }

                self.gpu.set_viewport(Viewport {
                    x,
                    y,
                    width: tile,
                    height: tile,
                });
                match self.gpu.blit_depth(map.target, layer) {
                    Ok(()) => blits += 1,
                    Err(err) => warn!("Shadow map blit for '{}' failed: {}", light.name, err),
                }
            }
        }

        self.gpu.set_viewport(Viewport::full(width, height));
        self.set_default_flags();
        blits
    }

    fn bind_screen(&mut self) {
        if let Err(err) = self.gpu.bind_target(RenderTarget::Screen) {
            warn!("Failed to bind screen target: {}", err);
        }
        let (width, height) = self.gpu.surface_size();
        self.gpu.set_viewport(Viewport::full(width, height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::geometry::generate_cube;
    use crate::gfx::rendering::gpu::ShaderPass;
    use crate::gfx::rendering::recording::RecordingContext;
    use crate::gfx::resources::material::AlphaMode;
    use cgmath::{Deg, Point3, SquareMatrix, Vector3};

    fn camera() -> Camera {
        Camera::perspective(
            Point3::new(0.0, 3.0, 10.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
            Deg(60.0),
            1.0,
            0.1,
            100.0,
        )
    }

    fn renderer() -> Renderer<RecordingContext> {
        Renderer::new(RecordingContext::new(256, 256), RendererConfig::default())
    }

    #[test]
    fn test_blended_meshes_are_drawn_last_back_to_front() {
        let mut renderer = renderer();
        let mesh = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
        let glass = Arc::new(Material::new("glass").with_alpha_mode(AlphaMode::Blend));
        let stone = Arc::new(Material::new("stone"));

        let root = Node::new("root")
            .with_child(
                Node::new("near_glass")
                    .with_transform(Matrix4::from_translation(Vector3::new(0.0, 0.0, 4.0)))
                    .with_mesh(mesh, glass.clone()),
            )
            .with_child(
                Node::new("far_glass")
                    .with_transform(Matrix4::from_translation(Vector3::new(0.0, 0.0, -4.0)))
                    .with_mesh(mesh, glass),
            )
            .with_child(Node::new("stone").with_mesh(mesh, stone));

        let mut scene = Scene::new();
        scene.add_prefab(Arc::new(Prefab::new("p", root)), Matrix4::identity());
        renderer.render_scene(&scene, &camera());

        let draws = renderer.gpu().draws();
        assert_eq!(draws.len(), 3);
        assert!(!draws[0].state.blending_enabled());
        assert_eq!(draws[1].uniforms.model[3][2], -4.0);
        assert_eq!(draws[2].uniforms.model[3][2], 4.0);
        assert_eq!(renderer.frame_stats().deferred, 2);
    }

    #[test]
    fn test_frustum_culling_skips_offscreen_meshes() {
        let mut renderer = renderer();
        let mesh = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
        let prefab = Arc::new(Prefab::from_mesh("cube", mesh, Arc::new(Material::new("m"))));

        let mut scene = Scene::new();
        scene.add_prefab(prefab.clone(), Matrix4::identity());
        scene.add_prefab(prefab, Matrix4::from_translation(Vector3::new(0.0, 0.0, 50.0)));
        renderer.render_scene(&scene, &camera());

        assert_eq!(renderer.gpu().draws().len(), 1);
        assert_eq!(renderer.frame_stats().culled, 1);
    }

    #[test]
    fn test_failed_mesh_does_not_abort_scene() {
        let mut renderer = renderer();
        let good = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
        let bad = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
        renderer.gpu_mut().remove_mesh(bad.handle);

        let material = Arc::new(Material::new("m"));
        let root = Node::new("root")
            .with_mesh(bad, material.clone())
            .with_child(Node::new("good").with_mesh(good, material));

        let mut scene = Scene::new();
        scene.add_prefab(Arc::new(Prefab::new("p", root)), Matrix4::identity());
        renderer.render_scene_to_screen(&mut scene, &camera(), [0.0, 0.0, 0.0, 1.0]);

        assert_eq!(renderer.frame_stats().failed, 1);
        let draws = renderer.gpu().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].mesh, good.handle);
        assert_eq!(draws[0].pass, ShaderPass::Base);
    }

    #[test]
    fn test_point_shadowmap_rejects_other_light_types() {
        let mut renderer = renderer();
        let mut scene = Scene::new();
        let sun = scene.add_light(Light::directional("sun", -Vector3::unit_y()).with_shadows(true));
        assert!(!renderer.render_point_shadowmap(&mut scene, sun));
        assert_eq!(renderer.gpu().shadow_target_count(), 0);
    }

    #[test]
    fn test_point_shadowmap_skips_non_casters() {
        let mut renderer = renderer();
        let mut scene = Scene::new();
        let lamp = scene.add_light(Light::point("lamp", Point3::new(0.0, 2.0, 0.0), 10.0));

        assert!(!renderer.render_point_shadowmap(&mut scene, lamp));
        assert_eq!(renderer.gpu().shadow_target_count(), 0);
        assert!(renderer.gpu().draws().is_empty());
        assert!(scene.light(lamp).and_then(|l| l.shadow_map()).is_none());

        scene.light_mut(lamp).unwrap().casts_shadow = true;
        assert!(renderer.render_point_shadowmap(&mut scene, lamp));
        assert_eq!(renderer.gpu().shadow_target_count(), 1);
    }
}
