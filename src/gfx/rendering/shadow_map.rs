//! Shadow map generation
//!
//! Each shadow-casting light owns a layered depth target. Directional and spot
//! lights render one layer from a single light camera; point lights render six
//! layers, one per cube face, each through a 90 degree perspective. All of them
//! go through [`ShadowMapGenerator::render_depth_from_view`], which binds a
//! layer, clears it and runs a depth-only traversal of the scene.

use cgmath::{Deg, InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};
use log::{log, warn, Level};
use std::sync::Arc;

use super::config::{RendererConfig, ShadowCulling, ShadowUpdatePolicy};
use super::forward::ForwardLighting;
use super::gpu::{ClearOp, GpuContext, RenderTarget, ShadowTargetHandle, Viewport};
use super::render_state::RenderStateManager;
use super::shadow_cache::{self, LightShadowState, ShadowCacheStats};
use super::traversal::{self, DrawSink};
use crate::gfx::camera::camera_utils::stable_up;
use crate::gfx::camera::{Aabb, Camera, Frustum};
use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;
use crate::gfx::scene::light::{Light, LightId, LightType};
use crate::gfx::scene::Scene;

/// Light-space transforms of a shadow map, one per layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadowProjection {
    /// Directional and spot lights
    Single(Matrix4<f32>),
    /// Point lights, layers ordered as [`CubeFace::ALL`]
    Cube([Matrix4<f32>; 6]),
}

impl ShadowProjection {
    fn placeholder(light_type: LightType) -> Self {
        match light_type {
            LightType::Point => ShadowProjection::Cube([Matrix4::identity(); 6]),
            LightType::Directional | LightType::Spot => ShadowProjection::Single(Matrix4::identity()),
        }
    }

    fn from_cameras(cameras: &[Camera]) -> Option<Self> {
        match cameras {
            [single] => Some(ShadowProjection::Single(single.view_projection())),
            [a, b, c, d, e, f] => Some(ShadowProjection::Cube(
                [a, b, c, d, e, f].map(|camera| camera.view_projection()),
            )),
            _ => None,
        }
    }

    pub fn layers(&self) -> u32 {
        match self {
            ShadowProjection::Single(_) => 1,
            ShadowProjection::Cube(_) => 6,
        }
    }

    pub fn matrices(&self) -> &[Matrix4<f32>] {
        match self {
            ShadowProjection::Single(matrix) => std::slice::from_ref(matrix),
            ShadowProjection::Cube(matrices) => matrices,
        }
    }
}

/// Faces of a point light's cube shadow map, in layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    /// View direction of the face camera
    pub fn direction(self) -> Vector3<f32> {
        match self {
            CubeFace::PositiveX => Vector3::unit_x(),
            CubeFace::NegativeX => -Vector3::unit_x(),
            CubeFace::PositiveY => Vector3::unit_y(),
            CubeFace::NegativeY => -Vector3::unit_y(),
            CubeFace::PositiveZ => Vector3::unit_z(),
            CubeFace::NegativeZ => -Vector3::unit_z(),
        }
    }

    pub fn up(self) -> Vector3<f32> {
        match self {
            CubeFace::PositiveY => Vector3::unit_z(),
            CubeFace::NegativeY => -Vector3::unit_z(),
            _ => -Vector3::unit_y(),
        }
    }

    /// Face containing the point at `offset` from the light, picked by the
    /// dominant axis. `forward.wgsl` makes the same choice when sampling.
    pub fn from_direction(offset: Vector3<f32>) -> CubeFace {
        let a = Vector3::new(offset.x.abs(), offset.y.abs(), offset.z.abs());
        if a.x >= a.y && a.x >= a.z {
            if offset.x > 0.0 {
                CubeFace::PositiveX
            } else {
                CubeFace::NegativeX
            }
        } else if a.y >= a.z {
            if offset.y > 0.0 {
                CubeFace::PositiveY
            } else {
                CubeFace::NegativeY
            }
        } else if offset.z > 0.0 {
            CubeFace::PositiveZ
        } else {
            CubeFace::NegativeZ
        }
    }
}

/// A light's shadow depth target and the transforms it was rendered with
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMap {
    pub target: ShadowTargetHandle,
    /// Fixed for the lifetime of the target
    pub resolution: u32,
    pub projection: ShadowProjection,
    valid: bool,
    pub(crate) rendered_state: Option<LightShadowState>,
    pub(crate) scene_fingerprint: Option<u64>,
}

impl ShadowMap {
    pub fn new(target: ShadowTargetHandle, resolution: u32, light_type: LightType) -> Self {
        Self {
            target,
            resolution,
            projection: ShadowProjection::placeholder(light_type),
            valid: false,
            rendered_state: None,
            scene_fingerprint: None,
        }
    }

    pub fn layers(&self) -> u32 {
        self.projection.layers()
    }

    /// Whether the last render of every layer completed
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    pub(crate) fn mark_rendered(&mut self, state: LightShadowState, fingerprint: Option<u64>) {
        self.valid = true;
        self.rendered_state = Some(state);
        self.scene_fingerprint = fingerprint;
    }

    fn fits(&self, state: &LightShadowState) -> bool {
        self.resolution == state.resolution && self.layers() == state.light_type.shadow_layers()
    }
}

/// Draw counts of one depth sub-pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DepthPassStats {
    pub drawn: usize,
    pub skipped: usize,
    pub culled: usize,
}

/// Depth-only sink: every submitted node is drawn into the bound shadow layer
struct DepthSink<'a, G: GpuContext + ?Sized> {
    gpu: &'a mut G,
    forward: &'a ForwardLighting,
    camera: &'a Camera,
    frustum: Option<Frustum>,
    stats: DepthPassStats,
}

impl<G: GpuContext + ?Sized> DrawSink for DepthSink<'_, G> {
    fn submit(&mut self, world: &Matrix4<f32>, mesh: &Mesh, material: &Arc<Material>) {
        if let Some(frustum) = &self.frustum {
            if !frustum.intersects_aabb(&mesh.bounds.transformed(world)) {
                self.stats.culled += 1;
                return;
            }
        }

        if self
            .forward
            .render_shadow_map(&mut *self.gpu, material, self.camera, world, mesh)
        {
            self.stats.drawn += 1;
        } else {
            self.stats.skipped += 1;
        }
    }
}

/// Renders and caches shadow maps for the lights of a scene
#[derive(Debug, Clone)]
pub struct ShadowMapGenerator {
    culling: ShadowCulling,
    default_resolution: u32,
    update: ShadowUpdatePolicy,
    frustum_culling: bool,
    log_level: Level,
    stats: ShadowCacheStats,
}

impl ShadowMapGenerator {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            culling: config.shadow_culling,
            default_resolution: config.default_shadow_resolution,
            update: config.shadow_update,
            frustum_culling: config.frustum_culling,
            log_level: if config.shadow_debug {
                Level::Info
            } else {
                Level::Debug
            },
            stats: ShadowCacheStats::default(),
        }
    }

    pub fn stats(&self) -> ShadowCacheStats {
        self.stats
    }

    /// Renders shadow maps for every shadow-casting light
    ///
    /// Returns the lights whose map was (re)rendered by this call. Lights whose
    /// configuration is invalid are skipped with a warning and keep lighting
    /// the scene unshadowed. The screen target, full viewport and default
    /// flags are restored afterwards.
    pub fn generate<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        states: &mut RenderStateManager,
        forward: &ForwardLighting,
        scene: &mut Scene,
    ) -> Vec<LightId> {
        let bounds = scene.world_bounds();
        let fingerprint = self.fingerprint(scene);
        let mut rendered = Vec::new();

        for index in 0..scene.lights().len() {
            let light = &scene.lights()[index];
            if !light.casts_shadow {
                continue;
            }
            let id = light.id();

            match self.render_light_at(gpu, states, forward, scene, index, bounds, fingerprint) {
                Ok(true) => rendered.push(id),
                Ok(false) => {}
                Err(err) => self.reject(scene, index, &err),
            }
        }

        log!(self.log_level, "Shadow pass rendered {} light(s): {:?}", rendered.len(), rendered);
        Self::restore_screen(gpu, states);
        rendered
    }

    /// Renders the shadow map of a single light
    ///
    /// Returns `Ok(false)` when the cached map was still current.
    pub fn render_light<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        states: &mut RenderStateManager,
        forward: &ForwardLighting,
        scene: &mut Scene,
        id: LightId,
    ) -> RenderResult<bool> {
        let index = scene
            .light_index(id)
            .ok_or_else(|| RenderError::missing(format!("light {:?}", id)))?;

        let bounds = scene.world_bounds();
        let fingerprint = self.fingerprint(scene);
        let result = self.render_light_at(gpu, states, forward, scene, index, bounds, fingerprint);
        if let Err(err) = &result {
            self.reject(scene, index, err);
        }
        Self::restore_screen(gpu, states);
        result
    }

    fn fingerprint(&self, scene: &Scene) -> Option<u64> {
        match self.update {
            ShadowUpdatePolicy::WhenChanged => Some(shadow_cache::scene_fingerprint(scene)),
            ShadowUpdatePolicy::EveryFrame => None,
        }
    }

    fn reject(&mut self, scene: &mut Scene, index: usize, err: &RenderError) {
        let light = &mut scene.lights_mut()[index];
        warn!("Skipping shadow map for light '{}': {}", light.name, err);
        if let Some(map) = light.shadow.as_mut() {
            map.invalidate();
        }
        self.stats.rejected += 1;
    }

    #[allow(clippy::too_many_arguments)]
    fn render_light_at<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        states: &mut RenderStateManager,
        forward: &ForwardLighting,
        scene: &mut Scene,
        index: usize,
        bounds: Option<Aabb>,
        fingerprint: Option<u64>,
    ) -> RenderResult<bool> {
        let state = {
            let light = &scene.lights()[index];
            light.validate_shadow_config()?;
            let resolution = light.shadow_resolution.unwrap_or(self.default_resolution);
            LightShadowState::from_light(light, resolution)
        };

        let target = self.ensure_target(gpu, &mut scene.lights_mut()[index], &state)?;

        if self.update == ShadowUpdatePolicy::WhenChanged {
            if let Some(map) = scene.lights()[index].shadow_map() {
                if !shadow_cache::needs_update(map, &state, fingerprint) {
                    self.stats.reused += 1;
                    return Ok(false);
                }
            }
        }

        if let Some(map) = scene.lights_mut()[index].shadow.as_mut() {
            map.invalidate();
        }

        let cameras = Self::light_cameras(&scene.lights()[index], bounds);
        let projection = ShadowProjection::from_cameras(&cameras)
            .ok_or_else(|| RenderError::StateCorruption(format!("{} shadow cameras", cameras.len())))?;

        for (layer, camera) in cameras.iter().enumerate() {
            let pass = self.render_depth_from_view(
                gpu,
                states,
                forward,
                scene,
                RenderTarget::Shadow {
                    target,
                    layer: layer as u32,
                },
                state.resolution,
                camera,
            )?;
            log!(
                self.log_level,
                "Shadow layer {} of '{}': {} drawn, {} skipped, {} culled",
                layer,
                scene.lights()[index].name,
                pass.drawn,
                pass.skipped,
                pass.culled
            );
        }

        let map = scene.lights_mut()[index]
            .shadow
            .as_mut()
            .ok_or_else(|| RenderError::missing("shadow map released during rendering"))?;
        map.projection = projection;
        map.mark_rendered(state, fingerprint);
        self.stats.rendered += 1;
        Ok(true)
    }

    /// Allocates the light's depth target, or reuses it when resolution and
    /// layer count still match
    fn ensure_target<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        light: &mut Light,
        state: &LightShadowState,
    ) -> RenderResult<ShadowTargetHandle> {
        if let Some(map) = &light.shadow {
            if map.fits(state) {
                return Ok(map.target);
            }
            gpu.destroy_shadow_target(map.target);
            light.shadow = None;
            self.stats.reallocated += 1;
        }

        let layers = state.light_type.shadow_layers();
        let target = gpu.create_shadow_target(state.resolution, layers)?;
        log!(
            self.log_level,
            "Allocated {}x{} shadow target with {} layer(s) for '{}'",
            state.resolution,
            state.resolution,
            layers,
            light.name
        );
        light.shadow = Some(ShadowMap::new(target, state.resolution, state.light_type));
        self.stats.allocated += 1;
        Ok(target)
    }

    /// Renders scene depth as seen by `camera` into one shadow layer
    ///
    /// # Arguments
    /// * `target` - Shadow layer to bind; it is cleared to the far plane first
    /// * `resolution` - Edge length of the square viewport
    /// * `camera` - Light view used for every draw
    #[allow(clippy::too_many_arguments)]
    pub fn render_depth_from_view<G: GpuContext + ?Sized>(
        &self,
        gpu: &mut G,
        states: &mut RenderStateManager,
        forward: &ForwardLighting,
        scene: &Scene,
        target: RenderTarget,
        resolution: u32,
        camera: &Camera,
    ) -> RenderResult<DepthPassStats> {
        gpu.bind_target(target)?;
        gpu.set_viewport(Viewport::full(resolution, resolution));
        gpu.clear(ClearOp::depth(1.0));
        states.apply_shadow_state(gpu, self.culling);

        let mut sink = DepthSink {
            gpu,
            forward,
            camera,
            frustum: self.frustum_culling.then(|| camera.frustum()),
            stats: DepthPassStats::default(),
        };
        traversal::render_scene(&mut sink, scene);
        Ok(sink.stats)
    }

    /// Light cameras in layer order: one for directional and spot lights, six
    /// for point lights
    pub fn light_cameras(light: &Light, scene_bounds: Option<Aabb>) -> Vec<Camera> {
        match light.light_type {
            LightType::Directional => {
                let direction = light.direction.normalize();
                let bounds = scene_bounds.unwrap_or_else(|| {
                    Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0))
                });
                let center = bounds.center();
                let radius = bounds.radius().max(0.5);
                let eye = center - direction * (radius * 2.0);
                vec![Camera::orthographic(
                    eye,
                    center,
                    stable_up(direction),
                    radius,
                    radius,
                    0.0,
                    radius * 4.0,
                )]
            }
            LightType::Spot => {
                let direction = light.direction.normalize();
                vec![Camera::perspective(
                    light.position,
                    light.position + direction,
                    stable_up(direction),
                    Deg(light.cone_angle.0 * 2.0),
                    1.0,
                    Self::near_plane(light.range),
                    light.range,
                )]
            }
            LightType::Point => CubeFace::ALL
                .iter()
                .map(|face| {
                    Camera::perspective(
                        light.position,
                        light.position + face.direction(),
                        face.up(),
                        Deg(90.0),
                        1.0,
                        Self::near_plane(light.range),
                        light.range,
                    )
                })
                .collect(),
        }
    }

    fn near_plane(range: f32) -> f32 {
        (range * 0.01).max(1e-3).min(range * 0.5)
    }

    /// Frees the light's shadow target
    pub fn release<G: GpuContext + ?Sized>(gpu: &mut G, light: &mut Light) {
        if let Some(map) = light.take_shadow_map() {
            gpu.destroy_shadow_target(map.target);
        }
    }

    fn restore_screen<G: GpuContext + ?Sized>(gpu: &mut G, states: &mut RenderStateManager) {
        if let Err(err) = gpu.bind_target(RenderTarget::Screen) {
            warn!("Failed to rebind screen after shadow pass: {}", err);
        }
        let (width, height) = gpu.surface_size();
        gpu.set_viewport(Viewport::full(width, height));
        states.set_default_flags(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Transform, Vector4};

    #[test]
    fn test_cube_face_selection() {
        assert_eq!(CubeFace::from_direction(Vector3::new(3.0, 1.0, -2.0)), CubeFace::PositiveX);
        assert_eq!(CubeFace::from_direction(Vector3::new(-3.0, 1.0, 2.0)), CubeFace::NegativeX);
        assert_eq!(CubeFace::from_direction(Vector3::new(0.1, 2.0, 1.0)), CubeFace::PositiveY);
        assert_eq!(CubeFace::from_direction(Vector3::new(0.1, -2.0, 1.0)), CubeFace::NegativeY);
        assert_eq!(CubeFace::from_direction(Vector3::new(0.1, 0.2, 1.0)), CubeFace::PositiveZ);
        assert_eq!(CubeFace::from_direction(Vector3::new(0.1, 0.2, -1.0)), CubeFace::NegativeZ);
    }

    #[test]
    fn test_selected_face_contains_point() {
        let light = Light::point("bulb", Point3::new(1.0, 2.0, 3.0), 20.0);
        let cameras = ShadowMapGenerator::light_cameras(&light, None);
        assert_eq!(cameras.len(), 6);

        let offsets = [
            Vector3::new(4.0, 1.0, -1.5),
            Vector3::new(-2.0, 0.5, 0.5),
            Vector3::new(0.3, 5.0, -2.0),
            Vector3::new(1.0, -3.0, 0.2),
            Vector3::new(-1.0, 1.0, 6.0),
            Vector3::new(0.5, -0.5, -2.0),
        ];
        for offset in offsets {
            let face = CubeFace::from_direction(offset);
            let clip = cameras[face.layer() as usize].view_projection()
                * (light.position + offset).to_homogeneous();
            let ndc = clip.truncate() / clip.w;
            assert!(clip.w > 0.0, "{:?} behind face {:?}", offset, face);
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "{:?} outside {:?}", offset, face);
            assert!((0.0..=1.0).contains(&ndc.z));
        }
    }

    #[test]
    fn test_point_faces_use_90_degree_projection() {
        let light = Light::point("bulb", Point3::new(0.0, 0.0, 0.0), 10.0);
        for camera in ShadowMapGenerator::light_cameras(&light, None) {
            // cot(45 degrees) on both axes with aspect 1
            assert!((camera.projection.x.x - 1.0).abs() < 1e-5);
            assert!((camera.projection.y.y - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_directional_view_covers_scene_bounds() {
        let light = Light::directional("sun", Vector3::new(-1.0, -2.0, -0.5));
        let bounds = Aabb::new(Point3::new(-4.0, 0.0, -4.0), Point3::new(4.0, 2.0, 4.0));
        let cameras = ShadowMapGenerator::light_cameras(&light, Some(bounds));
        assert_eq!(cameras.len(), 1);

        let vp = cameras[0].view_projection();
        for corner in bounds.corners() {
            let clip: Vector4<f32> = vp * corner.to_homogeneous();
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-4 && ndc.y.abs() <= 1.0 + 1e-4);
            assert!((0.0..=1.0).contains(&ndc.z), "depth {} out of range", ndc.z);
        }
    }

    #[test]
    fn test_spot_view_uses_cone() {
        let light = Light::spot(
            "torch",
            Point3::new(0.0, 5.0, 0.0),
            -Vector3::unit_y(),
            Deg(30.0),
        )
        .with_range(12.0);
        let cameras = ShadowMapGenerator::light_cameras(&light, None);
        assert_eq!(cameras.len(), 1);

        // 60 degree fov
        let expected = 1.0 / (30.0f32.to_radians()).tan();
        assert!((cameras[0].projection.y.y - expected).abs() < 1e-4);

        let below = cameras[0]
            .view_projection()
            .transform_point(Point3::new(0.0, 0.0, 0.0));
        assert!(below.x.abs() < 1e-4 && below.y.abs() < 1e-4);
    }

    #[test]
    fn test_projection_layers() {
        let single = ShadowProjection::placeholder(LightType::Spot);
        assert_eq!(single.layers(), 1);
        assert_eq!(single.matrices().len(), 1);

        let cube = ShadowProjection::placeholder(LightType::Point);
        assert_eq!(cube.layers(), 6);
        assert_eq!(cube.matrices().len(), 6);
    }
}
