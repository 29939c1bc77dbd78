//! Command-recording GPU context
//!
//! [`RecordingContext`] implements [`GpuContext`] without a device. It keeps
//! the same bookkeeping a real backend needs (resource tables, bound state)
//! and logs every command, so tests can assert on draw counts, the state each
//! draw saw and what each target contains after a frame.

use std::collections::{HashMap, HashSet};

use super::gpu::{
    rgba_byte_len, ClearOp, GpuContext, MeshHandle, RenderTarget, ShaderPass, ShadowTargetHandle,
    TextureHandle, Viewport,
};
use super::render_state::RenderState;
use super::uniforms::DrawUniforms;
use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::resources::material::DEFAULT_SHADER;
use crate::gfx::scene::vertex::Vertex3D;

/// Everything a draw depended on at submission time
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub mesh: MeshHandle,
    pub target: RenderTarget,
    pub viewport: Viewport,
    pub state: RenderState,
    pub pass: ShaderPass,
    pub program: String,
    pub texture: Option<TextureHandle>,
    pub shadow_map: Option<ShadowTargetHandle>,
    pub uniforms: DrawUniforms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlitRecord {
    pub source: ShadowTargetHandle,
    pub layer: u32,
    pub target: RenderTarget,
    pub viewport: Viewport,
    pub state: RenderState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginFrame,
    EndFrame,
    CreateShadowTarget {
        target: ShadowTargetHandle,
        resolution: u32,
        layers: u32,
    },
    DestroyShadowTarget(ShadowTargetHandle),
    BindTarget(RenderTarget),
    SetViewport(Viewport),
    Clear(ClearOp),
    SetRenderState(RenderState),
    BindShader { program: String, pass: ShaderPass },
    BindTexture(Option<TextureHandle>),
    BindShadowMap(Option<ShadowTargetHandle>),
    Draw(DrawRecord),
    Blit(BlitRecord),
}

#[derive(Debug, Clone, Copy)]
struct ShadowTargetInfo {
    resolution: u32,
    layers: u32,
}

#[derive(Debug, Clone)]
struct BoundShader {
    program: String,
    pass: ShaderPass,
    uniforms: DrawUniforms,
}

/// Headless [`GpuContext`] that records commands instead of executing them
#[derive(Debug)]
pub struct RecordingContext {
    size: (u32, u32),
    next_id: u64,
    meshes: HashMap<MeshHandle, usize>,
    textures: HashSet<TextureHandle>,
    shadow_targets: HashMap<ShadowTargetHandle, ShadowTargetInfo>,
    programs: HashSet<String>,
    fail_shadow_targets: bool,

    target: RenderTarget,
    viewport: Viewport,
    state: RenderState,
    shader: Option<BoundShader>,
    texture: Option<TextureHandle>,
    shadow_map: Option<ShadowTargetHandle>,

    commands: Vec<GpuCommand>,
}

impl RecordingContext {
    /// Creates a context with a `width` x `height` screen and the default
    /// shader program registered
    pub fn new(width: u32, height: u32) -> Self {
        let mut programs = HashSet::new();
        programs.insert(DEFAULT_SHADER.to_string());

        Self {
            size: (width, height),
            next_id: 1,
            meshes: HashMap::new(),
            textures: HashSet::new(),
            shadow_targets: HashMap::new(),
            programs,
            fail_shadow_targets: false,
            target: RenderTarget::Screen,
            viewport: Viewport::full(width, height),
            state: RenderState::DEFAULT,
            shader: None,
            texture: None,
            shadow_map: None,
            commands: Vec::new(),
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Draw(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn blits(&self) -> Vec<BlitRecord> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Blit(blit) => Some(blit.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every render state pushed, in order
    pub fn state_changes(&self) -> Vec<RenderState> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::SetRenderState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn current_state(&self) -> RenderState {
        self.state
    }

    pub fn current_target(&self) -> RenderTarget {
        self.target
    }

    pub fn current_viewport(&self) -> Viewport {
        self.viewport
    }

    /// Draws that landed in `target` since it was last cleared
    pub fn target_contents(&self, target: RenderTarget) -> Vec<DrawRecord> {
        let mut bound = RenderTarget::Screen;
        let mut contents = Vec::new();

        for command in &self.commands {
            match command {
                GpuCommand::BindTarget(next) => bound = *next,
                GpuCommand::Clear(_) if bound == target => contents.clear(),
                GpuCommand::Draw(draw) if draw.target == target => contents.push(draw.clone()),
                _ => {}
            }
        }
        contents
    }

    pub fn shadow_target_count(&self) -> usize {
        self.shadow_targets.len()
    }

    pub fn has_shadow_target(&self, target: ShadowTargetHandle) -> bool {
        self.shadow_targets.contains_key(&target)
    }

    pub fn register_program(&mut self, name: &str) {
        self.programs.insert(name.to_string());
    }

    pub fn remove_program(&mut self, name: &str) {
        self.programs.remove(name);
    }

    /// Forgets a mesh so later draws of it fail
    pub fn remove_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
    }

    /// Makes every following shadow target allocation fail
    pub fn set_fail_shadow_targets(&mut self, fail: bool) {
        self.fail_shadow_targets = fail;
    }
}

impl GpuContext for RecordingContext {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.commands.push(GpuCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }

    fn upload_mesh(&mut self, vertices: &[Vertex3D], indices: &[u32]) -> RenderResult<MeshHandle> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::missing("empty mesh upload"));
        }
        let handle = MeshHandle(self.next_handle());
        self.meshes.insert(handle, indices.len());
        Ok(handle)
    }

    fn upload_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> RenderResult<TextureHandle> {
        if rgba_byte_len(width, height) != Some(rgba.len()) {
            return Err(RenderError::missing(format!(
                "{} bytes of pixel data for a {}x{} texture",
                rgba.len(),
                width,
                height
            )));
        }
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle);
        Ok(handle)
    }

    fn create_shadow_target(&mut self, resolution: u32, layers: u32) -> RenderResult<ShadowTargetHandle> {
        if self.fail_shadow_targets || resolution == 0 || layers == 0 {
            return Err(RenderError::missing(format!(
                "shadow target {}x{} with {} layer(s)",
                resolution, resolution, layers
            )));
        }
        let target = ShadowTargetHandle(self.next_handle());
        self.shadow_targets.insert(target, ShadowTargetInfo { resolution, layers });
        self.commands.push(GpuCommand::CreateShadowTarget {
            target,
            resolution,
            layers,
        });
        Ok(target)
    }

    fn destroy_shadow_target(&mut self, target: ShadowTargetHandle) {
        self.shadow_targets.remove(&target);
        if self.shadow_map == Some(target) {
            self.shadow_map = None;
        }
        self.commands.push(GpuCommand::DestroyShadowTarget(target));
    }

    fn bind_target(&mut self, target: RenderTarget) -> RenderResult<()> {
        if let RenderTarget::Shadow { target: handle, layer } = target {
            let info = self
                .shadow_targets
                .get(&handle)
                .ok_or_else(|| RenderError::missing(format!("shadow target {:?}", handle)))?;
            if layer >= info.layers {
                return Err(RenderError::missing(format!(
                    "layer {} of {:?} ({} layers, {}px)",
                    layer, handle, info.layers, info.resolution
                )));
            }
        }
        self.target = target;
        self.commands.push(GpuCommand::BindTarget(target));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(GpuCommand::SetViewport(viewport));
    }

    fn clear(&mut self, clear: ClearOp) {
        self.commands.push(GpuCommand::Clear(clear));
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
        self.commands.push(GpuCommand::SetRenderState(*state));
    }

    fn bind_shader(&mut self, program: &str, pass: ShaderPass, uniforms: &DrawUniforms) -> RenderResult<()> {
        if !self.programs.contains(program) {
            return Err(RenderError::missing(format!("shader program '{}'", program)));
        }
        self.shader = Some(BoundShader {
            program: program.to_string(),
            pass,
            uniforms: *uniforms,
        });
        self.commands.push(GpuCommand::BindShader {
            program: program.to_string(),
            pass,
        });
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> RenderResult<()> {
        if let Some(handle) = texture {
            if !self.textures.contains(&handle) {
                return Err(RenderError::missing(format!("texture {:?}", handle)));
            }
        }
        self.texture = texture;
        self.commands.push(GpuCommand::BindTexture(texture));
        Ok(())
    }

    fn bind_shadow_map(&mut self, shadow: Option<ShadowTargetHandle>) -> RenderResult<()> {
        if let Some(handle) = shadow {
            if !self.shadow_targets.contains_key(&handle) {
                return Err(RenderError::missing(format!("shadow target {:?}", handle)));
            }
        }
        self.shadow_map = shadow;
        self.commands.push(GpuCommand::BindShadowMap(shadow));
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()> {
        if !self.meshes.contains_key(&mesh) {
            return Err(RenderError::missing(format!("mesh {:?}", mesh)));
        }
        let shader = self
            .shader
            .clone()
            .ok_or_else(|| RenderError::StateCorruption("draw without a bound shader".into()))?;

        let depth_target = matches!(self.target, RenderTarget::Shadow { .. });
        if depth_target != (shader.pass == ShaderPass::Depth) {
            return Err(RenderError::StateCorruption(format!(
                "{:?} pass drawn into {:?}",
                shader.pass, self.target
            )));
        }

        self.commands.push(GpuCommand::Draw(DrawRecord {
            mesh,
            target: self.target,
            viewport: self.viewport,
            state: self.state,
            pass: shader.pass,
            program: shader.program,
            texture: self.texture,
            shadow_map: self.shadow_map,
            uniforms: shader.uniforms,
        }));
        Ok(())
    }

    fn blit_depth(&mut self, source: ShadowTargetHandle, layer: u32) -> RenderResult<()> {
        let info = self
            .shadow_targets
            .get(&source)
            .ok_or_else(|| RenderError::missing(format!("shadow target {:?}", source)))?;
        if layer >= info.layers {
            return Err(RenderError::missing(format!("layer {} of {:?}", layer, source)));
        }
        if self.target != RenderTarget::Screen {
            return Err(RenderError::StateCorruption(format!("blit into {:?}", self.target)));
        }

        self.commands.push(GpuCommand::Blit(BlitRecord {
            source,
            layer,
            target: self.target,
            viewport: self.viewport,
            state: self.state,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::camera::Camera;
    use cgmath::{Matrix4, SquareMatrix};

    fn uniforms() -> DrawUniforms {
        DrawUniforms::for_view(
            &Matrix4::identity(),
            &Camera::new(Matrix4::identity(), Matrix4::identity(), cgmath::Point3::new(0.0, 0.0, 0.0)),
        )
    }

    fn triangle(gpu: &mut RecordingContext) -> MeshHandle {
        let v = Vertex3D {
            position: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            tex_coords: [0.0; 2],
        };
        gpu.upload_mesh(&[v, v, v], &[0, 1, 2]).unwrap()
    }

    #[test]
    fn test_draw_without_shader_is_state_corruption() {
        let mut gpu = RecordingContext::new(8, 8);
        let mesh = triangle(&mut gpu);
        assert!(matches!(gpu.draw_mesh(mesh), Err(RenderError::StateCorruption(_))));
    }

    #[test]
    fn test_unknown_resources_are_unavailable() {
        let mut gpu = RecordingContext::new(8, 8);
        assert!(matches!(
            gpu.bind_shader("nope", ShaderPass::Base, &uniforms()),
            Err(RenderError::ResourceUnavailable(_))
        ));
        assert!(gpu.bind_texture(Some(TextureHandle(42))).is_err());
        assert!(gpu
            .bind_target(RenderTarget::Shadow {
                target: ShadowTargetHandle(42),
                layer: 0
            })
            .is_err());

        let target = gpu.create_shadow_target(64, 1).unwrap();
        assert!(gpu.bind_target(RenderTarget::Shadow { target, layer: 1 }).is_err());
    }

    #[test]
    fn test_target_contents_reset_on_clear() {
        let mut gpu = RecordingContext::new(8, 8);
        let mesh = triangle(&mut gpu);
        gpu.bind_shader(DEFAULT_SHADER, ShaderPass::Base, &uniforms()).unwrap();

        gpu.draw_mesh(mesh).unwrap();
        assert_eq!(gpu.target_contents(RenderTarget::Screen).len(), 1);

        gpu.clear(ClearOp::color_and_depth([0.0; 4]));
        gpu.draw_mesh(mesh).unwrap();
        gpu.draw_mesh(mesh).unwrap();
        assert_eq!(gpu.target_contents(RenderTarget::Screen).len(), 2);
        assert_eq!(gpu.draws().len(), 3);
    }

    #[test]
    fn test_shading_pass_into_shadow_target_is_rejected() {
        let mut gpu = RecordingContext::new(8, 8);
        let mesh = triangle(&mut gpu);
        let target = gpu.create_shadow_target(64, 6).unwrap();
        gpu.bind_target(RenderTarget::Shadow { target, layer: 5 }).unwrap();

        gpu.bind_shader(DEFAULT_SHADER, ShaderPass::Base, &uniforms()).unwrap();
        assert!(gpu.draw_mesh(mesh).is_err());

        gpu.bind_shader(DEFAULT_SHADER, ShaderPass::Depth, &uniforms()).unwrap();
        assert!(gpu.draw_mesh(mesh).is_ok());
        assert!(gpu.blit_depth(target, 0).is_err());
    }

    #[test]
    fn test_oversized_texture_upload_is_unavailable() {
        let mut gpu = RecordingContext::new(8, 8);
        assert!(matches!(
            gpu.upload_texture(&[0u8; 4], 65536, 65536),
            Err(RenderError::ResourceUnavailable(_))
        ));
        assert!(matches!(
            gpu.upload_texture(&[0u8; 4], u32::MAX, 2),
            Err(RenderError::ResourceUnavailable(_))
        ));
        assert!(gpu.upload_texture(&[255u8; 16], 2, 2).is_ok());
    }
}
