//! GPU context abstraction
//!
//! The render core never talks to wgpu directly. Every command it issues goes
//! through [`GpuContext`], which is implemented by the wgpu backend
//! ([`super::wgpu_context::WgpuContext`]) and by a command-recording test double
//! ([`super::recording::RecordingContext`]).
//!
//! The trait mirrors the thin platform layer the renderer expects: framebuffer
//! bind and clear, viewport, pipeline state, shader and texture binds, draw
//! submission and a depth blit for diagnostics.

use crate::gfx::error::RenderResult;
use crate::gfx::rendering::render_state::RenderState;
use crate::gfx::rendering::uniforms::DrawUniforms;
use crate::gfx::scene::light::LightType;
use crate::gfx::scene::vertex::Vertex3D;

/// GPU-resident geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u64);

/// Sampled colour texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Layered depth target used for shadow maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowTargetHandle(pub(crate) u64);

/// Where subsequent clears and draws land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The presentable colour buffer and its depth buffer
    Screen,
    /// One layer of a shadow depth target
    Shadow {
        target: ShadowTargetHandle,
        layer: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Buffers to clear on the bound target; `None` leaves the buffer untouched
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearOp {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl ClearOp {
    pub fn color_and_depth(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }

    pub fn depth(depth: f32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
        }
    }
}

/// Shader variant selected for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPass {
    /// Material colour with ambient only, no light contribution
    Base,
    /// One light's contribution, specialised on the light type
    Light(LightType),
    /// Depth-only rendering from a light's view
    Depth,
    /// Screen-space depth visualisation, selected by [`GpuContext::blit_depth`]
    Blit,
}

/// Byte length of a tightly packed RGBA8 image, `None` when it overflows
pub fn rgba_byte_len(width: u32, height: u32) -> Option<usize> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .map(|n| n as usize)
}

/// Thin platform layer consumed by the renderer.
///
/// State set through this trait (target, viewport, render state, bound shader
/// and textures) persists until it is set again, the way GL state does. The
/// renderer re-asserts everything a pass depends on before drawing.
pub trait GpuContext {
    /// Current presentable surface size in pixels
    fn surface_size(&self) -> (u32, u32);

    fn begin_frame(&mut self) -> RenderResult<()>;

    /// Submits all recorded work and presents the frame
    fn end_frame(&mut self) -> RenderResult<()>;

    fn upload_mesh(&mut self, vertices: &[Vertex3D], indices: &[u32]) -> RenderResult<MeshHandle>;

    /// Uploads tightly packed RGBA8 pixels
    fn upload_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> RenderResult<TextureHandle>;

    /// Allocates a square depth target with `layers` array layers
    fn create_shadow_target(&mut self, resolution: u32, layers: u32) -> RenderResult<ShadowTargetHandle>;

    fn destroy_shadow_target(&mut self, target: ShadowTargetHandle);

    fn bind_target(&mut self, target: RenderTarget) -> RenderResult<()>;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Clears the whole bound target
    fn clear(&mut self, clear: ClearOp);

    fn set_render_state(&mut self, state: &RenderState);

    /// Binds a shader program variant together with its per-draw uniforms
    fn bind_shader(&mut self, program: &str, pass: ShaderPass, uniforms: &DrawUniforms) -> RenderResult<()>;

    /// Binds the material colour texture, or a white texture for `None`
    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> RenderResult<()>;

    /// Binds a shadow target for sampling, or an empty one for `None`
    fn bind_shadow_map(&mut self, shadow: Option<ShadowTargetHandle>) -> RenderResult<()>;

    /// Draws a mesh with the currently bound shader and state
    fn draw_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()>;

    /// Draws one layer of a depth target as greyscale into the current viewport
    fn blit_depth(&mut self, source: ShadowTargetHandle, layer: u32) -> RenderResult<()>;
}
