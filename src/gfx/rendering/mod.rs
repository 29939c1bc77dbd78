// src/gfx/rendering/mod.rs
//! Core rendering functionality
//!
//! Forward lighting with shadow mapping on top of a thin [`GpuContext`]:
//! - [`Renderer`] orchestrates frames, shadow generation and diagnostics
//! - [`ShadowMapGenerator`] renders depth from every shadow-casting light
//! - [`ForwardLighting`] issues the base pass and one additive pass per light
//! - [`RenderStateManager`] owns depth, cull and blend state
//! - [`WgpuContext`] and [`RecordingContext`] implement the GPU layer

pub mod config;
pub mod forward;
pub mod gpu;
pub mod pipeline_manager;
pub mod recording;
pub mod render_state;
pub mod renderer;
pub mod shadow_cache;
pub mod shadow_map;
pub mod traversal;
pub mod uniforms;
pub mod wgpu_context;

// Re-export main types
pub use config::{RendererConfig, ShadowCulling, ShadowUpdatePolicy};
pub use forward::{ActiveLight, ForwardLighting, ShadowBinding};
pub use gpu::{ClearOp, GpuContext, MeshHandle, RenderTarget, ShaderPass, ShadowTargetHandle, TextureHandle, Viewport};
pub use pipeline_manager::{PipelineManager, PipelineStats};
pub use recording::{BlitRecord, DrawRecord, GpuCommand, RecordingContext};
pub use render_state::{BlendMode, CullMode, DepthFunc, RenderState, RenderStateManager};
pub use renderer::{FrameStats, Renderer};
pub use shadow_cache::{LightShadowState, ShadowCacheStats};
pub use shadow_map::{CubeFace, DepthPassStats, ShadowMap, ShadowMapGenerator, ShadowProjection};
pub use traversal::{BoundsSink, DrawSink};
pub use uniforms::DrawUniforms;
pub use wgpu_context::WgpuContext;
