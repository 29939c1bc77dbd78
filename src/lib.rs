// src/lib.rs
//! Umbra
//!
//! A multi-pass forward renderer with per-light shadow maps, built on wgpu.
//! Directional and spot lights render into a single depth map, point lights
//! into six cube faces. Every light adds one blended lighting pass on top of
//! an ambient base pass.

pub mod gfx;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use gfx::error::{RenderError, RenderResult};
pub use gfx::rendering::{GpuContext, RecordingContext, Renderer, RendererConfig, WgpuContext};

/// Installs the `env_logger` backend, reading `RUST_LOG` and defaulting to `info`
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
