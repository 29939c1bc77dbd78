//! # Graphics Module
//!
//! Render core of the scene viewer: cameras, scene data, resources and the
//! multi-pass forward renderer with per-light shadow maps.
//!
//! ## Architecture Overview
//!
//! - **Camera** ([`camera`]) - Read-only view inputs, frustum and bounds helpers
//! - **Scene** ([`scene`]) - Prefab node trees and lights
//! - **Resources** ([`resources`]) - Materials, mesh handles and GPU textures
//! - **Rendering** ([`rendering`]) - Shadow generation, forward lighting and
//!   the frame orchestrator
//! - **Geometry** ([`geometry`]) - Procedural primitives for building scenes
//!
//! ## Usage
//!
//! ```no_run
//! use umbra::gfx::rendering::{RecordingContext, Renderer, RendererConfig};
//! use umbra::gfx::scene::Scene;
//!
//! let mut renderer = Renderer::new(RecordingContext::new(800, 600), RendererConfig::default());
//! let mut scene = Scene::new();
//! // add prefabs and lights, then once per frame:
//! // renderer.render_scene_to_screen(&mut scene, &camera, [0.1, 0.1, 0.1, 1.0]);
//! ```

pub mod camera;
pub mod error;
pub mod geometry;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::{Aabb, Camera, Frustum};
pub use error::{RenderError, RenderResult};
pub use rendering::{Renderer, RendererConfig};
