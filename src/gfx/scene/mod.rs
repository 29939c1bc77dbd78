//! # Scene Management Module
//!
//! Scene data consumed by the renderer: prefab node trees, lights and the
//! vertex format.
//!
//! - [`Scene`] - Prefab instances plus lights
//! - [`Prefab`] / [`Node`] - Owned node trees with parent-relative transforms
//! - [`Light`] - Directional, spot and point lights with an owned shadow map
//! - [`Vertex3D`] - Position, normal and texture coordinates

pub mod light;
pub mod node;
pub mod scene;
pub mod vertex;

// Re-export main types
pub use light::{Light, LightId, LightType};
pub use node::{Node, Prefab};
pub use scene::{PrefabInstance, Scene};
pub use vertex::Vertex3D;
