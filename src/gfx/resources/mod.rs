// src/gfx/resources/mod.rs
//! Materials, meshes and GPU textures

pub mod material;
pub mod mesh;
pub mod texture_resource;

// Re-export main types
pub use material::{AlphaMode, Material, DEFAULT_SHADER};
pub use mesh::Mesh;
pub use texture_resource::TextureResource;
