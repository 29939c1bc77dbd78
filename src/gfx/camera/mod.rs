//! Camera input and view-volume helpers
//!
//! Cameras are read-only inputs to the renderer. Window-driven camera control is
//! left to the application.

pub mod camera_utils;
pub mod frustum;

// Re-export main types
pub use camera_utils::{convert_matrix4_to_array, Camera, OPENGL_TO_WGPU_MATRIX};
pub use frustum::{Aabb, Frustum};
