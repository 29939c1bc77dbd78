//! Material definitions
//!
//! Materials are shared, immutable shading parameters. Nodes hold them behind
//! an `Arc`, so a material cannot change while a frame reads it across passes.

use crate::gfx::rendering::gpu::TextureHandle;

/// Shader program every material uses unless told otherwise
pub const DEFAULT_SHADER: &str = "forward";

/// How a material's colour combines with what is already in the framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Standard alpha blending; drawn after all opaque geometry
    Blend,
}

/// Shading parameters for a mesh
///
/// Only `alpha_mode` and `two_sided` influence pipeline state; the rest is
/// forwarded to the shader.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub texture: Option<TextureHandle>,
    pub alpha_mode: AlphaMode,
    pub two_sided: bool,
    /// Name of the shader program drawing this material
    pub shader: String,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            base_color: [0.8, 0.8, 0.8, 1.0],
            texture: None,
            alpha_mode: AlphaMode::Opaque,
            two_sided: false,
            shader: DEFAULT_SHADER.to_string(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: Set base color from RGB values
    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.base_color = [r, g, b, self.base_color[3]];
        self
    }

    /// Builder pattern: Set alpha transparency
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.base_color[3] = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_alpha_mode(mut self, mode: AlphaMode) -> Self {
        self.alpha_mode = mode;
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_shader(mut self, shader: &str) -> Self {
        self.shader = shader.to_string();
        self
    }

    pub fn is_blended(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_builder() {
        let material = Material::new("glass")
            .with_color(0.2, 0.4, 0.6)
            .with_alpha(1.5)
            .with_alpha_mode(AlphaMode::Blend)
            .with_two_sided(true);

        assert_eq!(material.base_color, [0.2, 0.4, 0.6, 1.0]);
        assert!(material.is_blended());
        assert!(material.two_sided);
        assert_eq!(material.shader, DEFAULT_SHADER);
        assert!(material.texture.is_none());
    }
}
