//! Render pipeline management system for wgpu
//!
//! wgpu bakes depth, cull and blend state into pipelines, so every distinct
//! [`RenderState`] a pass asks for maps to its own pipeline. Pipelines are
//! created lazily the first time a (program, pass, state, target) combination
//! is drawn and cached from then on.

use std::{collections::HashMap, sync::Arc};
use wgpu::*;

use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::rendering::gpu::ShaderPass;
use crate::gfx::rendering::render_state::{BlendMode, CullMode, DepthFunc, RenderState};
use crate::gfx::resources::texture_resource::TextureResource;
use crate::gfx::scene::vertex::Vertex3D;

/// Layout names registered by the wgpu backend
pub const DRAW_LAYOUT: &str = "draw";
pub const MATERIAL_LAYOUT: &str = "material";
pub const SHADOW_LAYOUT: &str = "shadow";
pub const BLIT_LAYOUT: &str = "blit";

/// Shader module used by [`ShaderPass::Blit`]
pub const BLIT_PROGRAM: &str = "blit";

/// Kind of attachment set a pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Colour plus depth
    Screen,
    /// Depth only
    Depth,
}

/// Everything that distinguishes one cached pipeline from another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: String,
    pub pass: ShaderPass,
    pub state: RenderState,
    pub target: TargetKind,
}

impl PipelineKey {
    fn label(&self) -> String {
        format!("{} {:?} {:?}", self.program, self.pass, self.target)
    }

    fn layout_names(&self) -> &'static [&'static str] {
        match self.pass {
            ShaderPass::Blit => &[BLIT_LAYOUT],
            _ => &[DRAW_LAYOUT, MATERIAL_LAYOUT, SHADOW_LAYOUT],
        }
    }

    fn entry_points(&self) -> (&'static str, Option<&'static str>) {
        match self.pass {
            ShaderPass::Base => ("vs_main", Some("fs_base")),
            ShaderPass::Light(_) => ("vs_main", Some("fs_light")),
            ShaderPass::Depth => ("vs_main", None),
            ShaderPass::Blit => ("vs_blit", Some("fs_blit")),
        }
    }
}

fn blend_state(mode: BlendMode) -> BlendState {
    match mode {
        BlendMode::Disabled => BlendState::REPLACE,
        BlendMode::Additive => {
            let add = BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            };
            BlendState {
                color: add,
                alpha: add,
            }
        }
        BlendMode::Alpha => BlendState::ALPHA_BLENDING,
    }
}

fn cull_face(mode: CullMode) -> Option<Face> {
    match mode {
        CullMode::None => None,
        CullMode::Back => Some(Face::Back),
        CullMode::Front => Some(Face::Front),
    }
}

fn depth_compare(state: &RenderState) -> CompareFunction {
    if !state.depth_test {
        return CompareFunction::Always;
    }
    match state.depth_func {
        DepthFunc::Less => CompareFunction::Less,
        DepthFunc::LessEqual => CompareFunction::LessEqual,
        DepthFunc::Equal => CompareFunction::Equal,
        DepthFunc::Always => CompareFunction::Always,
    }
}

/// Manages render pipelines with caching and lazy creation
///
/// Provides efficient pipeline management with features like:
/// - Lazy pipeline creation (only created when first requested)
/// - Shared bind group layout management
/// - Pipeline statistics and debugging
pub struct PipelineManager {
    device: Arc<Device>,
    color_format: TextureFormat,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    shader_modules: HashMap<String, ShaderModule>,
    common_layouts: HashMap<String, BindGroupLayout>,
}

impl PipelineManager {
    /// Creates a new pipeline manager
    ///
    /// # Arguments
    /// * `device` - Shared wgpu device for creating resources
    /// * `color_format` - Format of the screen colour target
    pub fn new(device: Arc<Device>, color_format: TextureFormat) -> Self {
        Self {
            device,
            color_format,
            pipelines: HashMap::new(),
            shader_modules: HashMap::new(),
            common_layouts: HashMap::new(),
        }
    }

    /// Registers a shared bind group layout by name
    pub fn register_bind_group_layout(&mut self, name: &str, layout: BindGroupLayout) {
        self.common_layouts.insert(name.to_string(), layout);
    }

    pub fn get_bind_group_layout(&self, name: &str) -> Option<&BindGroupLayout> {
        self.common_layouts.get(name)
    }

    /// Loads and compiles a shader module, dropping pipelines built from an
    /// earlier version of it
    ///
    /// # Arguments
    /// * `name` - Program name materials refer to
    /// * `source` - WGSL shader source code
    pub fn load_shader(&mut self, name: &str, source: &str) {
        let shader_module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });

        self.shader_modules.insert(name.to_string(), shader_module);
        self.pipelines.retain(|key, _| key.program != name);
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.shader_modules.contains_key(name)
    }

    /// Gets or creates the pipeline for `key`
    pub fn get_pipeline(&mut self, key: &PipelineKey) -> RenderResult<&RenderPipeline> {
        if !self.pipelines.contains_key(key) {
            let pipeline = self.create_pipeline(key)?;
            log::debug!("Created pipeline '{}' for {:?}", key.label(), key.state);
            self.pipelines.insert(key.clone(), pipeline);
        }

        self.pipelines
            .get(key)
            .ok_or_else(|| RenderError::missing(format!("pipeline '{}'", key.label())))
    }

    fn create_pipeline(&self, key: &PipelineKey) -> RenderResult<RenderPipeline> {
        let shader = self
            .shader_modules
            .get(&key.program)
            .ok_or_else(|| RenderError::missing(format!("shader program '{}'", key.program)))?;

        let bind_group_layout_refs = key
            .layout_names()
            .iter()
            .map(|name| {
                self.common_layouts
                    .get(*name)
                    .ok_or_else(|| RenderError::missing(format!("bind group layout '{}'", name)))
            })
            .collect::<RenderResult<Vec<&BindGroupLayout>>>()?;

        let label = key.label();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(&format!("{} Layout", label)),
                bind_group_layouts: &bind_group_layout_refs,
                push_constant_ranges: &[],
            });

        let (vertex_entry, fragment_entry) = key.entry_points();

        let color_targets = [Some(ColorTargetState {
            format: self.color_format,
            blend: Some(blend_state(key.state.blend)),
            write_mask: ColorWrites::ALL,
        })];

        // Depth targets have no colour attachment
        let fragment = match (fragment_entry, key.target) {
            (Some(entry_point), TargetKind::Screen) => Some(FragmentState {
                module: shader,
                entry_point: Some(entry_point),
                targets: &color_targets,
                compilation_options: PipelineCompilationOptions::default(),
            }),
            _ => None,
        };

        // Blit draws a fullscreen triangle from the vertex index
        let vertex_layouts = [Vertex3D::desc()];
        let vertex_buffers: &[VertexBufferLayout] = match key.pass {
            ShaderPass::Blit => &[],
            _ => &vertex_layouts,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: shader,
                    entry_point: Some(vertex_entry),
                    buffers: vertex_buffers,
                    compilation_options: PipelineCompilationOptions::default(),
                },
                fragment,
                primitive: PrimitiveState {
                    topology: PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: FrontFace::Ccw,
                    cull_mode: cull_face(key.state.cull),
                    polygon_mode: PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(DepthStencilState {
                    format: TextureResource::DEPTH_FORMAT,
                    depth_write_enabled: key.state.depth_test && key.state.depth_write,
                    depth_compare: depth_compare(&key.state),
                    stencil: StencilState::default(),
                    bias: DepthBiasState::default(),
                }),
                multisample: MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        Ok(pipeline)
    }

    /// Returns pipeline manager statistics
    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            total_pipelines: self.pipelines.len(),
            loaded_shaders: self.shader_modules.len(),
            common_layouts: self.common_layouts.len(),
        }
    }
}

/// Statistics about pipeline manager state
#[derive(Debug)]
pub struct PipelineStats {
    pub total_pipelines: usize,
    pub loaded_shaders: usize,
    pub common_layouts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::resources::material::Material;

    #[test]
    fn test_state_mapping() {
        let light_pass = RenderState::for_material(&Material::new("m"), true, false);
        assert_eq!(depth_compare(&light_pass), CompareFunction::Equal);
        assert_eq!(blend_state(light_pass.blend).color.dst_factor, BlendFactor::One);
        assert_eq!(cull_face(light_pass.cull), Some(Face::Back));

        let blit = RenderState::for_blit();
        assert_eq!(depth_compare(&blit), CompareFunction::Always);
        assert_eq!(cull_face(blit.cull), None);
        assert_eq!(blend_state(blit.blend), BlendState::REPLACE);
    }

    #[test]
    fn test_keys_distinguish_states() {
        let base = PipelineKey {
            program: "forward".into(),
            pass: ShaderPass::Base,
            state: RenderState::DEFAULT,
            target: TargetKind::Screen,
        };
        let two_sided = PipelineKey {
            state: RenderState::for_material(&Material::new("m").with_two_sided(true), false, true),
            ..base.clone()
        };
        assert_ne!(base, two_sided);
        assert_eq!(base.layout_names().len(), 3);
        assert_eq!(base.entry_points(), ("vs_main", Some("fs_base")));
    }
}
