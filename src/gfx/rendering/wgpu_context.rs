//! wgpu implementation of [`GpuContext`]
//!
//! GL-style bound state (target, viewport, render state, shader, textures) is
//! kept on the CPU side and resolved into wgpu objects at draw time:
//! - render passes are opened lazily on the bound target and closed when the
//!   target changes, a clear is requested, or the frame ends
//! - the render state picks a cached pipeline from the [`PipelineManager`]
//! - per-draw uniforms live in a [`DynamicUniformBuffer`] bound by offset
//!
//! Shadow targets are `Depth32Float` 2D array textures with one layer per
//! light view. The lighting shader samples them through a comparison sampler.

use anyhow::{bail, Context};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

use super::gpu::{
    rgba_byte_len, ClearOp, GpuContext, MeshHandle, RenderTarget, ShaderPass, ShadowTargetHandle,
    TextureHandle, Viewport,
};
use super::pipeline_manager::{
    PipelineKey, PipelineManager, TargetKind, BLIT_LAYOUT, BLIT_PROGRAM, DRAW_LAYOUT, MATERIAL_LAYOUT,
    SHADOW_LAYOUT,
};
use super::render_state::RenderState;
use super::uniforms::DrawUniforms;
use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::resources::material::DEFAULT_SHADER;
use crate::gfx::resources::texture_resource::TextureResource;
use crate::gfx::scene::vertex::Vertex3D;
use crate::wgpu_utils::{self, DynamicUniformBuffer};

const FORWARD_SHADER: &str = include_str!("forward.wgsl");
const BLIT_SHADER: &str = include_str!("blit.wgsl");

/// Initial number of per-draw uniform slots
const UNIFORM_SLOTS: u64 = 1024;

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct ShadowTarget {
    resource: TextureResource,
    resolution: u32,
    layer_views: Vec<wgpu::TextureView>,
    sample_group: wgpu::BindGroup,
    blit_groups: Vec<wgpu::BindGroup>,
}

enum Presentation {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        color: TextureResource,
    },
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    surface_texture: Option<wgpu::SurfaceTexture>,
    color_view: wgpu::TextureView,
    pass: Option<wgpu::RenderPass<'static>>,
}

#[derive(Debug, Clone)]
struct BoundShader {
    program: String,
    pass: ShaderPass,
    offset: u32,
}

/// Window-backed or headless wgpu device implementing [`GpuContext`]
pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
    presentation: Presentation,
    size: (u32, u32),
    depth: TextureResource,
    pipelines: PipelineManager,

    uniforms: DynamicUniformBuffer<DrawUniforms>,
    uniform_group: wgpu::BindGroup,
    texture_sampler: wgpu::Sampler,
    white_texture: wgpu::BindGroup,
    empty_shadow: wgpu::BindGroup,

    meshes: HashMap<MeshHandle, GpuMesh>,
    textures: HashMap<TextureHandle, wgpu::BindGroup>,
    shadow_targets: HashMap<ShadowTargetHandle, ShadowTarget>,
    next_id: u64,

    frame: Option<Frame>,
    target: RenderTarget,
    viewport: Viewport,
    state: RenderState,
    shader: Option<BoundShader>,
    texture: Option<TextureHandle>,
    shadow_map: Option<ShadowTargetHandle>,
}

impl WgpuContext {
    /// Creates a context presenting to a window surface
    ///
    /// # Arguments
    /// * `window` - Surface target, typically an `Arc<winit::window::Window>`
    /// * `width`, `height` - Initial surface size in pixels
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request adapter")?;
        let (device, queue) = Self::request_device(&adapter).await?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .context("Surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self::from_parts(
            device,
            queue,
            Presentation::Window { surface, config },
            format,
            (width.max(1), height.max(1)),
        ))
    }

    /// Creates a context rendering into an offscreen colour texture
    pub async fn new_headless(width: u32, height: u32) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request adapter")?;
        let (device, queue) = Self::request_device(&adapter).await?;

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let color = TextureResource::create_color_target(&device, width, height, format);

        Ok(Self::from_parts(
            device,
            queue,
            Presentation::Offscreen { color },
            format,
            (width.max(1), height.max(1)),
        ))
    }

    /// Blocking form of [`WgpuContext::new_headless`]
    pub fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        pollster::block_on(Self::new_headless(width, height))
    }

    async fn request_device(adapter: &wgpu::Adapter) -> anyhow::Result<(wgpu::Device, wgpu::Queue)> {
        let adapter_info = adapter.get_info();
        info!(
            "Using adapter '{}' ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );

        let device = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to request a device")?;
        Ok(device)
    }

    fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        presentation: Presentation,
        color_format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let device = Arc::new(device);
        let mut pipelines = PipelineManager::new(device.clone(), color_format);

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[wgpu_utils::entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                wgpu_utils::uniform_dynamic(std::mem::size_of::<DrawUniforms>() as u64),
            )],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Layout"),
            entries: &[
                wgpu_utils::entry(0, fragment, wgpu_utils::texture_2d()),
                wgpu_utils::entry(1, fragment, wgpu_utils::sampler(wgpu::SamplerBindingType::Filtering)),
            ],
        });
        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Layout"),
            entries: &[
                wgpu_utils::entry(0, fragment, wgpu_utils::depth_texture_2d_array()),
                wgpu_utils::entry(1, fragment, wgpu_utils::sampler(wgpu::SamplerBindingType::Comparison)),
            ],
        });
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Blit Layout"),
            entries: &[wgpu_utils::entry(0, fragment, wgpu_utils::depth_texture_2d())],
        });

        let uniforms = DynamicUniformBuffer::<DrawUniforms>::new(&device, UNIFORM_SLOTS);
        let uniform_group = Self::create_uniform_group(&device, &draw_layout, &uniforms);

        let texture_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white = TextureResource::create_from_rgba_data(&device, &queue, &[255; 4], 1, 1, "White");
        let white_texture = Self::create_material_group(&device, &material_layout, &white.view, &texture_sampler);

        let empty = TextureResource::create_shadow_map(&device, 1, 1);
        let empty_shadow = Self::create_shadow_group(&device, &shadow_layout, &empty);

        pipelines.register_bind_group_layout(DRAW_LAYOUT, draw_layout);
        pipelines.register_bind_group_layout(MATERIAL_LAYOUT, material_layout);
        pipelines.register_bind_group_layout(SHADOW_LAYOUT, shadow_layout);
        pipelines.register_bind_group_layout(BLIT_LAYOUT, blit_layout);
        pipelines.load_shader(DEFAULT_SHADER, FORWARD_SHADER);
        pipelines.load_shader(BLIT_PROGRAM, BLIT_SHADER);

        let depth = TextureResource::create_depth_texture(&device, size.0, size.1, "depth_texture");

        Self {
            device,
            queue,
            presentation,
            size,
            depth,
            pipelines,
            uniforms,
            uniform_group,
            texture_sampler,
            white_texture,
            empty_shadow,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            shadow_targets: HashMap::new(),
            next_id: 1,
            frame: None,
            target: RenderTarget::Screen,
            viewport: Viewport::full(size.0, size.1),
            state: RenderState::DEFAULT,
            shader: None,
            texture: None,
            shadow_map: None,
        }
    }

    fn layout(&self, name: &str) -> RenderResult<&wgpu::BindGroupLayout> {
        self.pipelines
            .get_bind_group_layout(name)
            .ok_or_else(|| RenderError::missing(format!("bind group layout '{}'", name)))
    }

    fn create_uniform_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &DynamicUniformBuffer<DrawUniforms>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.binding_resource(),
            }],
        })
    }

    fn create_material_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn create_shadow_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        shadow: &TextureResource,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Map"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadow.sampler),
                },
            ],
        })
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Compiles a WGSL program that materials can select by name
    ///
    /// The module must provide `vs_main`, `fs_base` and `fs_light` with the
    /// bind group layout of `forward.wgsl`.
    pub fn register_program(&mut self, name: &str, source: &str) {
        self.pipelines.load_shader(name, source);
    }

    pub fn pipeline_stats(&self) -> super::pipeline_manager::PipelineStats {
        self.pipelines.get_stats()
    }

    /// Resizes the surface and the screen depth buffer
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);

        match &mut self.presentation {
            Presentation::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presentation::Offscreen { color } => {
                let format = color.texture.format();
                *color = TextureResource::create_color_target(&self.device, width, height, format);
            }
        }
        self.depth = TextureResource::create_depth_texture(&self.device, width, height, "depth_texture");
        self.viewport = Viewport::full(width, height);
    }

    fn end_pass(&mut self) {
        if let Some(frame) = self.frame.as_mut() {
            frame.pass = None;
        }
    }

    /// Opens a render pass on the bound target, clearing it if `clear` is set
    fn begin_pass(&mut self, clear: Option<ClearOp>) -> RenderResult<&mut wgpu::RenderPass<'static>> {
        let depth_view = match self.target {
            RenderTarget::Screen => self.depth.view.clone(),
            RenderTarget::Shadow { target, layer } => self
                .shadow_targets
                .get(&target)
                .and_then(|shadow| shadow.layer_views.get(layer as usize))
                .cloned()
                .ok_or_else(|| RenderError::missing(format!("layer {} of {:?}", layer, target)))?,
        };

        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| RenderError::StateCorruption("no frame in progress".into()))?;
        frame.pass = None;

        let clear = clear.unwrap_or_default();
        let depth_ops = wgpu::Operations {
            load: match clear.depth {
                Some(depth) => wgpu::LoadOp::Clear(depth),
                None => wgpu::LoadOp::Load,
            },
            store: wgpu::StoreOp::Store,
        };

        let color_attachment = match self.target {
            RenderTarget::Screen => Some(wgpu::RenderPassColorAttachment {
                view: &frame.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match clear.color {
                        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            }),
            RenderTarget::Shadow { .. } => None,
        };

        let pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(match self.target {
                    RenderTarget::Screen => "Screen Pass",
                    RenderTarget::Shadow { .. } => "Shadow Pass",
                }),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(depth_ops),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            })
            .forget_lifetime();

        Ok(frame.pass.insert(pass))
    }

    fn active_pass(&mut self) -> RenderResult<&mut wgpu::RenderPass<'static>> {
        let open = self.frame.as_ref().map(|frame| frame.pass.is_some());
        match open {
            Some(true) => self
                .frame
                .as_mut()
                .and_then(|frame| frame.pass.as_mut())
                .ok_or_else(|| RenderError::StateCorruption("render pass vanished".into())),
            Some(false) => self.begin_pass(None),
            None => Err(RenderError::StateCorruption("draw outside of a frame".into())),
        }
    }

    fn apply_viewport(pass: &mut wgpu::RenderPass<'static>, viewport: Viewport) {
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width.max(1) as f32,
            viewport.height.max(1) as f32,
            0.0,
            1.0,
        );
    }

    fn target_kind(&self) -> TargetKind {
        match self.target {
            RenderTarget::Screen => TargetKind::Screen,
            RenderTarget::Shadow { .. } => TargetKind::Depth,
        }
    }

    /// Copies one shadow map layer back to the CPU as depth values
    ///
    /// Must be called between frames. Rows are returned tightly packed,
    /// `resolution * resolution` values in total.
    pub fn read_shadow_map(&self, target: ShadowTargetHandle, layer: u32) -> anyhow::Result<Vec<f32>> {
        if self.frame.is_some() {
            bail!("shadow map readback requested while a frame is being recorded");
        }
        let shadow = self
            .shadow_targets
            .get(&target)
            .with_context(|| format!("unknown shadow target {:?}", target))?;
        if layer as usize >= shadow.layer_views.len() {
            bail!("layer {} out of range for {:?}", layer, target);
        }

        let resolution = shadow.resolution;
        let unpadded = resolution * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Readback"),
            size: (padded * resolution) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shadow Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &shadow.resource.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(resolution),
                },
            },
            wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        // Map first, then poll, before awaiting the result
        let slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait)?;
        pollster::block_on(rx)??;

        let data = slice.get_mapped_range();
        let mut depths = Vec::with_capacity((resolution * resolution) as usize);
        for row in data.chunks(padded as usize) {
            depths.extend_from_slice(bytemuck::cast_slice::<u8, f32>(&row[..unpadded as usize]));
        }
        drop(data);
        staging.unmap();
        Ok(depths)
    }
}

impl GpuContext for WgpuContext {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::StateCorruption("frame already in progress".into()));
        }

        let (surface_texture, color_view) = match &self.presentation {
            Presentation::Window { surface, config } => {
                let texture = match surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(&self.device, config);
                        return Err(RenderError::Surface("surface reconfigured, frame skipped".into()));
                    }
                    Err(err) => return Err(RenderError::Surface(err.to_string())),
                };
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(texture), view)
            }
            Presentation::Offscreen { color } => (None, color.view.clone()),
        };

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.uniforms.reset();
        self.frame = Some(Frame {
            encoder,
            surface_texture,
            color_view,
            pass: None,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        let mut frame = self
            .frame
            .take()
            .ok_or_else(|| RenderError::StateCorruption("end_frame without begin_frame".into()))?;
        frame.pass = None;

        self.queue.submit(Some(frame.encoder.finish()));
        if let Some(texture) = frame.surface_texture {
            texture.present();
        }
        self.shader = None;
        Ok(())
    }

    fn upload_mesh(&mut self, vertices: &[Vertex3D], indices: &[u32]) -> RenderResult<MeshHandle> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::missing("empty mesh upload"));
        }

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let handle = MeshHandle(self.next_handle());
        self.meshes.insert(
            handle,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        );
        Ok(handle)
    }

    fn upload_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> RenderResult<TextureHandle> {
        if width == 0 || height == 0 || rgba_byte_len(width, height) != Some(rgba.len()) {
            return Err(RenderError::missing(format!(
                "{} bytes of pixel data for a {}x{} texture",
                rgba.len(),
                width,
                height
            )));
        }

        let resource = TextureResource::create_from_rgba_data(&self.device, &self.queue, rgba, width, height, "Material Texture");
        let group = Self::create_material_group(
            &self.device,
            self.layout(MATERIAL_LAYOUT)?,
            &resource.view,
            &self.texture_sampler,
        );

        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle, group);
        Ok(handle)
    }

    fn create_shadow_target(&mut self, resolution: u32, layers: u32) -> RenderResult<ShadowTargetHandle> {
        let max = self.device.limits().max_texture_dimension_2d;
        if resolution == 0 || resolution > max || layers == 0 {
            return Err(RenderError::missing(format!(
                "shadow target {}x{} with {} layer(s) (max {})",
                resolution, resolution, layers, max
            )));
        }

        let resource = TextureResource::create_shadow_map(&self.device, resolution, layers);
        let layer_views: Vec<wgpu::TextureView> = (0..layers).map(|layer| resource.layer_view(layer)).collect();
        let sample_group = Self::create_shadow_group(&self.device, self.layout(SHADOW_LAYOUT)?, &resource);

        let blit_layout = self.layout(BLIT_LAYOUT)?;
        let blit_groups = layer_views
            .iter()
            .map(|view| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Shadow Blit"),
                    layout: blit_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    }],
                })
            })
            .collect();

        let handle = ShadowTargetHandle(self.next_handle());
        debug!("Created shadow target {:?}: {}px, {} layer(s)", handle, resolution, layers);
        self.shadow_targets.insert(
            handle,
            ShadowTarget {
                resource,
                resolution,
                layer_views,
                sample_group,
                blit_groups,
            },
        );
        Ok(handle)
    }

    fn destroy_shadow_target(&mut self, target: ShadowTargetHandle) {
        if let RenderTarget::Shadow { target: bound, .. } = self.target {
            if bound == target {
                self.end_pass();
                self.target = RenderTarget::Screen;
            }
        }
        if self.shadow_map == Some(target) {
            self.shadow_map = None;
        }
        self.shadow_targets.remove(&target);
    }

    fn bind_target(&mut self, target: RenderTarget) -> RenderResult<()> {
        if let RenderTarget::Shadow { target: handle, layer } = target {
            let shadow = self
                .shadow_targets
                .get(&handle)
                .ok_or_else(|| RenderError::missing(format!("shadow target {:?}", handle)))?;
            if layer as usize >= shadow.layer_views.len() {
                return Err(RenderError::missing(format!("layer {} of {:?}", layer, handle)));
            }
        }

        if target != self.target {
            self.end_pass();
            self.target = target;
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, clear: ClearOp) {
        if let Err(err) = self.begin_pass(Some(clear)) {
            warn!("Clear of {:?} dropped: {}", self.target, err);
        }
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
    }

    fn bind_shader(&mut self, program: &str, pass: ShaderPass, uniforms: &DrawUniforms) -> RenderResult<()> {
        if !self.pipelines.has_program(program) {
            return Err(RenderError::missing(format!("shader program '{}'", program)));
        }

        let (offset, grown) = self.uniforms.push(&self.device, &self.queue, uniforms);
        if grown {
            debug!("Uniform arena grown to {} slots", self.uniforms.capacity());
            self.uniform_group = Self::create_uniform_group(&self.device, self.layout(DRAW_LAYOUT)?, &self.uniforms);
        }

        self.shader = Some(BoundShader {
            program: program.to_string(),
            pass,
            offset,
        });
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> RenderResult<()> {
        if let Some(handle) = texture {
            if !self.textures.contains_key(&handle) {
                return Err(RenderError::missing(format!("texture {:?}", handle)));
            }
        }
        self.texture = texture;
        Ok(())
    }

    fn bind_shadow_map(&mut self, shadow: Option<ShadowTargetHandle>) -> RenderResult<()> {
        if let Some(handle) = shadow {
            if !self.shadow_targets.contains_key(&handle) {
                return Err(RenderError::missing(format!("shadow target {:?}", handle)));
            }
        }
        self.shadow_map = shadow;
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()> {
        let shader = self
            .shader
            .clone()
            .ok_or_else(|| RenderError::StateCorruption("draw without a bound shader".into()))?;

        let target = self.target_kind();
        if (target == TargetKind::Depth) != (shader.pass == ShaderPass::Depth) {
            return Err(RenderError::StateCorruption(format!(
                "{:?} pass drawn into {:?}",
                shader.pass, self.target
            )));
        }

        let (vertex_buffer, index_buffer, index_count) = {
            let gpu_mesh = self
                .meshes
                .get(&mesh)
                .ok_or_else(|| RenderError::missing(format!("mesh {:?}", mesh)))?;
            (
                gpu_mesh.vertex_buffer.clone(),
                gpu_mesh.index_buffer.clone(),
                gpu_mesh.index_count,
            )
        };

        let material_group = match self.texture {
            Some(handle) => self
                .textures
                .get(&handle)
                .cloned()
                .ok_or_else(|| RenderError::missing(format!("texture {:?}", handle)))?,
            None => self.white_texture.clone(),
        };

        // A target being rendered cannot be sampled in the same pass
        let shadow_group = match (shader.pass, self.shadow_map) {
            (ShaderPass::Depth, _) | (_, None) => self.empty_shadow.clone(),
            (_, Some(handle)) => self
                .shadow_targets
                .get(&handle)
                .map(|shadow| shadow.sample_group.clone())
                .ok_or_else(|| RenderError::missing(format!("shadow target {:?}", handle)))?,
        };

        let key = PipelineKey {
            program: shader.program,
            pass: shader.pass,
            state: self.state,
            target,
        };
        let pipeline = self.pipelines.get_pipeline(&key)?.clone();
        let uniform_group = self.uniform_group.clone();
        let viewport = self.viewport;

        let pass = self.active_pass()?;
        Self::apply_viewport(pass, viewport);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &uniform_group, &[shader.offset]);
        pass.set_bind_group(1, &material_group, &[]);
        pass.set_bind_group(2, &shadow_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..index_count, 0, 0..1);
        Ok(())
    }

    fn blit_depth(&mut self, source: ShadowTargetHandle, layer: u32) -> RenderResult<()> {
        if self.target != RenderTarget::Screen {
            return Err(RenderError::StateCorruption(format!("blit into {:?}", self.target)));
        }

        let group = self
            .shadow_targets
            .get(&source)
            .and_then(|shadow| shadow.blit_groups.get(layer as usize))
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("layer {} of {:?}", layer, source)))?;

        let key = PipelineKey {
            program: BLIT_PROGRAM.to_string(),
            pass: ShaderPass::Blit,
            state: self.state,
            target: TargetKind::Screen,
        };
        let pipeline = self.pipelines.get_pipeline(&key)?.clone();
        let viewport = self.viewport;

        let pass = self.active_pass()?;
        Self::apply_viewport(pass, viewport);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
