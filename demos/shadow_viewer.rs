//! Interactive shadow viewer
//!
//! Renders a small scene lit by a directional, a spot and a point light.
//!
//! - `Space` toggles the shadow map overlay
//! - `P` pauses the light animation
//! - `Escape` quits
//!
//! Run with `cargo run --example shadow_viewer`.

use cgmath::{Deg, Matrix4, Point3, SquareMatrix, Vector3};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

use umbra::gfx::camera::Camera;
use umbra::gfx::geometry::{generate_cube, generate_plane, generate_sphere};
use umbra::gfx::rendering::{Renderer, RendererConfig, WgpuContext};
use umbra::gfx::resources::{AlphaMode, Material, Mesh};
use umbra::gfx::scene::{Light, LightId, Node, Prefab, Scene};
use umbra::RenderResult;

struct Viewer {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuContext>>,
    scene: Scene,
    point_light: Option<LightId>,
    show_shadow_maps: bool,
    paused: bool,
    started: Instant,
}

impl Viewer {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            scene: Scene::new(),
            point_light: None,
            show_shadow_maps: false,
            paused: false,
            started: Instant::now(),
        }
    }

    fn build_scene(&mut self, renderer: &mut Renderer<WgpuContext>) -> RenderResult<()> {
        let gpu = renderer.gpu_mut();
        let cube = Mesh::from_geometry(gpu, &generate_cube())?;
        let sphere = Mesh::from_geometry(gpu, &generate_sphere(32, 16))?;
        let ground = Mesh::from_geometry(gpu, &generate_plane(20.0, 20.0, 8, 8))?;

        let stone = Arc::new(Material::new("stone").with_color(0.7, 0.7, 0.65));
        let brick = Arc::new(Material::new("brick").with_color(0.8, 0.35, 0.25));
        let glass = Arc::new(
            Material::new("glass")
                .with_color(0.4, 0.6, 0.9)
                .with_alpha(0.4)
                .with_alpha_mode(AlphaMode::Blend),
        );
        let leaf = Arc::new(Material::new("leaf").with_color(0.3, 0.7, 0.3).with_two_sided(true));

        let tower = Node::new("tower")
            .with_mesh(cube, brick.clone())
            .with_child(
                Node::new("upper")
                    .with_transform(Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0)) * Matrix4::from_scale(0.7))
                    .with_mesh(cube, brick)
                    .with_child(
                        Node::new("dome")
                            .with_transform(Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0)))
                            .with_mesh(sphere, stone.clone()),
                    ),
            );

        self.scene.add_prefab(
            Arc::new(Prefab::from_mesh("ground", ground, stone)),
            Matrix4::identity(),
        );
        self.scene.add_prefab(
            Arc::new(Prefab::new("tower", tower)),
            Matrix4::from_translation(Vector3::new(0.0, 0.5, 0.0)),
        );
        self.scene.add_prefab(
            Arc::new(Prefab::from_mesh("orb", sphere, glass)),
            Matrix4::from_translation(Vector3::new(2.5, 1.0, 1.5)),
        );
        self.scene.add_prefab(
            Arc::new(Prefab::from_mesh("screen", cube, leaf)),
            Matrix4::from_translation(Vector3::new(-2.5, 1.0, -1.0)) * Matrix4::from_nonuniform_scale(2.0, 2.0, 0.05),
        );

        self.scene.add_light(
            Light::directional("sun", Vector3::new(-0.5, -1.0, -0.3))
                .with_color(1.0, 0.95, 0.85)
                .with_intensity(0.8)
                .with_shadows(true),
        );
        self.scene.add_light(
            Light::spot("spot", Point3::new(4.0, 5.0, 4.0), Vector3::new(-1.0, -1.2, -1.0), Deg(25.0))
                .with_color(0.6, 0.7, 1.0)
                .with_range(15.0)
                .with_shadows(true),
        );
        self.point_light = Some(
            self.scene.add_light(
                Light::point("lamp", Point3::new(0.0, 3.0, 3.0), 10.0)
                    .with_color(1.0, 0.6, 0.3)
                    .with_intensity(1.5)
                    .with_shadows(true)
                    .with_shadow_resolution(512),
            ),
        );
        Ok(())
    }

    fn camera(&self, size: PhysicalSize<u32>) -> Camera {
        let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
        Camera::perspective(
            Point3::new(7.0, 6.0, 9.0),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::unit_y(),
            Deg(45.0),
            aspect,
            0.1,
            100.0,
        )
    }

    fn animate(&mut self) {
        if self.paused {
            return;
        }
        let t = self.started.elapsed().as_secs_f32();
        if let Some(light) = self.point_light.and_then(|id| self.scene.light_mut(id)) {
            light.position = Point3::new(3.0 * t.cos(), 2.5, 3.0 * t.sin());
        }
    }

    fn redraw(&mut self) {
        let Some(window) = self.window.clone() else {
            return;
        };
        self.animate();
        let camera = self.camera(window.inner_size());

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if let Err(err) = renderer.begin_frame() {
            warn!("Skipping frame: {}", err);
            return;
        }

        let processed = renderer.render_scene_to_screen(&mut self.scene, &camera, [0.05, 0.05, 0.08, 1.0]);
        if self.show_shadow_maps {
            renderer.show_scene_shadowmaps(&self.scene, &processed);
        }

        if let Err(err) = renderer.end_frame() {
            error!("Failed to present frame: {}", err);
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title("umbra shadow viewer")
            .with_inner_size(winit::dpi::LogicalSize::new(1200, 800));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        let (width, height) = window.inner_size().into();
        let gpu = match pollster::block_on(WgpuContext::new(window.clone(), width, height)) {
            Ok(gpu) => gpu,
            Err(err) => {
                error!("Failed to initialise wgpu: {:#}", err);
                event_loop.exit();
                return;
            }
        };

        let mut renderer = Renderer::new(gpu, RendererConfig::from_env());
        if let Err(err) = self.build_scene(&mut renderer) {
            error!("Failed to build scene: {}", err);
            event_loop.exit();
            return;
        }

        info!("Scene ready with {} light(s)", self.scene.lights().len());
        self.window = Some(window);
        self.renderer = Some(renderer);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.gpu_mut().resize(width, height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key_code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::Space => self.show_shadow_maps = !self.show_shadow_maps,
                KeyCode::KeyP => self.paused = !self.paused,
                _ => {}
            },
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    umbra::init_logging();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut Viewer::new())?;
    Ok(())
}
