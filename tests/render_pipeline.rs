// End-to-end frame tests against the command-recording backend

use cgmath::{Deg, Matrix4, Point3, SquareMatrix, Vector3};
use rand::Rng;
use std::sync::Arc;

use umbra::gfx::camera::Camera;
use umbra::gfx::geometry::{generate_cube, generate_plane};
use umbra::gfx::rendering::{
    BlendMode, ClearOp, CullMode, GpuCommand, RecordingContext, RenderState, RenderTarget, Renderer,
    RendererConfig, ShaderPass, ShadowMapGenerator, ShadowUpdatePolicy,
};
use umbra::gfx::resources::{AlphaMode, Material, Mesh};
use umbra::gfx::scene::{Light, LightType, Node, Prefab, Scene};

fn camera() -> Camera {
    Camera::perspective(
        Point3::new(0.0, 4.0, 8.0),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
        Deg(60.0),
        1.0,
        0.1,
        100.0,
    )
}

fn renderer(config: RendererConfig) -> Renderer<RecordingContext> {
    Renderer::new(RecordingContext::new(800, 600), config)
}

fn cube_scene(renderer: &mut Renderer<RecordingContext>, material: Material) -> (Scene, Mesh) {
    let mesh = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
    let mut scene = Scene::new();
    scene.add_prefab(
        Arc::new(Prefab::from_mesh("cube", mesh, Arc::new(material))),
        Matrix4::identity(),
    );
    (scene, mesh)
}

fn screen_draws(renderer: &Renderer<RecordingContext>) -> Vec<umbra::gfx::rendering::DrawRecord> {
    renderer
        .gpu()
        .draws()
        .into_iter()
        .filter(|draw| draw.target == RenderTarget::Screen)
        .collect()
}

fn assert_matrix_eq(actual: [[f32; 4]; 4], expected: Matrix4<f32>) {
    for column in 0..4 {
        for row in 0..4 {
            let (a, e) = (actual[column][row], expected[column][row]);
            assert!((a - e).abs() <= 1e-4 * (1.0 + e.abs()), "[{}][{}]: {} != {}", column, row, a, e);
        }
    }
}

#[test]
fn test_three_level_chain_composes_root_to_leaf() {
    let mut renderer = renderer(RendererConfig::default().with_frustum_culling(false));
    let mesh = Mesh::from_geometry(renderer.gpu_mut(), &generate_cube()).unwrap();
    let material = Arc::new(Material::new("m"));
    let mut rng = rand::rng();

    for _ in 0..8 {
        let mut transform = || {
            Matrix4::from_translation(Vector3::<f32>::new(
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
            )) * Matrix4::from_angle_y(Deg(rng.random_range(0.0f32..360.0)))
                * Matrix4::from_scale(rng.random_range(0.5f32..2.0))
        };
        let (model, root_local, mid_local, leaf_local) = (transform(), transform(), transform(), transform());

        let root = Node::new("root").with_transform(root_local).with_child(
            Node::new("mid")
                .with_transform(mid_local)
                .with_child(Node::new("leaf").with_transform(leaf_local).with_mesh(mesh, material.clone())),
        );

        renderer.gpu_mut().clear_log();
        renderer.render_prefab(&model, &Prefab::new("chain", root), &camera());

        let draws = renderer.gpu().draws();
        assert_eq!(draws.len(), 1);
        assert_matrix_eq(draws[0].uniforms.model, model * root_local * mid_local * leaf_local);
    }
}

#[test]
fn test_two_sided_materials_disable_culling() {
    for (two_sided, expected) in [(true, CullMode::None), (false, CullMode::Back)] {
        let mut renderer = renderer(RendererConfig::default());
        let (mut scene, _) = cube_scene(&mut renderer, Material::new("leaf").with_two_sided(two_sided));
        scene.add_light(Light::directional("sun", Vector3::new(-0.3, -1.0, -0.2)).with_shadows(true));

        renderer.render_scene_to_screen(&mut scene, &camera(), [0.0; 4]);

        let draws = screen_draws(&renderer);
        assert_eq!(draws.len(), 2);
        for draw in draws {
            assert_eq!(draw.state.cull, expected);
            assert_eq!(draw.state.culling_enabled(), !two_sided);
        }
    }
}

#[test]
fn test_mesh_lit_by_n_lights_gets_n_plus_one_draws() {
    let mut renderer = renderer(RendererConfig::default().with_shadow_resolution(256));
    let (mut scene, mesh) = cube_scene(&mut renderer, Material::new("stone"));
    scene.add_light(Light::directional("sun", Vector3::new(0.2, -1.0, 0.1)).with_shadows(true));
    scene.add_light(Light::point("bulb", Point3::new(2.0, 2.0, 0.0), 10.0).with_shadows(true));
    scene.add_light(
        Light::spot("torch", Point3::new(0.0, 4.0, 2.0), Vector3::new(0.0, -1.0, -0.5), Deg(35.0))
            .with_shadows(true),
    );

    let processed = renderer.render_scene_to_screen(&mut scene, &camera(), [0.0; 4]);
    assert_eq!(processed.len(), 3);

    let draws = screen_draws(&renderer);
    assert_eq!(draws.len(), 4);
    assert!(draws.iter().all(|draw| draw.mesh == mesh.handle));
    assert_eq!(draws[0].pass, ShaderPass::Base);
    assert!(draws[0].state.depth_write);
    for draw in &draws[1..] {
        assert!(!draw.state.depth_write);
        assert!(draw.uniforms.is_shadowed());
    }
    assert_eq!(
        draws[1..].iter().map(|draw| draw.pass).collect::<Vec<_>>(),
        vec![
            ShaderPass::Light(LightType::Directional),
            ShaderPass::Light(LightType::Point),
            ShaderPass::Light(LightType::Spot),
        ]
    );
}

#[test]
fn test_point_light_renders_six_faces_at_ninety_degrees() {
    let mut renderer = renderer(RendererConfig::default().with_shadow_resolution(128));
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let bulb = scene.add_light(Light::point("bulb", Point3::new(0.0, 3.0, 0.0), 12.0).with_shadows(true));

    renderer.gpu_mut().clear_log();
    assert!(renderer.render_point_shadowmap(&mut scene, bulb));

    let map = scene.light(bulb).and_then(|light| light.shadow_map()).unwrap();
    assert_eq!(map.layers(), 6);
    assert!(map.is_valid());

    let commands = renderer.gpu().commands();
    let mut cleared_layers = Vec::new();
    let mut bound = RenderTarget::Screen;
    for command in commands {
        match command {
            GpuCommand::BindTarget(target) => bound = *target,
            GpuCommand::Clear(clear) => {
                if let RenderTarget::Shadow { layer, .. } = bound {
                    assert_eq!(*clear, ClearOp::depth(1.0));
                    cleared_layers.push(layer);
                }
            }
            _ => {}
        }
    }
    assert_eq!(cleared_layers, vec![0, 1, 2, 3, 4, 5]);

    let light = scene.light(bulb).unwrap();
    let cameras = ShadowMapGenerator::light_cameras(light, scene.world_bounds());
    assert_eq!(cameras.len(), 6);
    for (camera, matrix) in cameras.iter().zip(map.projection.matrices()) {
        // cot(45 deg) on both axes
        assert!((camera.projection.x.x - 1.0).abs() < 1e-5);
        assert!((camera.projection.y.y - 1.0).abs() < 1e-5);
        assert_eq!(camera.view_projection(), *matrix);
    }

    // The cube sits below the light, so only the -Y face sees it
    let below = renderer.gpu().target_contents(RenderTarget::Shadow {
        target: map.target,
        layer: 3,
    });
    assert_eq!(below.len(), 1);
    assert_eq!(below[0].pass, ShaderPass::Depth);
    let above = renderer.gpu().target_contents(RenderTarget::Shadow {
        target: map.target,
        layer: 2,
    });
    assert!(above.is_empty());
}

#[test]
fn test_shadow_generation_is_idempotent() {
    let mut renderer = renderer(RendererConfig::default().with_shadow_resolution(256));
    let (mut scene, mesh) = cube_scene(&mut renderer, Material::new("stone"));
    let ground = Mesh::from_geometry(renderer.gpu_mut(), &generate_plane(10.0, 10.0, 1, 1)).unwrap();
    scene.add_prefab(
        Arc::new(Prefab::from_mesh("ground", ground, Arc::new(Material::new("grass")))),
        Matrix4::from_translation(Vector3::new(0.0, -0.5, 0.0)),
    );
    let sun = scene.add_light(Light::directional("sun", Vector3::new(-0.4, -1.0, -0.3)).with_shadows(true));
    let bulb = scene.add_light(Light::point("bulb", Point3::new(1.0, 2.0, 1.0), 8.0).with_shadows(true));

    let mut runs = Vec::new();
    for _ in 0..2 {
        renderer.gpu_mut().clear_log();
        let processed = renderer.render_scene_shadowmaps(&mut scene);
        assert_eq!(processed, vec![sun, bulb]);

        let mut contents = Vec::new();
        for id in [sun, bulb] {
            let map = scene.light(id).and_then(|light| light.shadow_map()).unwrap();
            for layer in 0..map.layers() {
                contents.push(renderer.gpu().target_contents(RenderTarget::Shadow {
                    target: map.target,
                    layer,
                }));
            }
        }
        runs.push(contents);
    }

    assert_eq!(runs[0].len(), 7);
    assert_eq!(runs[0], runs[1]);
    assert!(runs[0][0].iter().any(|draw| draw.mesh == mesh.handle));
    assert_eq!(renderer.shadow_stats().allocated, 2);
}

#[test]
fn test_directional_light_end_to_end() {
    let mut renderer = renderer(RendererConfig::default().with_shadow_resolution(512));
    let (mut scene, mesh) = cube_scene(&mut renderer, Material::new("stone").with_color(0.8, 0.3, 0.2));
    let sun = scene.add_light(Light::directional("sun", Vector3::new(-0.5, -1.0, -0.25)).with_shadows(true));

    let processed = renderer.render_scene_to_screen(&mut scene, &camera(), [0.1, 0.1, 0.1, 1.0]);
    assert_eq!(processed, vec![sun]);

    let map = scene.light(sun).and_then(|light| light.shadow_map()).unwrap();
    let depth = renderer.gpu().target_contents(RenderTarget::Shadow {
        target: map.target,
        layer: 0,
    });
    assert_eq!(depth.len(), 1);
    assert_eq!(depth[0].mesh, mesh.handle);
    assert!(!depth[0].state.blending_enabled());

    let draws = screen_draws(&renderer);
    assert_eq!(draws.len(), 2);

    let (base, lit) = (&draws[0], &draws[1]);
    assert_eq!(base.pass, ShaderPass::Base);
    assert!(base.state.depth_write);
    assert_eq!(base.state.blend, BlendMode::Disabled);

    assert_eq!(lit.pass, ShaderPass::Light(LightType::Directional));
    assert_eq!(lit.state.blend, BlendMode::Additive);
    assert!(!lit.state.depth_write);
    assert_eq!(lit.shadow_map, Some(map.target));
    assert!(lit.uniforms.is_shadowed());

    renderer.gpu_mut().clear_log();
    let blits = renderer.show_scene_shadowmaps(&scene, &processed);
    assert_eq!(blits, 1);
    assert!(renderer.gpu().draws().is_empty());

    let recorded = renderer.gpu().blits();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].source, map.target);
    assert_eq!(recorded[0].target, RenderTarget::Screen);
    assert_eq!(recorded[0].state.blend, BlendMode::Disabled);
    assert_eq!(recorded[0].viewport.width, 150);
    assert_eq!((recorded[0].viewport.x, recorded[0].viewport.y), (0, 0));
}

#[test]
fn test_default_flags_restored_after_every_frame() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(
        &mut renderer,
        Material::new("glass")
            .with_alpha(0.4)
            .with_alpha_mode(AlphaMode::Blend)
            .with_two_sided(true),
    );
    scene.add_light(Light::point("bulb", Point3::new(0.0, 3.0, 0.0), 10.0).with_shadows(true));

    let mut states = Vec::new();
    for _ in 0..2 {
        renderer.render_scene_to_screen(&mut scene, &camera(), [0.0; 4]);
        assert_eq!(renderer.frame_stats().deferred, 1);
        assert!(screen_draws(&renderer).iter().all(|draw| draw.state.blend == BlendMode::Alpha));
        states.push(renderer.state());
        assert_eq!(renderer.gpu().current_state(), RenderState::DEFAULT);
        assert_eq!(renderer.gpu().current_target(), RenderTarget::Screen);
    }
    assert_eq!(states, vec![RenderState::DEFAULT; 2]);
}

#[test]
fn test_invalid_light_is_skipped_and_lights_unshadowed() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let sun = scene.add_light(Light::directional("sun", Vector3::new(0.0, -1.0, 0.2)).with_shadows(true));
    let wide = scene.add_light(
        Light::spot("wide", Point3::new(0.0, 3.0, 0.0), -Vector3::unit_y(), Deg(120.0)).with_shadows(true),
    );

    let processed = renderer.render_scene_to_screen(&mut scene, &camera(), [0.0; 4]);
    assert_eq!(processed, vec![sun]);
    assert!(scene.light(wide).and_then(|light| light.shadow_map()).is_none());
    assert_eq!(renderer.shadow_stats().rejected, 1);

    let draws = screen_draws(&renderer);
    assert_eq!(draws.len(), 3);
    assert!(draws[1].uniforms.is_shadowed());
    assert_eq!(draws[2].pass, ShaderPass::Light(LightType::Spot));
    assert!(!draws[2].uniforms.is_shadowed());
}

#[test]
fn test_unchanged_scene_reuses_shadow_maps() {
    let config = RendererConfig::default().with_shadow_update(ShadowUpdatePolicy::WhenChanged);
    let mut renderer = renderer(config);
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let sun = scene.add_light(Light::directional("sun", Vector3::new(0.3, -1.0, 0.0)).with_shadows(true));

    assert_eq!(renderer.render_scene_shadowmaps(&mut scene), vec![sun]);
    assert!(renderer.render_scene_shadowmaps(&mut scene).is_empty());
    assert_eq!(renderer.shadow_stats().reused, 1);

    scene.prefabs[0].model = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
    assert_eq!(renderer.render_scene_shadowmaps(&mut scene), vec![sun]);

    if let Some(light) = scene.light_mut(sun) {
        light.direction = Vector3::new(-0.3, -1.0, 0.0);
    }
    assert_eq!(renderer.render_scene_shadowmaps(&mut scene), vec![sun]);
    assert_eq!(renderer.shadow_stats().rendered, 3);
    assert_eq!(renderer.shadow_stats().allocated, 1);
}

#[test]
fn test_released_light_frees_its_target() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let bulb = scene.add_light(Light::point("bulb", Point3::new(0.0, 2.0, 0.0), 6.0).with_shadows(true));

    renderer.render_scene_shadowmaps(&mut scene);
    assert_eq!(renderer.gpu().shadow_target_count(), 1);

    let mut light = scene.remove_light(bulb).unwrap();
    renderer.release_light(&mut light);
    assert_eq!(renderer.gpu().shadow_target_count(), 0);
    assert!(light.shadow_map().is_none());
}

#[test]
fn test_non_casting_light_keeps_its_previous_shadow_map() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let sun = scene.add_light(Light::directional("sun", Vector3::new(0.2, -1.0, 0.1)).with_shadows(true));

    assert_eq!(renderer.render_scene_shadowmaps(&mut scene), vec![sun]);
    let before = scene.light(sun).and_then(|light| light.shadow_map()).cloned().unwrap();
    let layer = RenderTarget::Shadow {
        target: before.target,
        layer: 0,
    };
    let contents = renderer.gpu().target_contents(layer);
    assert!(!contents.is_empty());

    let drawn = renderer.gpu().draws().len();

    scene.light_mut(sun).unwrap().casts_shadow = false;
    assert!(renderer.render_scene_shadowmaps(&mut scene).is_empty());

    assert_eq!(scene.light(sun).and_then(|light| light.shadow_map()), Some(&before));
    assert!(renderer.gpu().has_shadow_target(before.target));
    assert_eq!(renderer.gpu().target_contents(layer), contents);
    assert_eq!(renderer.gpu().draws().len(), drawn);
}

#[test]
fn test_failed_shadow_allocation_lights_unshadowed() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let sun = scene.add_light(Light::directional("sun", Vector3::new(0.0, -1.0, 0.3)).with_shadows(true));
    renderer.gpu_mut().set_fail_shadow_targets(true);

    let processed = renderer.render_scene_to_screen(&mut scene, &camera(), [0.0; 4]);
    assert!(processed.is_empty());
    assert_eq!(renderer.shadow_stats().rejected, 1);
    assert_eq!(renderer.gpu().shadow_target_count(), 0);
    assert!(scene.light(sun).and_then(|light| light.shadow_map()).is_none());

    let draws = screen_draws(&renderer);
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[1].pass, ShaderPass::Light(LightType::Directional));
    assert!(!draws[1].uniforms.is_shadowed());
}

#[test]
fn test_cloned_scene_does_not_share_shadow_targets() {
    let mut renderer = renderer(RendererConfig::default());
    let (mut scene, _) = cube_scene(&mut renderer, Material::new("stone"));
    let bulb = scene.add_light(Light::point("bulb", Point3::new(0.0, 2.0, 0.0), 6.0).with_shadows(true));
    renderer.render_scene_shadowmaps(&mut scene);
    let target = scene.light(bulb).and_then(|light| light.shadow_map()).map(|map| map.target).unwrap();

    let mut copy = scene.clone();
    assert!(copy.light(bulb).and_then(|light| light.shadow_map()).is_none());
    assert!(copy.light(bulb).unwrap().casts_shadow);

    let mut light = copy.remove_light(bulb).unwrap();
    renderer.release_light(&mut light);
    assert!(renderer.gpu().has_shadow_target(target));
    assert_eq!(scene.light(bulb).and_then(|light| light.shadow_map()).map(|map| map.target), Some(target));
}
