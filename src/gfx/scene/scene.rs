//! Scene container: prefab instances plus lights
//!
//! The scene is built once and rendered many times. The renderer reads the
//! prefab instances and writes only the lights' shadow maps.

use cgmath::Matrix4;
use std::sync::Arc;

use super::light::{Light, LightId};
use super::node::Prefab;
use crate::gfx::camera::Aabb;
use crate::gfx::rendering::traversal::{self, BoundsSink};

/// A shared prefab placed in the world
#[derive(Debug, Clone)]
pub struct PrefabInstance {
    pub prefab: Arc<Prefab>,
    pub model: Matrix4<f32>,
}

/// Cloning a scene copies its lights without their shadow maps
#[derive(Debug, Clone)]
pub struct Scene {
    pub prefabs: Vec<PrefabInstance>,
    lights: Vec<Light>,
    next_light_id: u32,
    /// Ambient term added by every base pass
    pub ambient_light: [f32; 3],
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            prefabs: Vec::new(),
            lights: Vec::new(),
            next_light_id: 0,
            ambient_light: [0.1, 0.1, 0.1],
        }
    }

    pub fn add_prefab(&mut self, prefab: Arc<Prefab>, model: Matrix4<f32>) {
        self.prefabs.push(PrefabInstance { prefab, model });
    }

    /// Adds a light and returns the id the renderer reports it by
    pub fn add_light(&mut self, mut light: Light) -> LightId {
        let id = LightId(self.next_light_id);
        self.next_light_id += 1;
        light.assign_id(id);
        self.lights.push(light);
        id
    }

    /// Removes a light. Its shadow map stays allocated until passed to
    /// `Renderer::release_light`.
    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        let index = self.lights.iter().position(|l| l.id() == id)?;
        Some(self.lights.remove(index))
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.iter().find(|l| l.id() == id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.iter_mut().find(|l| l.id() == id)
    }

    pub(crate) fn light_index(&self, id: LightId) -> Option<usize> {
        self.lights.iter().position(|l| l.id() == id)
    }

    /// World-space bounds of every visible renderable node
    pub fn world_bounds(&self) -> Option<Aabb> {
        let mut sink = BoundsSink::default();
        traversal::render_scene(&mut sink, self);
        sink.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Vector3};

    #[test]
    fn test_light_ids_are_stable() {
        let mut scene = Scene::new();
        let a = scene.add_light(Light::directional("a", -Vector3::unit_y()));
        let b = scene.add_light(Light::point("b", Point3::new(0.0, 1.0, 0.0), 4.0));
        assert_ne!(a, b);

        assert!(scene.remove_light(a).is_some());
        assert!(scene.light(a).is_none());
        assert_eq!(scene.light(b).map(|l| l.name.as_str()), Some("b"));

        let c = scene.add_light(Light::point("c", Point3::new(0.0, 1.0, 0.0), 4.0));
        assert_ne!(c, a);
        assert_eq!(scene.lights().len(), 2);
    }

    #[test]
    fn test_empty_scene_has_no_bounds() {
        assert!(Scene::new().world_bounds().is_none());
    }
}
