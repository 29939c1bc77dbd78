//! Scene graph traversal
//!
//! Walks prefab node trees depth-first in pre-order, composing
//! `world = parent * local` on the way down, and hands every renderable node
//! to a [`DrawSink`]. Shading, depth-only rendering, bounds collection and
//! shadow cache fingerprinting all share this one walk.

use cgmath::Matrix4;
use std::sync::Arc;

use crate::gfx::camera::Aabb;
use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;
use crate::gfx::scene::node::{Node, Prefab};
use crate::gfx::scene::Scene;

/// Receives each renderable node with its accumulated world transform
pub trait DrawSink {
    fn submit(&mut self, world: &Matrix4<f32>, mesh: &Mesh, material: &Arc<Material>);
}

/// Renders every prefab instance of `scene` in insertion order
pub fn render_scene<S: DrawSink + ?Sized>(sink: &mut S, scene: &Scene) {
    for instance in &scene.prefabs {
        render_prefab(sink, &instance.model, &instance.prefab);
    }
}

pub fn render_prefab<S: DrawSink + ?Sized>(sink: &mut S, model: &Matrix4<f32>, prefab: &Prefab) {
    render_node(sink, model, &prefab.root);
}

/// Submits `node` if it has a mesh and material, then recurses into its children
///
/// # Arguments
/// * `sink` - Receiver for renderable nodes
/// * `model` - World transform of the node's parent
/// * `node` - Subtree to walk
pub fn render_node<S: DrawSink + ?Sized>(sink: &mut S, model: &Matrix4<f32>, node: &Node) {
    if !node.visible {
        return;
    }

    let world = model * node.local;

    if let (Some(mesh), Some(material)) = (&node.mesh, &node.material) {
        sink.submit(&world, mesh, material);
    }

    for child in &node.children {
        render_node(sink, &world, child);
    }
}

/// Collects world-space bounds of everything submitted
#[derive(Debug, Default)]
pub struct BoundsSink {
    pub bounds: Option<Aabb>,
}

impl DrawSink for BoundsSink {
    fn submit(&mut self, world: &Matrix4<f32>, mesh: &Mesh, _material: &Arc<Material>) {
        let node_bounds = mesh.bounds.transformed(world);
        self.bounds = Some(match self.bounds {
            Some(bounds) => bounds.union(&node_bounds),
            None => node_bounds,
        });
    }
}
