//! Prefab node hierarchy
//!
//! A [`Prefab`] is a tree of [`Node`]s. Children are owned, so the hierarchy can
//! never contain cycles, and transforms are always relative to the parent.

use cgmath::{Matrix4, SquareMatrix};
use std::sync::Arc;

use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// Transform relative to the parent node
    pub local: Matrix4<f32>,
    pub mesh: Option<Mesh>,
    pub material: Option<Arc<Material>>,
    /// Hidden nodes are skipped together with their subtree
    pub visible: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            local: Matrix4::identity(),
            mesh: None,
            material: None,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, local: Matrix4<f32>) -> Self {
        self.local = local;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh, material: Arc<Material>) -> Self {
        self.mesh = Some(mesh);
        self.material = Some(material);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Appends a child and returns it for further configuration
    pub fn add_child(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Whether this node emits a draw
    pub fn is_renderable(&self) -> bool {
        self.mesh.is_some() && self.material.is_some()
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Depth-first search by name
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

/// A loaded asset: one node tree with a single root
#[derive(Debug, Clone)]
pub struct Prefab {
    pub name: String,
    pub root: Node,
}

impl Prefab {
    pub fn new(name: &str, root: Node) -> Self {
        Self {
            name: name.to_string(),
            root,
        }
    }

    /// Single-node prefab drawing one mesh
    pub fn from_mesh(name: &str, mesh: Mesh, material: Arc<Material>) -> Self {
        Self::new(name, Node::new(name).with_mesh(mesh, material))
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_construction() {
        let mut root = Node::new("root").with_child(Node::new("a").with_child(Node::new("a1")));
        root.add_child(Node::new("b")).add_child(Node::new("b1"));

        let prefab = Prefab::new("tree", root);
        assert_eq!(prefab.node_count(), 5);
        assert!(prefab.root.find("b1").is_some());
        assert!(prefab.root.find("c").is_none());
        assert!(!prefab.root.is_renderable());
    }
}
