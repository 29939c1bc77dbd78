//! Shadow map caching
//!
//! Decides when a light's shadow resource must be reallocated and, under
//! [`ShadowUpdatePolicy::WhenChanged`](super::config::ShadowUpdatePolicy), when a
//! shadow map can be reused without re-rendering. A map is re-rendered when:
//! - the light's position, direction, range or cone changes
//! - any shadow-casting geometry moves, appears or disappears
//! - the map was never rendered or its last render failed

use cgmath::Matrix4;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::shadow_map::ShadowMap;
use super::traversal::{self, DrawSink};
use crate::gfx::resources::material::Material;
use crate::gfx::resources::mesh::Mesh;
use crate::gfx::scene::light::{Light, LightType};
use crate::gfx::scene::Scene;

/// Light parameters a shadow map was rendered with
#[derive(Debug, Clone, PartialEq)]
pub struct LightShadowState {
    pub light_type: LightType,
    pub resolution: u32,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    pub range: f32,
    pub cone_degrees: f32,
}

impl LightShadowState {
    pub fn from_light(light: &Light, resolution: u32) -> Self {
        Self {
            light_type: light.light_type,
            resolution,
            position: light.position.into(),
            direction: light.direction.into(),
            range: light.range,
            cone_degrees: light.cone_angle.0,
        }
    }

    /// True when the depth target itself cannot be reused
    pub fn requires_reallocation(&self, other: &LightShadowState) -> bool {
        self.light_type != other.light_type || self.resolution != other.resolution
    }

    /// Checks if this light state differs significantly from another
    pub fn differs_from(&self, other: &LightShadowState) -> bool {
        const EPSILON: f32 = 0.001;

        if self.requires_reallocation(other) {
            return true;
        }

        let close = |a: f32, b: f32| (a - b).abs() <= EPSILON;
        !(self.position.iter().zip(other.position.iter()).all(|(a, b)| close(*a, *b))
            && self.direction.iter().zip(other.direction.iter()).all(|(a, b)| close(*a, *b))
            && close(self.range, other.range)
            && close(self.cone_degrees, other.cone_degrees))
    }
}

/// Hashes the world transform and mesh of every shadow-casting node
#[derive(Default)]
struct FingerprintSink {
    hasher: DefaultHasher,
    casters: usize,
}

impl DrawSink for FingerprintSink {
    fn submit(&mut self, world: &Matrix4<f32>, mesh: &Mesh, material: &Arc<Material>) {
        if material.is_blended() {
            return;
        }
        let cells: &[f32; 16] = world.as_ref();
        for cell in cells {
            cell.to_bits().hash(&mut self.hasher);
        }
        mesh.handle.hash(&mut self.hasher);
        self.casters += 1;
    }
}

/// Fingerprint of the scene's shadow-casting geometry
pub fn scene_fingerprint(scene: &Scene) -> u64 {
    let mut sink = FingerprintSink::default();
    traversal::render_scene(&mut sink, scene);
    sink.casters.hash(&mut sink.hasher);
    sink.hasher.finish()
}

/// Checks if `map` has to be re-rendered for `state`
///
/// `fingerprint` is `None` when geometry changes are not tracked, which
/// always forces a re-render.
pub fn needs_update(map: &ShadowMap, state: &LightShadowState, fingerprint: Option<u64>) -> bool {
    if !map.is_valid() {
        return true;
    }

    let light_changed = match &map.rendered_state {
        Some(previous) => state.differs_from(previous),
        None => true,
    };
    if light_changed {
        return true;
    }

    match (fingerprint, map.scene_fingerprint) {
        (Some(current), Some(previous)) => current != previous,
        _ => true,
    }
}

/// Counters for shadow map reuse
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShadowCacheStats {
    pub rendered: usize,
    pub reused: usize,
    pub allocated: usize,
    pub reallocated: usize,
    pub rejected: usize,
}
