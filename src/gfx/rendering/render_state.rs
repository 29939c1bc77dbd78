//! Pipeline state tracking
//!
//! [`RenderState`] is the explicit form of the depth, cull and blend flags that
//! every draw depends on. [`RenderStateManager`] is the only writer: it derives
//! the state a pass needs from the material and pass kind and pushes it to the
//! [`GpuContext`] before the draw.

use crate::gfx::rendering::config::ShadowCulling;
use crate::gfx::rendering::gpu::GpuContext;
use crate::gfx::resources::material::Material;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Disabled,
    /// dst = dst + src
    Additive,
    /// dst = src * src.a + dst * (1 - src.a)
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Equal,
    Always,
}

/// Depth, cull and blend flags for one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub cull: CullMode,
    pub blend: BlendMode,
}

impl RenderState {
    /// Baseline every pass assumes: depth test on, back-face culling, no blending
    pub const DEFAULT: RenderState = RenderState {
        depth_test: true,
        depth_write: true,
        depth_func: DepthFunc::Less,
        cull: CullMode::Back,
        blend: BlendMode::Disabled,
    };

    pub fn culling_enabled(&self) -> bool {
        self.cull != CullMode::None
    }

    pub fn blending_enabled(&self) -> bool {
        self.blend != BlendMode::Disabled
    }

    /// State for a forward pass over `material`
    ///
    /// # Arguments
    /// * `rendering_light` - The pass adds a light's contribution
    /// * `is_first_pass` - The pass establishes colour and depth for the mesh
    pub fn for_material(material: &Material, rendering_light: bool, is_first_pass: bool) -> Self {
        let cull = if material.two_sided {
            CullMode::None
        } else {
            CullMode::Back
        };

        let blend = if material.is_blended() {
            BlendMode::Alpha
        } else if !is_first_pass && rendering_light {
            BlendMode::Additive
        } else {
            BlendMode::Disabled
        };

        // Later passes redraw identical geometry, so they match depth exactly
        let (depth_write, depth_func) = if is_first_pass {
            (true, DepthFunc::Less)
        } else {
            (false, DepthFunc::Equal)
        };

        RenderState {
            depth_test: true,
            depth_write,
            depth_func,
            cull,
            blend,
        }
    }

    /// State for depth-only rendering from a light
    pub fn for_shadow(culling: ShadowCulling) -> Self {
        RenderState {
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            cull: match culling {
                ShadowCulling::None => CullMode::None,
                ShadowCulling::Front => CullMode::Front,
            },
            blend: BlendMode::Disabled,
        }
    }

    /// State for screen-space diagnostic blits
    pub fn for_blit() -> Self {
        RenderState {
            depth_test: false,
            depth_write: false,
            depth_func: DepthFunc::Always,
            cull: CullMode::None,
            blend: BlendMode::Disabled,
        }
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Sole writer of GPU pipeline state.
///
/// Every call re-issues the complete state instead of diffing against what it
/// believes is current, so a pass that left state behind cannot leak into the
/// next one.
#[derive(Debug, Clone)]
pub struct RenderStateManager {
    current: RenderState,
    transitions: u64,
}

impl RenderStateManager {
    pub fn new() -> Self {
        Self {
            current: RenderState::DEFAULT,
            transitions: 0,
        }
    }

    /// The state most recently pushed to the GPU
    pub fn current(&self) -> RenderState {
        self.current
    }

    /// Number of state pushes since creation
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Sets culling, blending and depth for one forward pass over `material`
    pub fn apply_state<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        material: &Material,
        rendering_light: bool,
        is_first_pass: bool,
    ) -> RenderState {
        self.apply(
            gpu,
            RenderState::for_material(material, rendering_light, is_first_pass),
        )
    }

    /// Restores depth test on, back-face culling on, blending off
    pub fn set_default_flags<G: GpuContext + ?Sized>(&mut self, gpu: &mut G) -> RenderState {
        self.apply(gpu, RenderState::DEFAULT)
    }

    pub fn apply_shadow_state<G: GpuContext + ?Sized>(
        &mut self,
        gpu: &mut G,
        culling: ShadowCulling,
    ) -> RenderState {
        self.apply(gpu, RenderState::for_shadow(culling))
    }

    pub fn apply_blit_state<G: GpuContext + ?Sized>(&mut self, gpu: &mut G) -> RenderState {
        self.apply(gpu, RenderState::for_blit())
    }

    fn apply<G: GpuContext + ?Sized>(&mut self, gpu: &mut G, state: RenderState) -> RenderState {
        gpu.set_render_state(&state);
        self.current = state;
        self.transitions += 1;
        state
    }
}

impl Default for RenderStateManager {
    fn default() -> Self {
        Self::new()
    }
}
