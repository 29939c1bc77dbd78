//! Renderer configuration
//!
//! Builder-style settings for shadow generation and draw scheduling. Values can
//! be overlaid from the environment with [`RendererConfig::from_env`].

use log::warn;

/// Face culling used while rendering shadow depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowCulling {
    /// Both faces write depth; acne is handled by the sampling bias
    #[default]
    None,
    /// Only back faces write depth, which pushes the stored depth behind lit
    /// surfaces at the cost of light leaking through thin geometry
    Front,
}

/// When a light's shadow map is re-rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowUpdatePolicy {
    #[default]
    EveryFrame,
    /// Skip lights whose parameters and shadow-casting geometry are unchanged
    WhenChanged,
}

/// Settings shared by every pass of a [`super::renderer::Renderer`]
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Resolution used by lights that do not set their own
    pub default_shadow_resolution: u32,
    pub shadow_culling: ShadowCulling,
    pub shadow_update: ShadowUpdatePolicy,
    /// Skip nodes whose world bounds fall outside the active view
    pub frustum_culling: bool,
    /// Draw blended materials back-to-front after opaque ones
    pub sort_transparent: bool,
    /// Log every shadow pass at info level
    pub shadow_debug: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            default_shadow_resolution: 1024,
            shadow_culling: ShadowCulling::None,
            shadow_update: ShadowUpdatePolicy::EveryFrame,
            frustum_culling: true,
            sort_transparent: true,
            shadow_debug: false,
        }
    }
}

impl RendererConfig {
    pub const RESOLUTION_VAR: &'static str = "UMBRA_SHADOW_RESOLUTION";
    pub const DEBUG_VAR: &'static str = "UMBRA_SHADOW_DEBUG";

    /// Default configuration overlaid with `UMBRA_SHADOW_RESOLUTION` and
    /// `UMBRA_SHADOW_DEBUG`
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(Self::RESOLUTION_VAR) {
            match raw.trim().parse::<u32>() {
                Ok(resolution) if resolution > 0 => self.default_shadow_resolution = resolution,
                _ => warn!("Ignoring {}={:?}: expected a positive integer", Self::RESOLUTION_VAR, raw),
            }
        }
        if let Some(raw) = lookup(Self::DEBUG_VAR) {
            self.shadow_debug = !matches!(raw.trim(), "" | "0" | "false" | "off");
        }
        self
    }

    pub fn with_shadow_resolution(mut self, resolution: u32) -> Self {
        self.default_shadow_resolution = resolution;
        self
    }

    pub fn with_shadow_culling(mut self, culling: ShadowCulling) -> Self {
        self.shadow_culling = culling;
        self
    }

    pub fn with_shadow_update(mut self, policy: ShadowUpdatePolicy) -> Self {
        self.shadow_update = policy;
        self
    }

    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    pub fn with_transparent_sorting(mut self, enabled: bool) -> Self {
        self.sort_transparent = enabled;
        self
    }

    pub fn with_shadow_debug(mut self, enabled: bool) -> Self {
        self.shadow_debug = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> RendererConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RendererConfig::default().with_env_overrides(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_overrides() {
        let config = overrides(&[("UMBRA_SHADOW_RESOLUTION", "2048"), ("UMBRA_SHADOW_DEBUG", "1")]);
        assert_eq!(config.default_shadow_resolution, 2048);
        assert!(config.shadow_debug);

        let config = overrides(&[("UMBRA_SHADOW_RESOLUTION", "zero"), ("UMBRA_SHADOW_DEBUG", "off")]);
        assert_eq!(config.default_shadow_resolution, 1024);
        assert!(!config.shadow_debug);
    }

    #[test]
    fn test_builder() {
        let config = RendererConfig::default()
            .with_shadow_resolution(512)
            .with_shadow_culling(ShadowCulling::Front)
            .with_shadow_update(ShadowUpdatePolicy::WhenChanged)
            .with_frustum_culling(false);
        assert_eq!(config.default_shadow_resolution, 512);
        assert_eq!(config.shadow_culling, ShadowCulling::Front);
        assert_eq!(config.shadow_update, ShadowUpdatePolicy::WhenChanged);
        assert!(!config.frustum_culling);
        assert!(config.sort_transparent);
    }
}
