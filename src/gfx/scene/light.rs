//! Light sources
//!
//! A [`Light`] owns its shadow map. The map is allocated lazily by the shadow
//! generator the first time the light casts a shadow and reused across frames
//! until the light type or shadow resolution changes. Clones start without a
//! shadow map, so a GPU target is never owned by two lights.

use cgmath::{Deg, InnerSpace, Point3, Vector3};

use crate::gfx::error::{RenderError, RenderResult};
use crate::gfx::rendering::shadow_map::ShadowMap;

/// Identifier assigned by [`super::Scene::add_light`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Spot,
    Point,
}

impl LightType {
    /// Value the shaders switch on
    pub fn shader_index(self) -> u32 {
        match self {
            LightType::Directional => 0,
            LightType::Spot => 1,
            LightType::Point => 2,
        }
    }

    /// Depth layers needed for this light's shadow map
    pub fn shadow_layers(self) -> u32 {
        match self {
            LightType::Point => 6,
            LightType::Directional | LightType::Spot => 1,
        }
    }
}

#[derive(Debug)]
pub struct Light {
    id: LightId,
    pub name: String,
    pub light_type: LightType,
    /// Ignored by directional lights
    pub position: Point3<f32>,
    /// Ignored by point lights
    pub direction: Vector3<f32>,
    pub color: [f32; 3],
    pub intensity: f32,
    /// Distance at which point and spot lights fade to zero
    pub range: f32,
    /// Half-angle of a spot light's cone
    pub cone_angle: Deg<f32>,
    pub casts_shadow: bool,
    /// Overrides the renderer's default shadow resolution
    pub shadow_resolution: Option<u32>,
    /// Depth offset subtracted before the shadow comparison
    pub shadow_bias: f32,
    pub(crate) shadow: Option<ShadowMap>,
}

impl Clone for Light {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            light_type: self.light_type,
            position: self.position,
            direction: self.direction,
            color: self.color,
            intensity: self.intensity,
            range: self.range,
            cone_angle: self.cone_angle,
            casts_shadow: self.casts_shadow,
            shadow_resolution: self.shadow_resolution,
            shadow_bias: self.shadow_bias,
            shadow: None,
        }
    }
}

impl Light {
    fn with_type(name: &str, light_type: LightType) -> Self {
        Self {
            id: LightId(u32::MAX),
            name: name.to_string(),
            light_type,
            position: Point3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range: 10.0,
            cone_angle: Deg(30.0),
            casts_shadow: false,
            shadow_resolution: None,
            shadow_bias: 0.005,
            shadow: None,
        }
    }

    pub fn directional(name: &str, direction: Vector3<f32>) -> Self {
        Self {
            direction,
            ..Self::with_type(name, LightType::Directional)
        }
    }

    pub fn spot(name: &str, position: Point3<f32>, direction: Vector3<f32>, cone_angle: Deg<f32>) -> Self {
        Self {
            position,
            direction,
            cone_angle,
            ..Self::with_type(name, LightType::Spot)
        }
    }

    pub fn point(name: &str, position: Point3<f32>, range: f32) -> Self {
        Self {
            position,
            range,
            ..Self::with_type(name, LightType::Point)
        }
    }

    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.color = [r, g, b];
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    pub fn with_shadows(mut self, casts_shadow: bool) -> Self {
        self.casts_shadow = casts_shadow;
        self
    }

    pub fn with_shadow_resolution(mut self, resolution: u32) -> Self {
        self.shadow_resolution = Some(resolution);
        self
    }

    pub fn with_shadow_bias(mut self, bias: f32) -> Self {
        self.shadow_bias = bias;
        self
    }

    pub fn id(&self) -> LightId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: LightId) {
        self.id = id;
    }

    /// The light's shadow map, if one has been allocated
    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow.as_ref()
    }

    pub(crate) fn take_shadow_map(&mut self) -> Option<ShadowMap> {
        self.shadow.take()
    }

    /// Colour premultiplied by intensity
    pub fn radiance(&self) -> [f32; 3] {
        self.color.map(|c| c * self.intensity)
    }

    /// Checks that a shadow map can be built for this light
    pub fn validate_shadow_config(&self) -> RenderResult<()> {
        if self.shadow_resolution == Some(0) {
            return Err(RenderError::invalid_light(&self.name, "shadow resolution is zero"));
        }

        if self.light_type != LightType::Point {
            let len = self.direction.magnitude();
            if !len.is_finite() || len < 1e-6 {
                return Err(RenderError::invalid_light(&self.name, "direction has zero length"));
            }
        }

        if self.light_type != LightType::Directional && !(self.range.is_finite() && self.range > 0.0) {
            return Err(RenderError::invalid_light(
                &self.name,
                format!("range must be positive, got {}", self.range),
            ));
        }

        if self.light_type == LightType::Spot && !(self.cone_angle.0 > 0.0 && self.cone_angle.0 < 90.0) {
            return Err(RenderError::invalid_light(
                &self.name,
                format!("cone angle {:?} outside (0, 90) degrees", self.cone_angle),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lights() {
        assert!(Light::directional("sun", Vector3::new(-1.0, -1.0, 0.0))
            .validate_shadow_config()
            .is_ok());
        assert!(Light::point("bulb", Point3::new(0.0, 2.0, 0.0), 5.0)
            .validate_shadow_config()
            .is_ok());
        assert!(Light::spot("torch", Point3::new(0.0, 2.0, 0.0), -Vector3::unit_y(), Deg(25.0))
            .validate_shadow_config()
            .is_ok());
    }

    #[test]
    fn test_invalid_lights() {
        let zero_dir = Light::directional("sun", Vector3::new(0.0, 0.0, 0.0));
        assert!(matches!(
            zero_dir.validate_shadow_config(),
            Err(RenderError::InvalidLightConfiguration { .. })
        ));

        let wide = Light::spot("torch", Point3::new(0.0, 0.0, 0.0), -Vector3::unit_y(), Deg(90.0));
        assert!(wide.validate_shadow_config().is_err());

        let no_range = Light::point("bulb", Point3::new(0.0, 0.0, 0.0), 0.0);
        assert!(no_range.validate_shadow_config().is_err());

        let no_resolution = Light::point("bulb", Point3::new(0.0, 0.0, 0.0), 3.0).with_shadow_resolution(0);
        assert!(no_resolution.validate_shadow_config().is_err());
    }

    #[test]
    fn test_radiance_and_layers() {
        let light = Light::point("bulb", Point3::new(0.0, 0.0, 0.0), 3.0)
            .with_color(1.0, 0.5, 0.0)
            .with_intensity(2.0);
        assert_eq!(light.radiance(), [2.0, 1.0, 0.0]);
        assert_eq!(light.light_type.shadow_layers(), 6);
        assert_eq!(LightType::Spot.shadow_layers(), 1);
    }
}
