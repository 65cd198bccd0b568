//! # Light Store
//!
//! Lights keep a fixed table of float parameters indexed by [`LightParam`]
//! plus a handful of toggles. Shadow-mode setters are specific to one light
//! type and fail with an invalid-state error on the others.

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Color, Vec3};
use crate::resources::handle::{ResourceKind, Rid};
use crate::scene::culling::AABB;
use crate::server::RenderServer;

/// Light type, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Infinitely distant light
    Directional,
    /// Point light
    Omni,
    /// Cone light
    Spot,
}

/// Index into the light parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightParam {
    /// Intensity
    Energy,
    /// Specular contribution
    Specular,
    /// Reach of omni and spot lights
    Range,
    /// Distance falloff exponent
    Attenuation,
    /// Spot cone half-angle in degrees
    SpotAngle,
    /// Spot cone edge falloff
    SpotAttenuation,
    /// Distance past which shadows are not drawn
    ShadowMaxDistance,
    /// First directional split offset
    ShadowSplit1Offset,
    /// Second directional split offset
    ShadowSplit2Offset,
    /// Third directional split offset
    ShadowSplit3Offset,
    /// Normal offset bias
    ShadowNormalBias,
    /// Depth bias
    ShadowBias,
    /// Bias scale across splits
    ShadowBiasSplitScale,
}

impl LightParam {
    /// Number of parameters
    pub const COUNT: usize = 13;

    /// Every parameter in table order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Energy,
        Self::Specular,
        Self::Range,
        Self::Attenuation,
        Self::SpotAngle,
        Self::SpotAttenuation,
        Self::ShadowMaxDistance,
        Self::ShadowSplit1Offset,
        Self::ShadowSplit2Offset,
        Self::ShadowSplit3Offset,
        Self::ShadowNormalBias,
        Self::ShadowBias,
        Self::ShadowBiasSplitScale,
    ];

    /// Value a fresh light starts with
    pub const fn default_value(self) -> f32 {
        match self {
            Self::Energy | Self::Range | Self::Attenuation | Self::SpotAttenuation => 1.0,
            Self::Specular => 0.5,
            Self::SpotAngle => 45.0,
            Self::ShadowMaxDistance => 0.0,
            Self::ShadowSplit1Offset | Self::ShadowNormalBias | Self::ShadowBias | Self::ShadowBiasSplitScale => 0.1,
            Self::ShadowSplit2Offset => 0.3,
            Self::ShadowSplit3Offset => 0.6,
        }
    }
}

/// Omni shadow projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OmniShadowMode {
    /// Two paraboloid maps
    #[default]
    DualParaboloid,
    /// Cube map
    Cube,
}

/// Omni shadow map orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OmniShadowDetail {
    /// Split vertically
    #[default]
    Vertical,
    /// Split horizontally
    Horizontal,
}

/// Directional shadow split scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DirectionalShadowMode {
    /// Single orthogonal map
    #[default]
    Orthogonal,
    /// Two parallel splits
    Parallel2Splits,
    /// Four parallel splits
    Parallel4Splits,
}

/// Light record
#[derive(Debug, Clone)]
pub struct Light {
    /// Type
    pub light_type: LightType,
    /// Color
    pub color: Color,
    /// Parameter table indexed by [`LightParam`]
    pub params: [f32; LightParam::COUNT],
    /// Shadow casting enabled
    pub shadow: bool,
    /// Shadow tint
    pub shadow_color: Color,
    /// Projector texture
    pub projector: Rid,
    /// Subtracts light instead of adding it
    pub negative: bool,
    /// Layers lit by this light
    pub cull_mask: u32,
    /// Omni-only shadow projection
    pub omni_shadow_mode: OmniShadowMode,
    /// Omni-only shadow orientation
    pub omni_shadow_detail: OmniShadowDetail,
    /// Directional-only split scheme
    pub directional_shadow_mode: DirectionalShadowMode,
    /// Directional-only split blending
    pub directional_blend_splits: bool,
}

impl Light {
    /// Fresh light of the given type
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            color: Color::WHITE,
            params: LightParam::ALL.map(LightParam::default_value),
            shadow: false,
            shadow_color: Color::BLACK,
            projector: Rid::empty(),
            negative: false,
            cull_mask: u32::MAX,
            omni_shadow_mode: OmniShadowMode::default(),
            omni_shadow_detail: OmniShadowDetail::default(),
            directional_shadow_mode: DirectionalShadowMode::default(),
            directional_blend_splits: false,
        }
    }

    /// Parameter value
    pub fn param(&self, param: LightParam) -> f32 {
        self.params[param as usize]
    }

    /// Local bounds: a large box for directional lights, the range
    /// for omni lights, the cone's box for spot lights
    pub fn aabb(&self) -> AABB {
        let range = self.param(LightParam::Range);
        match self.light_type {
            LightType::Directional => AABB::from_center_extents(Vec3::zeros(), Vec3::new(1000.0, 1000.0, 1000.0)),
            LightType::Omni => AABB::from_center_extents(Vec3::zeros(), Vec3::new(range, range, range)),
            LightType::Spot => {
                let len = self.param(LightParam::SpotAngle).to_radians().tan() * range;
                AABB::from_position_size(Vec3::new(-len, -len, -range), Vec3::new(len * 2.0, len * 2.0, range))
            }
        }
    }

    fn expect_type(&self, light: Rid, expected: LightType) -> ServerResult<()> {
        if self.light_type == expected {
            Ok(())
        } else {
            Err(ServerError::invalid_state(format!(
                "light {light} is {:?}, operation needs {expected:?}",
                self.light_type
            )))
        }
    }
}

impl RenderServer {
    /// Create a light of the given type
    pub fn light_create(&mut self, light_type: LightType) -> Rid {
        let rid = self.allocate(ResourceKind::Light);
        self.lights.insert(rid, Light::new(light_type));
        rid
    }

    /// Light type
    pub fn light_get_type(&self, light: Rid) -> ServerResult<LightType> {
        Ok(self.lights.get(light)?.light_type)
    }

    /// Set the color
    pub fn light_set_color(&mut self, light: Rid, color: Color) -> ServerResult<()> {
        self.lights.get_mut(light)?.color = color;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set one parameter
    pub fn light_set_param(&mut self, light: Rid, param: LightParam, value: f32) -> ServerResult<()> {
        self.lights.get_mut(light)?.params[param as usize] = value;
        self.mark_resources_dirty();
        Ok(())
    }

    /// One parameter
    pub fn light_get_param(&self, light: Rid, param: LightParam) -> ServerResult<f32> {
        Ok(self.lights.get(light)?.param(param))
    }

    /// Toggle shadow casting
    pub fn light_set_shadow(&mut self, light: Rid, enabled: bool) -> ServerResult<()> {
        self.lights.get_mut(light)?.shadow = enabled;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the shadow tint
    pub fn light_set_shadow_color(&mut self, light: Rid, color: Color) -> ServerResult<()> {
        self.lights.get_mut(light)?.shadow_color = color;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set or clear (empty handle) the projector texture
    pub fn light_set_projector(&mut self, light: Rid, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.lights.get_mut(light)?.projector = texture;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Toggle negative lighting
    pub fn light_set_negative(&mut self, light: Rid, enable: bool) -> ServerResult<()> {
        self.lights.get_mut(light)?.negative = enable;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the lit layers
    pub fn light_set_cull_mask(&mut self, light: Rid, mask: u32) -> ServerResult<()> {
        self.lights.get_mut(light)?.cull_mask = mask;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the omni shadow projection
    pub fn light_omni_set_shadow_mode(&mut self, light: Rid, mode: OmniShadowMode) -> ServerResult<()> {
        let record = self.lights.get_mut(light)?;
        record.expect_type(light, LightType::Omni)?;
        record.omni_shadow_mode = mode;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the omni shadow orientation
    pub fn light_omni_set_shadow_detail(&mut self, light: Rid, detail: OmniShadowDetail) -> ServerResult<()> {
        let record = self.lights.get_mut(light)?;
        record.expect_type(light, LightType::Omni)?;
        record.omni_shadow_detail = detail;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the directional split scheme
    pub fn light_directional_set_shadow_mode(&mut self, light: Rid, mode: DirectionalShadowMode) -> ServerResult<()> {
        let record = self.lights.get_mut(light)?;
        record.expect_type(light, LightType::Directional)?;
        record.directional_shadow_mode = mode;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Toggle blending between directional splits
    pub fn light_directional_set_blend_splits(&mut self, light: Rid, enable: bool) -> ServerResult<()> {
        let record = self.lights.get_mut(light)?;
        record.expect_type(light, LightType::Directional)?;
        record.directional_blend_splits = enable;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Light record
    pub fn light(&self, light: Rid) -> ServerResult<&Light> {
        self.lights.get(light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_param_defaults() {
        let light = Light::new(LightType::Omni);
        assert_relative_eq!(light.param(LightParam::Energy), 1.0);
        assert_relative_eq!(light.param(LightParam::Specular), 0.5);
        assert_relative_eq!(light.param(LightParam::SpotAngle), 45.0);
        assert_relative_eq!(light.param(LightParam::ShadowSplit3Offset), 0.6);
    }

    #[test]
    fn test_type_specific_setters() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let omni = vs.light_create(LightType::Omni);
        let sun = vs.light_create(LightType::Directional);

        vs.light_omni_set_shadow_mode(omni, OmniShadowMode::Cube).expect("omni mode");
        assert!(matches!(
            vs.light_omni_set_shadow_mode(sun, OmniShadowMode::Cube),
            Err(ServerError::InvalidState(_))
        ));
        vs.light_directional_set_blend_splits(sun, true).expect("blend");
        assert!(vs.light_directional_set_shadow_mode(omni, DirectionalShadowMode::Parallel4Splits).is_err());
        assert_eq!(vs.light(omni).expect("light").omni_shadow_mode, OmniShadowMode::Cube);
    }

    #[test]
    fn test_light_bounds_follow_range() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let omni = vs.light_create(LightType::Omni);
        vs.light_set_param(omni, LightParam::Range, 4.0).expect("range");

        let aabb = vs.light(omni).expect("light").aabb();
        assert_relative_eq!(aabb.min, Vec3::new(-4.0, -4.0, -4.0));
        assert_relative_eq!(aabb.max, Vec3::new(4.0, 4.0, 4.0));

        let spot = Light::new(LightType::Spot);
        let aabb = spot.aabb();
        assert_relative_eq!(aabb.min.z, -1.0);
        assert_relative_eq!(aabb.max.z, 0.0);
        assert_relative_eq!(aabb.max.x, 1.0, epsilon = 1e-5);
    }
}
