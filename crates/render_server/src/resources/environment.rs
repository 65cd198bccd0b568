//! # Environment Store
//!
//! Environments are pure value data: a background mode plus ambient, glow,
//! fog, tone-mapping and adjustment parameter blocks. Every block is replaced
//! as a whole.

use crate::error::ServerResult;
use crate::foundation::math::Color;
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// What fills the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnvironmentBg {
    /// Server default clear color
    #[default]
    ClearColor,
    /// Environment background color
    Color,
    /// Skybox
    Skybox,
    /// A canvas layer
    Canvas,
    /// Leave the previous contents
    Keep,
}

/// How glow combines with the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GlowBlendMode {
    /// Add
    #[default]
    Additive,
    /// Screen
    Screen,
    /// Soft light
    Softlight,
    /// Glow computed but not blended
    Disabled,
}

/// Tone mapping curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneMapper {
    /// Linear
    #[default]
    Linear,
    /// Logarithmic
    Log,
    /// Reinhard
    Reinhardt,
    /// Filmic
    Filmic,
    /// ACES filmic
    AcesFilmic,
}

/// Ambient light block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// Color
    pub color: Color,
    /// Energy
    pub energy: f32,
    /// Fraction taken from the skybox
    pub skybox_contribution: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self { color: Color::BLACK, energy: 1.0, skybox_contribution: 0.0 }
    }
}

/// Glow block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowSettings {
    /// Enabled
    pub enabled: bool,
    /// Blur radius in passes
    pub radius: u32,
    /// Intensity
    pub intensity: f32,
    /// Strength
    pub strength: f32,
    /// Luminance above which pixels bloom
    pub bloom_threshold: f32,
    /// Blend mode
    pub blend_mode: GlowBlendMode,
}

impl Default for GlowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 4,
            intensity: 0.3,
            strength: 1.0,
            bloom_threshold: 1.0,
            blend_mode: GlowBlendMode::Additive,
        }
    }
}

/// Fog block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FogSettings {
    /// Enabled
    pub enabled: bool,
    /// Start distance
    pub begin: f32,
    /// Full-density distance
    pub end: f32,
    /// Color gradient texture
    pub gradient_texture: Rid,
}

/// Tone mapping block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMapSettings {
    /// Auto exposure enabled
    pub enabled: bool,
    /// Exposure
    pub exposure: f32,
    /// White point
    pub white: f32,
    /// Auto exposure lower bound
    pub min_luminance: f32,
    /// Auto exposure upper bound
    pub max_luminance: f32,
    /// Auto exposure adaptation speed
    pub auto_exposure_speed: f32,
    /// Auto exposure scale
    pub auto_exposure_scale: f32,
    /// Curve
    pub tone_mapper: ToneMapper,
}

impl Default for ToneMapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            exposure: 1.0,
            white: 1.0,
            min_luminance: 0.2,
            max_luminance: 8.0,
            auto_exposure_speed: 0.2,
            auto_exposure_scale: 0.4,
            tone_mapper: ToneMapper::Linear,
        }
    }
}

/// Color adjustment block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentSettings {
    /// Enabled
    pub enabled: bool,
    /// Brightness multiplier
    pub brightness: f32,
    /// Contrast multiplier
    pub contrast: f32,
    /// Saturation multiplier
    pub saturation: f32,
    /// Color correction ramp texture
    pub ramp: Rid,
}

impl Default for AdjustmentSettings {
    fn default() -> Self {
        Self { enabled: false, brightness: 1.0, contrast: 1.0, saturation: 1.0, ramp: Rid::empty() }
    }
}

/// Environment record
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    /// Background mode
    pub background: EnvironmentBg,
    /// Skybox for [`EnvironmentBg::Skybox`]
    pub skybox: Rid,
    /// Skybox scale
    pub skybox_scale: f32,
    /// Color for [`EnvironmentBg::Color`]
    pub bg_color: Color,
    /// Background energy
    pub bg_energy: f32,
    /// Highest canvas layer drawn as background for [`EnvironmentBg::Canvas`]
    pub canvas_max_layer: i32,
    /// Ambient block
    pub ambient: AmbientLight,
    /// Glow block
    pub glow: GlowSettings,
    /// Fog block
    pub fog: FogSettings,
    /// Tone mapping block
    pub tonemap: ToneMapSettings,
    /// Adjustment block
    pub adjustment: AdjustmentSettings,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            background: EnvironmentBg::ClearColor,
            skybox: Rid::empty(),
            skybox_scale: 1.0,
            bg_color: Color::BLACK,
            bg_energy: 1.0,
            canvas_max_layer: 0,
            ambient: AmbientLight::default(),
            glow: GlowSettings::default(),
            fog: FogSettings::default(),
            tonemap: ToneMapSettings::default(),
            adjustment: AdjustmentSettings::default(),
        }
    }
}

impl RenderServer {
    /// Create an environment with default blocks
    pub fn environment_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Environment);
        self.environments.insert(rid, Environment::default());
        rid
    }

    /// Set the background mode
    pub fn environment_set_background(&mut self, env: Rid, background: EnvironmentBg) -> ServerResult<()> {
        self.environments.get_mut(env)?.background = background;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set or clear (empty handle) the skybox
    pub fn environment_set_skybox(&mut self, env: Rid, skybox: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(skybox, ResourceKind::Skybox)?;
        self.environments.get_mut(env)?.skybox = skybox;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the skybox scale
    pub fn environment_set_skybox_scale(&mut self, env: Rid, scale: f32) -> ServerResult<()> {
        self.environments.get_mut(env)?.skybox_scale = scale;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the background color
    pub fn environment_set_bg_color(&mut self, env: Rid, color: Color) -> ServerResult<()> {
        self.environments.get_mut(env)?.bg_color = color;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the background energy
    pub fn environment_set_bg_energy(&mut self, env: Rid, energy: f32) -> ServerResult<()> {
        self.environments.get_mut(env)?.bg_energy = energy;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the highest canvas layer drawn as background
    pub fn environment_set_canvas_max_layer(&mut self, env: Rid, max_layer: i32) -> ServerResult<()> {
        self.environments.get_mut(env)?.canvas_max_layer = max_layer;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Replace the ambient block
    pub fn environment_set_ambient_light(&mut self, env: Rid, ambient: AmbientLight) -> ServerResult<()> {
        self.environments.get_mut(env)?.ambient = ambient;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Replace the glow block
    pub fn environment_set_glow(&mut self, env: Rid, glow: GlowSettings) -> ServerResult<()> {
        self.environments.get_mut(env)?.glow = glow;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Replace the fog block
    pub fn environment_set_fog(&mut self, env: Rid, fog: FogSettings) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(fog.gradient_texture, ResourceKind::Texture)?;
        self.environments.get_mut(env)?.fog = fog;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Replace the tone mapping block
    pub fn environment_set_tonemap(&mut self, env: Rid, tonemap: ToneMapSettings) -> ServerResult<()> {
        self.environments.get_mut(env)?.tonemap = tonemap;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Replace the adjustment block
    pub fn environment_set_adjustment(&mut self, env: Rid, adjustment: AdjustmentSettings) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(adjustment.ramp, ResourceKind::Texture)?;
        self.environments.get_mut(env)?.adjustment = adjustment;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Environment record
    pub fn environment(&self, env: Rid) -> ServerResult<&Environment> {
        self.environments.get(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;

    #[test]
    fn test_environment_blocks() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let env = vs.environment_create();

        vs.environment_set_background(env, EnvironmentBg::Color).expect("bg");
        vs.environment_set_glow(env, GlowSettings { enabled: true, ..GlowSettings::default() }).expect("glow");
        vs.environment_set_tonemap(env, ToneMapSettings { tone_mapper: ToneMapper::AcesFilmic, ..Default::default() })
            .expect("tonemap");

        let record = vs.environment(env).expect("env");
        assert_eq!(record.background, EnvironmentBg::Color);
        assert!(record.glow.enabled);
        assert_eq!(record.tonemap.tone_mapper, ToneMapper::AcesFilmic);
    }

    #[test]
    fn test_fog_gradient_must_be_texture() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let env = vs.environment_create();
        let mesh = vs.mesh_create();

        let fog = FogSettings { enabled: true, gradient_texture: mesh, ..FogSettings::default() };
        assert!(vs.environment_set_fog(env, fog).is_err());
        assert!(!vs.environment(env).expect("env").fog.enabled);
    }
}
