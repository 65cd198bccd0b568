//! Reflection probe store

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Color, Vec3};
use crate::resources::handle::{ResourceKind, Rid};
use crate::scene::culling::AABB;
use crate::server::RenderServer;

/// When a probe re-captures its surroundings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReflectionProbeUpdateMode {
    /// Capture once
    #[default]
    Once,
    /// Capture every frame
    Always,
}

/// Reflection probe record
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionProbe {
    /// Update policy
    pub update_mode: ReflectionProbeUpdateMode,
    /// Reflection intensity
    pub intensity: f32,
    /// Ambient color used when interior
    pub interior_ambient: Color,
    /// Interior ambient energy
    pub interior_ambient_energy: f32,
    /// How much the captured probe feeds interior ambient
    pub interior_ambient_probe_contribution: f32,
    /// Capture distance
    pub max_distance: f32,
    /// Half size of the influence box
    pub extents: Vec3,
    /// Capture point relative to the box center
    pub origin_offset: Vec3,
    /// Ignore the sky
    pub interior: bool,
    /// Parallax-correct reflections against the box
    pub box_projection: bool,
    /// Render shadows in the capture
    pub enable_shadows: bool,
    /// Layers captured
    pub cull_mask: u32,
}

impl Default for ReflectionProbe {
    fn default() -> Self {
        Self {
            update_mode: ReflectionProbeUpdateMode::Once,
            intensity: 1.0,
            interior_ambient: Color::BLACK,
            interior_ambient_energy: 1.0,
            interior_ambient_probe_contribution: 0.0,
            max_distance: 0.0,
            extents: Vec3::new(1.0, 1.0, 1.0),
            origin_offset: Vec3::zeros(),
            interior: false,
            box_projection: false,
            enable_shadows: false,
            cull_mask: u32::MAX,
        }
    }
}

impl ReflectionProbe {
    /// Influence box around the origin offset
    pub fn aabb(&self) -> AABB {
        AABB::from_center_extents(self.origin_offset, self.extents)
    }
}

macro_rules! probe_setters {
    ($($(#[$doc:meta])* $name:ident($field:ident: $ty:ty);)*) => {
        impl RenderServer {
            $(
                $(#[$doc])*
                pub fn $name(&mut self, probe: Rid, value: $ty) -> ServerResult<()> {
                    self.reflection_probes.get_mut(probe)?.$field = value;
                    self.mark_resources_dirty();
                    Ok(())
                }
            )*
        }
    };
}

probe_setters! {
    /// Set the update policy
    reflection_probe_set_update_mode(update_mode: ReflectionProbeUpdateMode);
    /// Set the reflection intensity
    reflection_probe_set_intensity(intensity: f32);
    /// Set the interior ambient color
    reflection_probe_set_interior_ambient(interior_ambient: Color);
    /// Set the interior ambient energy
    reflection_probe_set_interior_ambient_energy(interior_ambient_energy: f32);
    /// Set how much the probe feeds interior ambient
    reflection_probe_set_interior_ambient_probe_contribution(interior_ambient_probe_contribution: f32);
    /// Set the capture distance
    reflection_probe_set_max_distance(max_distance: f32);
    /// Set the capture point offset
    reflection_probe_set_origin_offset(origin_offset: Vec3);
    /// Toggle interior mode
    reflection_probe_set_as_interior(interior: bool);
    /// Toggle box projection
    reflection_probe_set_enable_box_projection(box_projection: bool);
    /// Toggle shadows in the capture
    reflection_probe_set_enable_shadows(enable_shadows: bool);
    /// Set the captured layers
    reflection_probe_set_cull_mask(cull_mask: u32);
}

impl RenderServer {
    /// Create a probe with a unit influence box
    pub fn reflection_probe_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::ReflectionProbe);
        self.reflection_probes.insert(rid, ReflectionProbe::default());
        rid
    }

    /// Set the influence box half size; every component must be non-negative
    pub fn reflection_probe_set_extents(&mut self, probe: Rid, extents: Vec3) -> ServerResult<()> {
        if extents.iter().any(|&e| e < 0.0) {
            return Err(ServerError::invalid_state(format!("probe extents must be non-negative, got {extents:?}")));
        }
        self.reflection_probes.get_mut(probe)?.extents = extents;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Reflection probe record
    pub fn reflection_probe(&self, probe: Rid) -> ServerResult<&ReflectionProbe> {
        self.reflection_probes.get(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_probe_setters_and_bounds() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let probe = vs.reflection_probe_create();

        vs.reflection_probe_set_update_mode(probe, ReflectionProbeUpdateMode::Always).expect("mode");
        vs.reflection_probe_set_extents(probe, Vec3::new(2.0, 1.0, 1.0)).expect("extents");
        vs.reflection_probe_set_origin_offset(probe, Vec3::new(1.0, 0.0, 0.0)).expect("offset");

        let record = vs.reflection_probe(probe).expect("probe");
        assert_eq!(record.update_mode, ReflectionProbeUpdateMode::Always);
        assert_relative_eq!(record.aabb().min, Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(record.aabb().max, Vec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn test_negative_extents_rejected() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let probe = vs.reflection_probe_create();
        assert!(vs.reflection_probe_set_extents(probe, Vec3::new(-1.0, 1.0, 1.0)).is_err());
        assert_relative_eq!(vs.reflection_probe(probe).expect("probe").extents, Vec3::new(1.0, 1.0, 1.0));
    }
}
