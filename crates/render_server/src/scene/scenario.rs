//! # Scenarios
//!
//! A scenario is an index of the instances placed in it plus the environment
//! settings used when rendering it. It never owns the instances: membership
//! is an insertion-ordered set of handles maintained by
//! [`RenderServer::instance_set_scenario`], and that insertion order is the
//! order culling results come back in.

use crate::error::ServerResult;
use crate::foundation::collections::OrderedSet;
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Debug draw override for a whole scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScenarioDebugMode {
    /// Normal rendering
    #[default]
    Disabled,
    /// Wireframe
    Wireframe,
    /// Additive overdraw visualisation
    Overdraw,
    /// No lighting
    Shadeless,
}

/// Environment a scenario renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentResolution {
    /// The scenario's own environment
    Explicit(Rid),
    /// The fallback environment
    Fallback(Rid),
    /// Nothing set; leave compositing unchanged
    Keep,
}

/// Scenario record
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    /// Debug draw mode
    pub debug: ScenarioDebugMode,
    /// Explicit environment
    pub environment: Rid,
    /// Environment used when no explicit one is live
    pub fallback_environment: Rid,
    /// Reflection atlas edge size
    pub reflection_atlas_size: u32,
    /// Reflection atlas subdivision
    pub reflection_atlas_subdiv: u32,
    /// Instances placed here, in placement order
    pub instances: OrderedSet<Rid>,
}

impl RenderServer {
    /// Create an empty scenario
    pub fn scenario_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Scenario);
        self.scenarios.insert(rid, Scenario::default());
        rid
    }

    /// Set the debug draw mode
    pub fn scenario_set_debug(&mut self, scenario: Rid, mode: ScenarioDebugMode) -> ServerResult<()> {
        self.scenarios.get_mut(scenario)?.debug = mode;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the explicit environment
    pub fn scenario_set_environment(&mut self, scenario: Rid, environment: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(environment, ResourceKind::Environment)?;
        self.scenarios.get_mut(scenario)?.environment = environment;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the fallback environment
    pub fn scenario_set_fallback_environment(&mut self, scenario: Rid, environment: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(environment, ResourceKind::Environment)?;
        self.scenarios.get_mut(scenario)?.fallback_environment = environment;
        self.mark_staged();
        Ok(())
    }

    /// Set the reflection atlas size and subdivision
    pub fn scenario_set_reflection_atlas_size(&mut self, scenario: Rid, size: u32, subdiv: u32) -> ServerResult<()> {
        let record = self.scenarios.get_mut(scenario)?;
        record.reflection_atlas_size = size;
        record.reflection_atlas_subdiv = subdiv;
        self.mark_staged();
        Ok(())
    }

    /// Explicit environment if live, else the fallback if live, else keep
    pub fn scenario_get_environment(&self, scenario: Rid) -> ServerResult<EnvironmentResolution> {
        let record = self.scenarios.get(scenario)?;
        Ok(self.resolve_environment(record))
    }

    /// Instances currently indexed, in placement order
    pub fn scenario_get_instances(&self, scenario: Rid) -> ServerResult<Vec<Rid>> {
        Ok(self.scenarios.get(scenario)?.instances.to_vec())
    }

    /// Scenario record
    pub fn scenario(&self, scenario: Rid) -> ServerResult<&Scenario> {
        self.scenarios.get(scenario)
    }

    pub(crate) fn resolve_environment(&self, record: &Scenario) -> EnvironmentResolution {
        if self.environments.contains(record.environment) {
            EnvironmentResolution::Explicit(record.environment)
        } else if self.environments.contains(record.fallback_environment) {
            EnvironmentResolution::Fallback(record.fallback_environment)
        } else {
            EnvironmentResolution::Keep
        }
    }
}
