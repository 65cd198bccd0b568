//! # Handle Registry
//!
//! Every server-owned resource is addressed by a [`Rid`]: an opaque handle
//! wrapping a generational slot key. The registry owns identity and liveness
//! only; the typed records live in the per-kind stores.
//!
//! ## Guarantees
//!
//! - A freed slot may be reused, but its generation is bumped, so a stale
//!   handle never resolves to the newer resource.
//! - Each handle records its [`ResourceKind`] and an allocation serial. The
//!   serial is strictly increasing and defines creation order wherever the
//!   server needs a reproducible ordering.

use std::fmt;

use slotmap::{new_key_type, Key, SlotMap};

use crate::error::{ServerError, ServerResult};

new_key_type! {
    /// Generational slot key backing every [`Rid`]
    pub struct RidKey;
}

/// Opaque resource identifier
///
/// Callers must not assume handles are small integers or stable across
/// process restarts. `Rid::default()` is the empty handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rid(RidKey);

impl Rid {
    /// The empty handle, used wherever an optional reference is cleared
    pub fn empty() -> Self {
        Self(RidKey::null())
    }

    /// Whether this is the empty handle
    pub fn is_empty(self) -> bool {
        self.0.is_null()
    }

    pub(crate) fn key(self) -> RidKey {
        self.0
    }
}

impl From<RidKey> for Rid {
    fn from(key: RidKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "#{:?}", self.0.data())
        }
    }
}

/// Every kind of resource the server hands out handles for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Texture or render-target texture
    Texture,
    /// Sky cube-map binding
    Skybox,
    /// Shader program source
    Shader,
    /// Shader parameter set
    Material,
    /// Surface list
    Mesh,
    /// Many placements of one mesh
    Multimesh,
    /// Immediate-mode geometry
    Immediate,
    /// Bone transform table
    Skeleton,
    /// Directional, omni or spot light
    Light,
    /// Reflection probe volume
    ReflectionProbe,
    /// Convex room volume
    Room,
    /// Room-to-room portal
    Portal,
    /// 3D camera
    Camera,
    /// Render target configuration
    Viewport,
    /// Background and post-processing parameters
    Environment,
    /// Instance index with an environment
    Scenario,
    /// Placement of a base resource in a scenario
    Instance,
    /// Root of a 2D draw tree
    Canvas,
    /// Node of a 2D draw tree
    CanvasItem,
    /// 2D light
    CanvasLight,
    /// 2D light occluder placement
    CanvasLightOccluder,
    /// 2D occluder outline
    CanvasOccluderPolygon,
}

impl ResourceKind {
    /// Lowercase human readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Texture => "texture",
            Self::Skybox => "skybox",
            Self::Shader => "shader",
            Self::Material => "material",
            Self::Mesh => "mesh",
            Self::Multimesh => "multimesh",
            Self::Immediate => "immediate",
            Self::Skeleton => "skeleton",
            Self::Light => "light",
            Self::ReflectionProbe => "reflection probe",
            Self::Room => "room",
            Self::Portal => "portal",
            Self::Camera => "camera",
            Self::Viewport => "viewport",
            Self::Environment => "environment",
            Self::Scenario => "scenario",
            Self::Instance => "instance",
            Self::Canvas => "canvas",
            Self::CanvasItem => "canvas item",
            Self::CanvasLight => "canvas light",
            Self::CanvasLightOccluder => "canvas light occluder",
            Self::CanvasOccluderPolygon => "canvas occluder polygon",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kinds of base resource an instance can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceType {
    /// Mesh base
    Mesh,
    /// Multimesh base
    Multimesh,
    /// Immediate geometry base
    Immediate,
    /// Light base
    Light,
    /// Reflection probe base
    ReflectionProbe,
    /// Room base
    Room,
    /// Portal base
    Portal,
}

impl InstanceType {
    /// Map a resource kind to an instance type, `None` if not instantiable
    pub const fn from_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Mesh => Some(Self::Mesh),
            ResourceKind::Multimesh => Some(Self::Multimesh),
            ResourceKind::Immediate => Some(Self::Immediate),
            ResourceKind::Light => Some(Self::Light),
            ResourceKind::ReflectionProbe => Some(Self::ReflectionProbe),
            ResourceKind::Room => Some(Self::Room),
            ResourceKind::Portal => Some(Self::Portal),
            _ => None,
        }
    }

    /// Geometry bases carry materials and cast shadows
    pub const fn is_geometry(self) -> bool {
        matches!(self, Self::Mesh | Self::Multimesh | Self::Immediate)
    }
}

#[derive(Debug, Clone, Copy)]
struct HandleEntry {
    kind: ResourceKind,
    serial: u64,
}

/// Allocates and type-tags handles
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: SlotMap<RidKey, HandleEntry>,
    next_serial: u64,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle tagged with `kind`
    pub fn allocate(&mut self, kind: ResourceKind) -> Rid {
        let serial = self.next_serial;
        self.next_serial += 1;
        let rid = Rid(self.entries.insert(HandleEntry { kind, serial }));
        log::trace!("Allocated {kind} handle {rid} (serial {serial})");
        rid
    }

    /// Invalidate a handle, returning the kind it carried
    pub fn release(&mut self, rid: Rid) -> ServerResult<ResourceKind> {
        self.entries
            .remove(rid.key())
            .map(|entry| entry.kind)
            .ok_or_else(|| ServerError::unknown_handle(rid))
    }

    /// Kind of a live handle
    pub fn kind_of(&self, rid: Rid) -> ServerResult<ResourceKind> {
        self.entries
            .get(rid.key())
            .map(|entry| entry.kind)
            .ok_or_else(|| ServerError::unknown_handle(rid))
    }

    /// Allocation serial of a live handle
    pub fn serial(&self, rid: Rid) -> Option<u64> {
        self.entries.get(rid.key()).map(|entry| entry.serial)
    }

    /// Whether the handle is live
    pub fn is_live(&self, rid: Rid) -> bool {
        self.entries.contains_key(rid.key())
    }

    /// Whether the handle is live and of the given kind
    pub fn is_kind(&self, rid: Rid, kind: ResourceKind) -> bool {
        self.entries.get(rid.key()).is_some_and(|entry| entry.kind == kind)
    }

    /// Fail unless the handle is live and of the given kind
    pub fn expect_kind(&self, rid: Rid, kind: ResourceKind) -> ServerResult<()> {
        if self.is_kind(rid, kind) {
            Ok(())
        } else {
            Err(ServerError::invalid_handle(kind, rid))
        }
    }

    /// Accept the empty handle or a live handle of the given kind
    pub fn expect_kind_or_empty(&self, rid: Rid, kind: ResourceKind) -> ServerResult<()> {
        if rid.is_empty() {
            Ok(())
        } else {
            self.expect_kind(rid, kind)
        }
    }

    /// Live handles of one kind in creation order
    pub fn handles_of_kind(&self, kind: ResourceKind) -> Vec<Rid> {
        let mut handles: Vec<(u64, Rid)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(key, entry)| (entry.serial, Rid(key)))
            .collect();
        handles.sort_unstable_by_key(|(serial, _)| *serial);
        handles.into_iter().map(|(_, rid)| rid).collect()
    }

    /// Number of live handles
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_tags_kind() {
        let mut registry = HandleRegistry::new();
        let texture = registry.allocate(ResourceKind::Texture);
        let mesh = registry.allocate(ResourceKind::Mesh);

        assert_eq!(registry.kind_of(texture), Ok(ResourceKind::Texture));
        assert_eq!(registry.kind_of(mesh), Ok(ResourceKind::Mesh));
        assert!(registry.expect_kind(mesh, ResourceKind::Texture).is_err());
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_released_handle_never_aliases() {
        let mut registry = HandleRegistry::new();
        let first = registry.allocate(ResourceKind::Material);
        registry.release(first).expect("release");

        let second = registry.allocate(ResourceKind::Material);
        assert_ne!(first, second);
        assert!(!registry.is_live(first));
        assert!(registry.kind_of(first).is_err());
        assert!(registry.release(first).is_err());
    }

    #[test]
    fn test_serial_defines_creation_order() {
        let mut registry = HandleRegistry::new();
        let a = registry.allocate(ResourceKind::Scenario);
        let _ = registry.allocate(ResourceKind::Mesh);
        let b = registry.allocate(ResourceKind::Scenario);
        registry.release(a).expect("release");
        let c = registry.allocate(ResourceKind::Scenario);

        assert_eq!(registry.handles_of_kind(ResourceKind::Scenario), vec![b, c]);
        assert!(registry.serial(b) < registry.serial(c));
    }

    #[test]
    fn test_empty_handle() {
        let registry = HandleRegistry::new();
        assert!(Rid::default().is_empty());
        assert!(!registry.is_live(Rid::empty()));
        assert!(registry.expect_kind_or_empty(Rid::empty(), ResourceKind::Camera).is_ok());
        assert!(registry.expect_kind(Rid::empty(), ResourceKind::Camera).is_err());
    }

    #[test]
    fn test_instance_type_mapping() {
        assert_eq!(InstanceType::from_kind(ResourceKind::Mesh), Some(InstanceType::Mesh));
        assert_eq!(InstanceType::from_kind(ResourceKind::Texture), None);
        assert!(InstanceType::Immediate.is_geometry());
        assert!(!InstanceType::Light.is_geometry());
    }
}
