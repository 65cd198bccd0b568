//! # Instance Graph
//!
//! An instance places one base resource (mesh, multimesh, immediate, light,
//! reflection probe, room or portal) into a scenario with a transform and
//! per-placement overrides. Every reference an instance holds is a plain
//! handle; reads check liveness and treat a freed target as absent.
//!
//! ## Culling
//!
//! The `instances_cull_*` queries read the published frame, not the live
//! records, so they only see what the last [`RenderServer::sync`] published.
//! They walk every instance linearly and are meant for tooling and editor
//! picking rather than per-frame gameplay loops.

use bitflags::bitflags;

use crate::error::{check_index, ServerError, ServerResult};
use crate::foundation::math::{Transform, Vec3};
use crate::frame::snapshot::{CulledInstance, SurfaceDraw};
use crate::resources::handle::{InstanceType, ResourceKind, Rid};
use crate::scene::culling::{ConvexVolume, CullShape, AABB};
use crate::server::RenderServer;

bitflags! {
    /// Per-instance geometry flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// Drawn at all
        const VISIBLE = 1 << 0;
        /// Always faces the camera
        const BILLBOARD = 1 << 1;
        /// Faces the camera around Y only
        const BILLBOARD_FIX_Y = 1 << 2;
        /// Casts shadows
        const CAST_SHADOW = 1 << 3;
        /// Scales with depth
        const DEPTH_SCALE = 1 << 4;
        /// Ignores room visibility
        const VISIBLE_IN_ALL_ROOMS = 1 << 5;
        /// Uses baked lighting
        const USE_BAKED_LIGHT = 1 << 6;
    }
}

impl Default for InstanceFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::CAST_SHADOW
    }
}

/// Shadow casting behavior of geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowCasting {
    /// No shadows
    Off,
    /// Front faces cast
    #[default]
    On,
    /// Both faces cast
    DoubleSided,
    /// Casts but is not drawn
    ShadowsOnly,
}

/// Identity of the higher-level object an instance stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Distance range in which an instance is drawn
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawRange {
    /// Start distance
    pub min: f32,
    /// End distance
    pub max: f32,
    /// Fade-in margin
    pub min_margin: f32,
    /// Fade-out margin
    pub max_margin: f32,
}

/// Instance record
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Base resource
    pub base: Rid,
    /// Kind of the base, `None` without one
    pub base_type: Option<InstanceType>,
    /// Scenario indexing this instance
    pub scenario: Rid,
    /// World transform
    pub transform: Transform,
    /// Render layers
    pub layer_mask: u32,
    /// Identity reported by culling queries
    pub object_id: Option<ObjectId>,
    /// Morph target weights of a mesh or multimesh base
    pub morph_weights: Vec<f32>,
    /// Per-surface material overrides of a mesh base
    pub surface_materials: Vec<Rid>,
    /// Skeleton driving a mesh base
    pub skeleton: Rid,
    /// Outside every room
    pub exterior: bool,
    /// Room the instance belongs to
    pub room: Rid,
    /// Growth applied to the culling bounds
    pub extra_margin: f32,
    /// Geometry flags
    pub flags: InstanceFlags,
    /// Shadow casting
    pub shadow_casting: ShadowCasting,
    /// Material replacing every surface material
    pub material_override: Rid,
    /// Visibility distance range
    pub draw_range: DrawRange,
    /// Instance this one is a level of detail of
    pub lod_of: Rid,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            base: Rid::empty(),
            base_type: None,
            scenario: Rid::empty(),
            transform: Transform::identity(),
            layer_mask: 1,
            object_id: None,
            morph_weights: Vec::new(),
            surface_materials: Vec::new(),
            skeleton: Rid::empty(),
            exterior: false,
            room: Rid::empty(),
            extra_margin: 0.0,
            flags: InstanceFlags::default(),
            shadow_casting: ShadowCasting::default(),
            material_override: Rid::empty(),
            draw_range: DrawRange::default(),
            lod_of: Rid::empty(),
        }
    }
}

impl RenderServer {
    /// Create an inert instance with no base and no scenario
    pub fn instance_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Instance);
        self.instances.insert(rid, Instance::default());
        rid
    }

    /// Create an instance already placed in `scenario` with `base`
    pub fn instance_create2(&mut self, base: Rid, scenario: Rid) -> ServerResult<Rid> {
        self.instantiable_type(base)?;
        self.registry.expect_kind_or_empty(scenario, ResourceKind::Scenario)?;
        let instance = self.instance_create();
        self.instance_set_base(instance, base)?;
        self.instance_set_scenario(instance, scenario)?;
        Ok(instance)
    }

    /// Set the base resource; the empty handle clears it
    ///
    /// Per-surface materials are reset to the base mesh's surface count and
    /// morph weights to its morph target count.
    pub fn instance_set_base(&mut self, instance: Rid, base: Rid) -> ServerResult<()> {
        let base_type = self.instantiable_type(base)?;
        self.instances.get(instance)?;

        let (surfaces, morphs) = match base_type {
            Some(InstanceType::Mesh) => self
                .meshes
                .resolve(base)
                .map_or((0, 0), |mesh| (mesh.surfaces.len(), mesh.morph_target_count)),
            Some(InstanceType::Multimesh) => (0, self.multimesh_morph_count(base)),
            _ => (0, 0),
        };

        let record = self.instances.get_mut(instance)?;
        record.base = base;
        record.base_type = base_type;
        record.surface_materials = vec![Rid::empty(); surfaces];
        record.morph_weights = vec![0.0; morphs];
        if base_type != Some(InstanceType::Mesh) {
            record.skeleton = Rid::empty();
        }
        if !base_type.is_some_and(InstanceType::is_geometry) {
            record.material_override = Rid::empty();
        }
        log::trace!("Instance {instance} base set to {base}");
        self.mark_staged();
        Ok(())
    }

    /// Live base resource, `None` when unset or freed
    pub fn instance_get_base(&self, instance: Rid) -> ServerResult<Option<Rid>> {
        let base = self.instances.get(instance)?.base;
        Ok(self.registry.is_live(base).then_some(base))
    }

    /// Move the instance between scenario indices; the empty handle removes it from culling
    pub fn instance_set_scenario(&mut self, instance: Rid, scenario: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(scenario, ResourceKind::Scenario)?;
        let record = self.instances.get_mut(instance)?;
        if record.scenario == scenario {
            return Ok(());
        }
        let previous = std::mem::replace(&mut record.scenario, scenario);
        if let Some(old) = self.scenarios.resolve_mut(previous) {
            old.instances.remove(&instance);
        }
        if let Some(new) = self.scenarios.resolve_mut(scenario) {
            new.instances.insert(instance);
        }
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the identity reported by culling queries
    pub fn instance_attach_object_id(&mut self, instance: Rid, id: Option<ObjectId>) -> ServerResult<()> {
        self.instances.get_mut(instance)?.object_id = id;
        self.mark_staged();
        Ok(())
    }

    /// Set the world transform
    pub fn instance_set_transform(&mut self, instance: Rid, transform: Transform) -> ServerResult<()> {
        self.instances.get_mut(instance)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set the render layers
    pub fn instance_set_layer_mask(&mut self, instance: Rid, mask: u32) -> ServerResult<()> {
        self.instances.get_mut(instance)?.layer_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Set one morph target weight; the base must be a mesh or multimesh
    pub fn instance_set_morph_target_weight(&mut self, instance: Rid, index: usize, weight: f32) -> ServerResult<()> {
        let record = self.instances.get(instance)?;
        let count = match record.base_type {
            Some(InstanceType::Mesh) => self.meshes.resolve(record.base).map_or(0, |mesh| mesh.morph_target_count),
            Some(InstanceType::Multimesh) => self.multimesh_morph_count(record.base),
            _ => {
                return Err(ServerError::invalid_state(format!(
                    "morph weights need a mesh or multimesh base on instance {instance}"
                )))
            }
        };
        check_index("morph target", index, count)?;

        let record = self.instances.get_mut(instance)?;
        if record.morph_weights.len() < count {
            record.morph_weights.resize(count, 0.0);
        }
        record.morph_weights[index] = weight;
        self.mark_staged();
        Ok(())
    }

    /// Override one surface's material; the base must be a mesh
    pub fn instance_set_surface_material(&mut self, instance: Rid, surface: usize, material: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(material, ResourceKind::Material)?;
        let count = self.instance_mesh_surface_count(instance)?.ok_or_else(|| {
            ServerError::invalid_state(format!("surface materials need a mesh base on instance {instance}"))
        })?;
        check_index("surface", surface, count)?;

        let record = self.instances.get_mut(instance)?;
        if record.surface_materials.len() < count {
            record.surface_materials.resize(count, Rid::empty());
        }
        record.surface_materials[surface] = material;
        self.mark_staged();
        Ok(())
    }

    /// Surface material override, `None` when unset or freed
    ///
    /// A non-mesh base reads as no override.
    pub fn instance_get_surface_material(&self, instance: Rid, surface: usize) -> ServerResult<Option<Rid>> {
        let Some(count) = self.instance_mesh_surface_count(instance)? else {
            return Ok(None);
        };
        check_index("surface", surface, count)?;
        let material = self
            .instances
            .get(instance)?
            .surface_materials
            .get(surface)
            .copied()
            .unwrap_or_default();
        Ok(self.materials.contains(material).then_some(material))
    }

    /// Attach or detach (empty handle) a skeleton; the base must be a mesh
    pub fn instance_attach_skeleton(&mut self, instance: Rid, skeleton: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(skeleton, ResourceKind::Skeleton)?;
        let record = self.instances.get_mut(instance)?;
        if record.base_type != Some(InstanceType::Mesh) {
            return Err(ServerError::invalid_state(format!(
                "skeletons attach only to mesh instances, {instance} has {:?}",
                record.base_type
            )));
        }
        record.skeleton = skeleton;
        self.mark_staged();
        Ok(())
    }

    /// Live attached skeleton
    pub fn instance_get_skeleton(&self, instance: Rid) -> ServerResult<Option<Rid>> {
        let skeleton = self.instances.get(instance)?.skeleton;
        Ok(self.skeletons.contains(skeleton).then_some(skeleton))
    }

    /// Mark as outside every room
    pub fn instance_set_exterior(&mut self, instance: Rid, exterior: bool) -> ServerResult<()> {
        self.instances.get_mut(instance)?.exterior = exterior;
        self.mark_staged();
        Ok(())
    }

    /// Assign to a room; the empty handle clears it
    pub fn instance_set_room(&mut self, instance: Rid, room: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(room, ResourceKind::Room)?;
        self.instances.get_mut(instance)?.room = room;
        self.mark_staged();
        Ok(())
    }

    /// Grow the culling bounds by `margin`
    pub fn instance_set_extra_visibility_margin(&mut self, instance: Rid, margin: f32) -> ServerResult<()> {
        if margin < 0.0 {
            return Err(ServerError::invalid_state(format!("visibility margin must be non-negative, got {margin}")));
        }
        self.instances.get_mut(instance)?.extra_margin = margin;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear geometry flags
    pub fn instance_geometry_set_flag(&mut self, instance: Rid, flag: InstanceFlags, enabled: bool) -> ServerResult<()> {
        self.instances.get_mut(instance)?.flags.set(flag, enabled);
        self.mark_staged();
        Ok(())
    }

    /// Set shadow casting; the base must be geometry
    pub fn instance_geometry_set_cast_shadows_setting(&mut self, instance: Rid, setting: ShadowCasting) -> ServerResult<()> {
        let record = self.geometry_instance_mut(instance)?;
        record.shadow_casting = setting;
        record.flags.set(InstanceFlags::CAST_SHADOW, setting != ShadowCasting::Off);
        self.mark_staged();
        Ok(())
    }

    /// Replace every surface material; the base must be geometry
    pub fn instance_geometry_set_material_override(&mut self, instance: Rid, material: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(material, ResourceKind::Material)?;
        self.geometry_instance_mut(instance)?.material_override = material;
        self.mark_staged();
        Ok(())
    }

    /// Set the visibility distance range
    pub fn instance_geometry_set_draw_range(&mut self, instance: Rid, range: DrawRange) -> ServerResult<()> {
        if range.max > 0.0 && range.max < range.min {
            return Err(ServerError::invalid_state(format!(
                "draw range max {} below min {}",
                range.max, range.min
            )));
        }
        self.instances.get_mut(instance)?.draw_range = range;
        self.mark_staged();
        Ok(())
    }

    /// Make `instance` a level of detail of `lod_of`; the empty handle clears the link
    ///
    /// The link is stored as given. Chains are not checked for cycles; use
    /// [`Self::instance_lod_chain`] to walk them with a depth bound.
    pub fn instance_geometry_set_as_instance_lod(&mut self, instance: Rid, lod_of: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(lod_of, ResourceKind::Instance)?;
        if lod_of == instance {
            return Err(ServerError::invalid_state(format!("instance {instance} cannot be its own LOD")));
        }
        self.instances.get_mut(instance)?.lod_of = lod_of;
        self.mark_staged();
        Ok(())
    }

    /// Follow LOD links from `instance`, at most `max_depth` steps
    ///
    /// Stops at the first unset or freed link. The result does not include
    /// `instance` itself.
    pub fn instance_lod_chain(&self, instance: Rid, max_depth: usize) -> ServerResult<Vec<Rid>> {
        let mut current = self.instances.get(instance)?.lod_of;
        let mut chain = Vec::new();
        while chain.len() < max_depth {
            let Some(record) = self.instances.resolve(current) else {
                break;
            };
            chain.push(current);
            current = record.lod_of;
        }
        Ok(chain)
    }

    /// Instance record
    pub fn instance(&self, instance: Rid) -> ServerResult<&Instance> {
        self.instances.get(instance)
    }

    /// Live world bounds; `None` when the base is unset, freed or has no extent
    pub fn instance_get_world_aabb(&self, instance: Rid) -> ServerResult<Option<AABB>> {
        let record = self.instances.get(instance)?;
        Ok(self.instance_world_aabb(record))
    }

    /// Object ids of published instances whose bounds overlap `aabb`
    ///
    /// The empty scenario handle searches every scenario.
    pub fn instances_cull_aabb(&self, aabb: AABB, scenario: Rid) -> ServerResult<Vec<ObjectId>> {
        self.cull_published(&CullShape::Aabb(aabb), scenario)
    }

    /// Object ids of published instances whose bounds the segment `from`..`to` touches
    pub fn instances_cull_ray(&self, from: Vec3, to: Vec3, scenario: Rid) -> ServerResult<Vec<ObjectId>> {
        self.cull_published(&CullShape::Segment { from, to }, scenario)
    }

    /// Object ids of published instances whose bounds touch the convex volume
    pub fn instances_cull_convex(&self, volume: ConvexVolume, scenario: Rid) -> ServerResult<Vec<ObjectId>> {
        self.cull_published(&CullShape::Convex(volume), scenario)
    }

    fn cull_published(&self, shape: &CullShape, scenario: Rid) -> ServerResult<Vec<ObjectId>> {
        self.registry.expect_kind_or_empty(scenario, ResourceKind::Scenario)?;
        let scope = (!scenario.is_empty()).then_some(scenario);
        Ok(self.published.load().cull(shape, scope))
    }

    fn instantiable_type(&self, base: Rid) -> ServerResult<Option<InstanceType>> {
        if base.is_empty() {
            return Ok(None);
        }
        let kind = self.registry.kind_of(base)?;
        InstanceType::from_kind(kind)
            .map(Some)
            .ok_or_else(|| ServerError::unknown_handle(base))
    }

    fn multimesh_morph_count(&self, multimesh: Rid) -> usize {
        self.multimeshes
            .resolve(multimesh)
            .and_then(|mm| self.meshes.resolve(mm.mesh))
            .map_or(0, |mesh| mesh.morph_target_count)
    }

    fn instance_mesh_surface_count(&self, instance: Rid) -> ServerResult<Option<usize>> {
        let record = self.instances.get(instance)?;
        if record.base_type != Some(InstanceType::Mesh) {
            return Ok(None);
        }
        Ok(Some(self.meshes.resolve(record.base).map_or(0, |mesh| mesh.surfaces.len())))
    }

    fn geometry_instance_mut(&mut self, instance: Rid) -> ServerResult<&mut Instance> {
        let record = self.instances.get_mut(instance)?;
        if !record.base_type.is_some_and(InstanceType::is_geometry) {
            return Err(ServerError::invalid_state(format!(
                "instance {instance} has no geometry base ({:?})",
                record.base_type
            )));
        }
        Ok(record)
    }

    pub(crate) fn base_local_aabb(&self, base: Rid, base_type: InstanceType) -> Option<AABB> {
        match base_type {
            InstanceType::Mesh => self.meshes.resolve(base)?.local_aabb(),
            InstanceType::Multimesh => self.multimesh_local_aabb(self.multimeshes.resolve(base)?),
            InstanceType::Immediate => self.immediates.resolve(base)?.aabb(),
            InstanceType::Light => Some(self.lights.resolve(base)?.aabb()),
            InstanceType::ReflectionProbe => Some(self.reflection_probes.resolve(base)?.aabb()),
            InstanceType::Room => self.rooms.resolve(base)?.aabb(),
            InstanceType::Portal => self.portals.resolve(base)?.aabb(),
        }
    }

    pub(crate) fn instance_world_aabb(&self, record: &Instance) -> Option<AABB> {
        let local = self.base_local_aabb(record.base, record.base_type?)?;
        let world = local.transformed(&record.transform.to_matrix());
        Some(if record.extra_margin > 0.0 { world.grow(record.extra_margin) } else { world })
    }

    /// Published form of a placed instance; `None` when it has no live bounds
    pub(crate) fn culled_instance(&self, rid: Rid, record: &Instance) -> Option<CulledInstance> {
        let aabb = self.instance_world_aabb(record)?;
        let base_type = record.base_type?;
        let override_material = self.materials.contains(record.material_override).then_some(record.material_override);
        let surfaces = match base_type {
            InstanceType::Mesh => self
                .meshes
                .resolve(record.base)
                .map(|mesh| {
                    mesh.surfaces
                        .iter()
                        .enumerate()
                        .map(|(i, surface)| {
                            let instance_material = record.surface_materials.get(i).copied().unwrap_or_default();
                            let material = override_material
                                .or_else(|| self.materials.contains(instance_material).then_some(instance_material))
                                .or_else(|| self.materials.contains(surface.material).then_some(surface.material));
                            self.surface_draw(material)
                        })
                        .collect()
                })
                .unwrap_or_default(),
            InstanceType::Immediate => {
                let material = override_material.or_else(|| {
                    let m = self.immediates.resolve(record.base)?.material;
                    self.materials.contains(m).then_some(m)
                });
                vec![self.surface_draw(material)]
            }
            InstanceType::Multimesh => {
                let count = self
                    .multimeshes
                    .resolve(record.base)
                    .and_then(|mm| self.meshes.resolve(mm.mesh))
                    .map_or(0, |mesh| mesh.surfaces.len());
                vec![self.surface_draw(override_material); count]
            }
            _ => Vec::new(),
        };
        let vertex_count = match base_type {
            InstanceType::Mesh => self.meshes.resolve(record.base).map_or(0, |mesh| mesh.vertex_count()),
            InstanceType::Multimesh => self.multimeshes.resolve(record.base).map_or(0, |mm| {
                mm.visible().len() * self.meshes.resolve(mm.mesh).map_or(0, |mesh| mesh.vertex_count())
            }),
            InstanceType::Immediate => self.immediates.resolve(record.base).map_or(0, |im| im.vertex_count()),
            _ => 0,
        };

        Some(CulledInstance {
            instance: rid,
            object_id: record.object_id,
            base: record.base,
            base_type,
            aabb,
            layer_mask: record.layer_mask,
            flags: record.flags,
            shadow_casting: record.shadow_casting,
            vertex_count,
            surfaces,
        })
    }

    fn surface_draw(&self, material: Option<Rid>) -> SurfaceDraw {
        let shader = material
            .and_then(|m| self.materials.resolve(m))
            .map(|m| m.shader)
            .filter(|&s| self.shaders.contains(s));
        SurfaceDraw { material, shader }
    }
}
