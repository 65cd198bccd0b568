//! # Render Server
//!
//! [`RenderServer`] owns the handle registry, one store per resource kind and
//! the frame pipeline. Every resource module adds its handle-addressed API
//! to this type in its own `impl RenderServer` block; this file holds the
//! parts that cut across kinds.
//!
//! ## Lifecycle
//!
//! ```text
//! new / headless -> init -> (mutate, sync, draw)* -> finish
//! ```
//!
//! ## Two views
//!
//! Setters change the live stores and are visible to getters immediately.
//! The backend and the culling queries only see the snapshot published by
//! the last [`RenderServer::sync`].

use image::DynamicImage;

use crate::core::ServerConfig;
use crate::defaults::DefaultResources;
use crate::error::{ServerError, ServerResult};
use crate::foundation::logging::init_logging;
use crate::foundation::math::{Color, Rect2, Vec2};
use crate::frame::backend::{HeadlessBackend, RenderBackend};
use crate::frame::pipeline::{FramePhase, FramePipeline};
use crate::frame::snapshot::{BlackBars, FrameReader, FrameSnapshot, PublishedFrame};
use crate::resources::camera::Camera;
use crate::resources::canvas_light::{CanvasLight, CanvasLightOccluder, OccluderPolygon};
use crate::resources::environment::Environment;
use crate::resources::handle::{HandleRegistry, ResourceKind, Rid};
use crate::resources::immediate::Immediate;
use crate::resources::light::Light;
use crate::resources::material::Material;
use crate::resources::mesh::Mesh;
use crate::resources::multimesh::Multimesh;
use crate::resources::reflection_probe::ReflectionProbe;
use crate::resources::room::{Portal, Room};
use crate::resources::shader::Shader;
use crate::resources::skeleton::Skeleton;
use crate::resources::store::Store;
use crate::resources::texture::{Skybox, Texture};
use crate::scene::canvas::{Canvas, CanvasItem, CanvasParent};
use crate::scene::instance::{Instance, InstanceFlags};
use crate::scene::scenario::Scenario;
use crate::scene::viewport::{Viewport, ViewportFlags};

/// Kinds in the order `finish` releases them: users before what they use
const TEARDOWN_ORDER: [ResourceKind; 22] = [
    ResourceKind::Instance,
    ResourceKind::Viewport,
    ResourceKind::CanvasItem,
    ResourceKind::CanvasLightOccluder,
    ResourceKind::CanvasLight,
    ResourceKind::Canvas,
    ResourceKind::CanvasOccluderPolygon,
    ResourceKind::Camera,
    ResourceKind::Immediate,
    ResourceKind::Multimesh,
    ResourceKind::Mesh,
    ResourceKind::Skeleton,
    ResourceKind::Light,
    ResourceKind::ReflectionProbe,
    ResourceKind::Portal,
    ResourceKind::Room,
    ResourceKind::Material,
    ResourceKind::Shader,
    ResourceKind::Environment,
    ResourceKind::Skybox,
    ResourceKind::Texture,
    ResourceKind::Scenario,
];

/// Per-frame and memory counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderInfo {
    /// Instances and canvas items drawn
    ObjectsInFrame,
    /// Vertices drawn
    VerticesInFrame,
    /// Material switches
    MaterialChangesInFrame,
    /// Shader switches
    ShaderChangesInFrame,
    /// Surfaces drawn
    SurfaceChangesInFrame,
    /// Draw calls issued
    DrawCallsInFrame,
    /// Bytes held by textures
    TextureMemUsed,
    /// Bytes held by mesh buffers
    VertexMemUsed,
    /// Texture plus vertex bytes
    VideoMemUsed,
}

/// Optional capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Custom shaders
    Shaders,
    /// Rendering on a thread other than the producer's
    MultiThreaded,
}

/// Hardware cursor slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cursor {
    /// Rotation in radians
    pub rotation: f32,
    /// Cursor image
    pub texture: Rid,
    /// Hot spot offset
    pub center: Vec2,
    /// Region of the texture to use
    pub region: Option<Rect2>,
    /// Shown at all
    pub visible: bool,
    /// Screen position
    pub position: Vec2,
}

/// Image shown before the first frame
#[derive(Debug, Clone)]
pub struct BootImage {
    /// Pixels
    pub image: DynamicImage,
    /// Background color
    pub color: Color,
    /// Scale to fit the screen
    pub scale: bool,
    /// Filter when scaling
    pub filter: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameStats {
    objects: u64,
    vertices: u64,
    material_changes: u64,
    shader_changes: u64,
    surface_changes: u64,
    draw_calls: u64,
}

impl FrameStats {
    fn collect(frame: &FrameSnapshot) -> Self {
        let mut stats = Self::default();
        for viewport in &frame.viewports {
            let show_3d = !viewport.flags.intersects(ViewportFlags::HIDE_SCENARIO | ViewportFlags::DISABLE_3D);
            if let Some(scenario) = viewport.scenario.filter(|_| show_3d).and_then(|rid| frame.scenario(rid)) {
                let cull_mask = viewport.camera.map_or(u32::MAX, |camera| camera.cull_mask);
                let mut material = None;
                let mut shader = None;
                for instance in scenario
                    .instances
                    .iter()
                    .filter(|instance| instance.flags.contains(InstanceFlags::VISIBLE))
                    .filter(|instance| instance.layer_mask & cull_mask != 0)
                {
                    stats.objects += 1;
                    stats.vertices += instance.vertex_count as u64;
                    for surface in &instance.surfaces {
                        stats.surface_changes += 1;
                        stats.draw_calls += 1;
                        if surface.material != material {
                            stats.material_changes += 1;
                            material = surface.material;
                        }
                        if surface.shader != shader {
                            stats.shader_changes += 1;
                            shader = surface.shader;
                        }
                    }
                }
            }

            if viewport.flags.contains(ViewportFlags::HIDE_CANVAS) {
                continue;
            }
            for canvas in viewport.canvases.iter().filter_map(|entry| frame.canvas(entry.canvas)) {
                for item in &canvas.items {
                    stats.objects += 1;
                    stats.draw_calls += item.commands.len() as u64;
                }
            }
        }
        stats
    }
}

/// Handle-indirected scene and resource server
///
/// Construct with [`RenderServer::new`] or [`RenderServer::headless`], then
/// call [`RenderServer::init`] to create the placeholder resources.
pub struct RenderServer {
    pub(crate) config: ServerConfig,
    pub(crate) registry: HandleRegistry,

    pub(crate) textures: Store<Texture>,
    pub(crate) skyboxes: Store<Skybox>,
    pub(crate) shaders: Store<Shader>,
    pub(crate) materials: Store<Material>,
    pub(crate) meshes: Store<Mesh>,
    pub(crate) multimeshes: Store<Multimesh>,
    pub(crate) immediates: Store<Immediate>,
    pub(crate) skeletons: Store<Skeleton>,
    pub(crate) lights: Store<Light>,
    pub(crate) reflection_probes: Store<ReflectionProbe>,
    pub(crate) rooms: Store<Room>,
    pub(crate) portals: Store<Portal>,
    pub(crate) cameras: Store<Camera>,
    pub(crate) environments: Store<Environment>,
    pub(crate) scenarios: Store<Scenario>,
    pub(crate) instances: Store<Instance>,
    pub(crate) viewports: Store<Viewport>,
    pub(crate) canvases: Store<Canvas>,
    pub(crate) canvas_items: Store<CanvasItem>,
    pub(crate) canvas_lights: Store<CanvasLight>,
    pub(crate) canvas_occluders: Store<CanvasLightOccluder>,
    pub(crate) occluder_polygons: Store<OccluderPolygon>,

    pub(crate) pipeline: FramePipeline,
    pub(crate) published: PublishedFrame,
    pub(crate) defaults: Option<DefaultResources>,
    pub(crate) texture_shrink_x2: bool,
    pub(crate) clear_color: Color,

    backend: Box<dyn RenderBackend>,
    cursors: Vec<Cursor>,
    black_bars: BlackBars,
    boot_image: Option<BootImage>,
    frame_stats: FrameStats,
    initialized: bool,
}

impl std::fmt::Debug for RenderServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderServer")
            .field("backend", &self.backend.name())
            .field("live_handles", &self.registry.live_count())
            .field("phase", &self.pipeline.phase())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl RenderServer {
    /// Create a server driving `backend`
    pub fn new(config: ServerConfig, backend: Box<dyn RenderBackend>) -> Self {
        Self {
            registry: HandleRegistry::new(),
            textures: Store::new(ResourceKind::Texture),
            skyboxes: Store::new(ResourceKind::Skybox),
            shaders: Store::new(ResourceKind::Shader),
            materials: Store::new(ResourceKind::Material),
            meshes: Store::new(ResourceKind::Mesh),
            multimeshes: Store::new(ResourceKind::Multimesh),
            immediates: Store::new(ResourceKind::Immediate),
            skeletons: Store::new(ResourceKind::Skeleton),
            lights: Store::new(ResourceKind::Light),
            reflection_probes: Store::new(ResourceKind::ReflectionProbe),
            rooms: Store::new(ResourceKind::Room),
            portals: Store::new(ResourceKind::Portal),
            cameras: Store::new(ResourceKind::Camera),
            environments: Store::new(ResourceKind::Environment),
            scenarios: Store::new(ResourceKind::Scenario),
            instances: Store::new(ResourceKind::Instance),
            viewports: Store::new(ResourceKind::Viewport),
            canvases: Store::new(ResourceKind::Canvas),
            canvas_items: Store::new(ResourceKind::CanvasItem),
            canvas_lights: Store::new(ResourceKind::CanvasLight),
            canvas_occluders: Store::new(ResourceKind::CanvasLightOccluder),
            occluder_polygons: Store::new(ResourceKind::CanvasOccluderPolygon),
            pipeline: FramePipeline::new(),
            published: PublishedFrame::new(),
            defaults: None,
            texture_shrink_x2: config.frame.shrink_textures_x2,
            clear_color: config.frame.default_clear_color,
            backend,
            cursors: vec![Cursor::default(); config.defaults.max_cursors],
            black_bars: BlackBars::default(),
            boot_image: None,
            frame_stats: FrameStats::default(),
            initialized: false,
            config,
        }
    }

    /// Create a server with a [`HeadlessBackend`]
    pub fn headless(config: ServerConfig) -> Self {
        Self::new(config, Box::new(HeadlessBackend::new()))
    }

    /// Configuration the server was built with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether `init` ran without a matching `finish`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn allocate(&mut self, kind: ResourceKind) -> Rid {
        let rid = self.registry.allocate(kind);
        log::debug!("Created {} {}", kind.name(), rid);
        self.mark_resources_dirty();
        rid
    }

    /// Record a scene edit for the next `sync`
    pub(crate) fn mark_staged(&mut self) {
        self.pipeline.stage();
    }

    /// Record a resource edit for the next `sync`
    pub(crate) fn mark_resources_dirty(&mut self) {
        self.pipeline.bump_resources();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Set up logging, the backend and the placeholder resources
    pub fn init(&mut self) -> ServerResult<()> {
        if self.initialized {
            log::warn!("RenderServer::init called twice");
            return Ok(());
        }
        self.config
            .validate()
            .map_err(|err| ServerError::invalid_state(format!("invalid configuration: {err}")))?;
        init_logging(&self.config.logging);

        self.backend.initialize();
        if self.config.defaults.create_on_init {
            let defaults = self.create_default_resources()?;
            self.defaults = Some(defaults);
        }
        self.initialized = true;
        log::info!("RenderServer initialized with {} backend", self.backend.name());
        Ok(())
    }

    /// Release every resource, users before what they use
    pub fn finish(&mut self) {
        self.defaults = None;
        for kind in TEARDOWN_ORDER {
            let handles = self.registry.handles_of_kind(kind);
            let count = handles.len();
            for rid in handles {
                if let Err(err) = self.release(rid, kind) {
                    log::warn!("Teardown of {rid} failed: {err}");
                }
            }
            if count > 0 {
                log::debug!("Released {count} {} handles", kind.name());
            }
        }

        self.backend.shutdown();
        self.cursors = vec![Cursor::default(); self.config.defaults.max_cursors];
        self.black_bars = BlackBars::default();
        self.boot_image = None;
        self.frame_stats = FrameStats::default();
        self.pipeline = FramePipeline::new();
        self.published.publish(FrameSnapshot::default());
        self.initialized = false;
        log::info!("RenderServer finished");
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Kind of a live handle
    pub fn kind_of(&self, rid: Rid) -> ServerResult<ResourceKind> {
        self.registry.kind_of(rid)
    }

    /// Free any resource
    ///
    /// References held elsewhere become absent. Placeholder resources and
    /// viewport render targets cannot be freed directly.
    pub fn free(&mut self, rid: Rid) -> ServerResult<()> {
        let kind = self.registry.kind_of(rid)?;
        if self.defaults.as_ref().is_some_and(|defaults| defaults.contains(rid)) {
            return Err(ServerError::invalid_state(format!("{rid} is a default resource")));
        }
        if let Some(owner) = self.textures.resolve(rid).map(|texture| texture.owner) {
            if self.viewports.contains(owner) {
                return Err(ServerError::invalid_state(format!("{rid} is the render target of viewport {owner}")));
            }
        }
        self.release(rid, kind)
    }

    fn release(&mut self, rid: Rid, kind: ResourceKind) -> ServerResult<()> {
        self.registry.release(rid)?;
        match kind {
            ResourceKind::Texture => {
                self.textures.remove(rid);
            }
            ResourceKind::Skybox => {
                self.skyboxes.remove(rid);
            }
            ResourceKind::Shader => {
                self.shaders.remove(rid);
            }
            ResourceKind::Material => {
                self.materials.remove(rid);
            }
            ResourceKind::Mesh => {
                self.meshes.remove(rid);
            }
            ResourceKind::Multimesh => {
                self.multimeshes.remove(rid);
            }
            ResourceKind::Immediate => {
                self.immediates.remove(rid);
            }
            ResourceKind::Skeleton => {
                self.skeletons.remove(rid);
            }
            ResourceKind::Light => {
                self.lights.remove(rid);
            }
            ResourceKind::ReflectionProbe => {
                self.reflection_probes.remove(rid);
            }
            ResourceKind::Room => {
                self.rooms.remove(rid);
            }
            ResourceKind::Portal => {
                self.portals.remove(rid);
            }
            ResourceKind::Camera => {
                self.cameras.remove(rid);
            }
            ResourceKind::Environment => {
                self.environments.remove(rid);
            }
            ResourceKind::Scenario => {
                if let Some(record) = self.scenarios.remove(rid) {
                    for instance in record.instances.iter() {
                        if let Some(instance) = self.instances.resolve_mut(instance) {
                            instance.scenario = Rid::empty();
                        }
                    }
                }
            }
            ResourceKind::Instance => {
                if let Some(record) = self.instances.remove(rid) {
                    if let Some(scenario) = self.scenarios.resolve_mut(record.scenario) {
                        scenario.instances.remove(&rid);
                    }
                }
            }
            ResourceKind::Viewport => {
                if let Some(record) = self.viewports.remove(rid) {
                    if self.textures.contains(record.render_target) {
                        self.release(record.render_target, ResourceKind::Texture)?;
                    }
                }
            }
            ResourceKind::Canvas => {
                if let Some(record) = self.canvases.remove(rid) {
                    for item in record.items.iter() {
                        if let Some(item) = self.canvas_items.resolve_mut(item) {
                            item.parent = CanvasParent::None;
                        }
                    }
                    for light in record.lights.iter() {
                        if let Some(light) = self.canvas_lights.resolve_mut(light) {
                            light.canvas = Rid::empty();
                        }
                    }
                    for occluder in record.occluders.iter() {
                        if let Some(occluder) = self.canvas_occluders.resolve_mut(occluder) {
                            occluder.canvas = Rid::empty();
                        }
                    }
                }
            }
            ResourceKind::CanvasItem => {
                if let Some(record) = self.canvas_items.remove(rid) {
                    self.detach_canvas_child(record.parent, rid);
                    for child in record.children.iter() {
                        if let Some(child) = self.canvas_items.resolve_mut(child) {
                            child.parent = CanvasParent::None;
                        }
                    }
                }
            }
            ResourceKind::CanvasLight => {
                if let Some(record) = self.canvas_lights.remove(rid) {
                    if let Some(canvas) = self.canvases.resolve_mut(record.canvas) {
                        canvas.lights.remove(&rid);
                    }
                }
            }
            ResourceKind::CanvasLightOccluder => {
                if let Some(record) = self.canvas_occluders.remove(rid) {
                    if let Some(canvas) = self.canvases.resolve_mut(record.canvas) {
                        canvas.occluders.remove(&rid);
                    }
                }
            }
            ResourceKind::CanvasOccluderPolygon => {
                self.occluder_polygons.remove(rid);
            }
        }
        log::debug!("Freed {} {}", kind.name(), rid);
        self.mark_resources_dirty();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frame pipeline
    // ------------------------------------------------------------------

    /// Publish staged state
    ///
    /// Identical content keeps the published revision. Taking the slot's
    /// write lock waits for a reader that is mid-load.
    pub fn sync(&mut self) {
        let current = self.published.load();
        let candidate = self.build_snapshot(self.pipeline.next_revision());
        let changed = !candidate.same_content(&current);
        self.pipeline.publish(changed);
        if changed {
            self.published.publish(candidate);
        }
    }

    /// Execute the published snapshot on the backend
    ///
    /// Viewports drawn in `Once` mode become `Disabled`; `OnlyNextFrame`
    /// clear modes become `Never`. The published snapshot is rewritten the
    /// same way under its revision, so a second draw without `sync` does not
    /// repeat them. Returns the backend's acknowledgement.
    pub fn draw(&mut self) -> bool {
        let frame = self.published.load();
        self.pipeline.begin_execute();
        let acknowledged = self.backend.execute_frame(&frame);
        if !acknowledged {
            log::warn!("Backend '{}' failed frame {}", self.backend.name(), frame.revision);
        }
        self.frame_stats = FrameStats::collect(&frame);
        self.pipeline.end_execute(frame.revision);

        if let Some(rest) = frame.after_one_shot() {
            self.published.publish(rest);
        }
        if self.consume_one_shot_modes(&frame.viewports) {
            self.mark_staged();
        }
        acknowledged
    }

    /// Whether the published snapshot differs from the last drawn one
    pub fn has_changed(&self) -> bool {
        self.pipeline.has_changed()
    }

    /// Current pipeline phase
    pub fn phase(&self) -> FramePhase {
        self.pipeline.phase()
    }

    /// Currently published snapshot
    pub fn published_frame(&self) -> std::sync::Arc<FrameSnapshot> {
        self.published.load()
    }

    /// Reader for a consumer on another thread
    pub fn reader(&self) -> FrameReader {
        self.published.reader()
    }

    // ------------------------------------------------------------------
    // Cursors, black bars, boot image
    // ------------------------------------------------------------------

    fn cursor_mut(&mut self, cursor: usize) -> ServerResult<&mut Cursor> {
        let capacity = self.cursors.len();
        self.cursors
            .get_mut(cursor)
            .ok_or_else(|| ServerError::capacity(format!("cursor {cursor} exceeds {capacity} slots")))
    }

    /// Set cursor rotation
    pub fn cursor_set_rotation(&mut self, cursor: usize, rotation: f32) -> ServerResult<()> {
        self.cursor_mut(cursor)?.rotation = rotation;
        self.mark_staged();
        Ok(())
    }

    /// Set cursor image, hot spot and region
    pub fn cursor_set_texture(&mut self, cursor: usize, texture: Rid, center: Vec2, region: Option<Rect2>) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        let slot = self.cursor_mut(cursor)?;
        slot.texture = texture;
        slot.center = center;
        slot.region = region;
        self.mark_staged();
        Ok(())
    }

    /// Show or hide a cursor
    pub fn cursor_set_visible(&mut self, cursor: usize, visible: bool) -> ServerResult<()> {
        self.cursor_mut(cursor)?.visible = visible;
        self.mark_staged();
        Ok(())
    }

    /// Move a cursor
    pub fn cursor_set_pos(&mut self, cursor: usize, position: Vec2) -> ServerResult<()> {
        self.cursor_mut(cursor)?.position = position;
        self.mark_staged();
        Ok(())
    }

    /// Cursor slot
    pub fn cursor(&self, cursor: usize) -> ServerResult<&Cursor> {
        self.cursors
            .get(cursor)
            .ok_or_else(|| ServerError::capacity(format!("cursor {cursor} exceeds {} slots", self.cursors.len())))
    }

    /// Cursor slots as published, freed images resolved to empty
    pub(crate) fn cursor_frames(&self) -> Vec<Cursor> {
        self.cursors
            .iter()
            .map(|cursor| Cursor {
                texture: if self.textures.contains(cursor.texture) { cursor.texture } else { Rid::empty() },
                ..cursor.clone()
            })
            .collect()
    }

    /// Set letterbox margins in pixels
    pub fn black_bars_set_margins(&mut self, left: i32, top: i32, right: i32, bottom: i32) {
        self.black_bars.margins = [left, top, right, bottom];
        self.mark_staged();
    }

    /// Set letterbox images; empty handles draw plain black
    pub fn black_bars_set_images(&mut self, left: Rid, top: Rid, right: Rid, bottom: Rid) -> ServerResult<()> {
        let images = [left, top, right, bottom];
        for image in images {
            self.registry.expect_kind_or_empty(image, ResourceKind::Texture)?;
        }
        self.black_bars.images = images;
        self.mark_staged();
        Ok(())
    }

    /// Letterboxing with freed images resolved to empty
    pub fn black_bars(&self) -> BlackBars {
        BlackBars {
            margins: self.black_bars.margins,
            images: self
                .black_bars
                .images
                .map(|image| if self.textures.contains(image) { image } else { Rid::empty() }),
        }
    }

    /// Set the image shown before the first frame
    ///
    /// The platform layer reads it through [`RenderServer::boot_image`]
    /// while no snapshot has been drawn; it is not part of [`FrameSnapshot`].
    pub fn set_boot_image(&mut self, image: &DynamicImage, color: Color, scale: bool, filter: bool) {
        self.boot_image = Some(BootImage { image: image.clone(), color, scale, filter });
    }

    /// Boot image, if one was set
    pub fn boot_image(&self) -> Option<&BootImage> {
        self.boot_image.as_ref()
    }

    /// Set the clear color used when no environment overrides it
    pub fn set_default_clear_color(&mut self, color: Color) {
        self.clear_color = color;
        self.mark_staged();
    }

    /// Default clear color
    pub fn default_clear_color(&self) -> Color {
        self.clear_color
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Frame counter from the last draw, or current memory usage
    pub fn get_render_info(&self, info: RenderInfo) -> u64 {
        let texture_bytes = || self.textures.iter().map(|(_, texture)| texture.byte_size() as u64).sum::<u64>();
        let vertex_bytes = || self.meshes.iter().map(|(_, mesh)| mesh.byte_size() as u64).sum::<u64>();
        match info {
            RenderInfo::ObjectsInFrame => self.frame_stats.objects,
            RenderInfo::VerticesInFrame => self.frame_stats.vertices,
            RenderInfo::MaterialChangesInFrame => self.frame_stats.material_changes,
            RenderInfo::ShaderChangesInFrame => self.frame_stats.shader_changes,
            RenderInfo::SurfaceChangesInFrame => self.frame_stats.surface_changes,
            RenderInfo::DrawCallsInFrame => self.frame_stats.draw_calls,
            RenderInfo::TextureMemUsed => texture_bytes(),
            RenderInfo::VertexMemUsed => vertex_bytes(),
            RenderInfo::VideoMemUsed => texture_bytes() + vertex_bytes(),
        }
    }

    /// Whether a capability is available
    pub fn has_feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::Shaders => true,
            Feature::MultiThreaded => false,
        }
    }

    /// Number of live handles
    pub fn live_handle_count(&self) -> usize {
        self.registry.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HeadlessStats;
    use crate::scene::viewport::ViewportUpdateMode;
    use std::sync::Arc;

    fn server_with_stats() -> (RenderServer, Arc<HeadlessStats>) {
        let backend = HeadlessBackend::new();
        let stats = backend.stats();
        (RenderServer::new(ServerConfig::default(), Box::new(backend)), stats)
    }

    #[test]
    fn test_free_unknown_handle() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let texture = vs.texture_create();
        vs.free(texture).expect("free");
        assert!(matches!(vs.free(texture), Err(ServerError::InvalidHandle { .. })));
        assert!(matches!(vs.kind_of(texture), Err(ServerError::InvalidHandle { .. })));
    }

    #[test]
    fn test_draw_before_sync_is_empty_frame() {
        let (mut vs, stats) = server_with_stats();
        assert!(vs.draw());
        assert_eq!(stats.frames_executed(), 1);
        assert_eq!(stats.last_revision(), 0);
        assert_eq!(vs.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_sync_draw_phases() {
        let (mut vs, stats) = server_with_stats();
        let viewport = vs.viewport_create();
        assert_eq!(vs.phase(), FramePhase::Staged);

        vs.sync();
        assert_eq!(vs.phase(), FramePhase::Published);
        assert!(vs.has_changed());

        vs.draw();
        assert_eq!(vs.phase(), FramePhase::Idle);
        assert!(!vs.has_changed());
        assert_eq!(stats.last_viewport_count(), 1);

        vs.viewport_set_update_mode(viewport, ViewportUpdateMode::Once).expect("mode");
        assert_eq!(vs.phase(), FramePhase::Staged);
    }

    #[test]
    fn test_cursor_capacity() {
        let mut vs = RenderServer::headless(ServerConfig::default().with_max_cursors(2));
        vs.cursor_set_visible(1, true).expect("slot 1");
        assert!(vs.cursor(1).expect("slot 1").visible);
        assert!(matches!(vs.cursor_set_pos(2, Vec2::new(1.0, 1.0)), Err(ServerError::Capacity(_))));
    }

    #[test]
    fn test_cursor_reaches_snapshot() {
        let mut vs = RenderServer::headless(ServerConfig::default().with_max_cursors(2));
        let image = vs.texture_create();
        vs.cursor_set_texture(0, image, Vec2::new(2.0, 2.0), None).expect("texture");
        vs.cursor_set_visible(0, true).expect("visible");
        vs.sync();

        let frame = vs.published_frame();
        assert_eq!(frame.cursors.len(), 2);
        assert!(frame.cursors[0].visible);
        assert_eq!(frame.cursors[0].texture, image);

        vs.cursor_set_pos(0, Vec2::new(10.0, 20.0)).expect("pos");
        assert_eq!(vs.phase(), FramePhase::Staged);
        vs.free(image).expect("free");
        vs.sync();
        let frame = vs.published_frame();
        assert_eq!(frame.cursors[0].position, Vec2::new(10.0, 20.0));
        assert_eq!(frame.cursors[0].texture, Rid::empty());
    }

    #[test]
    fn test_black_bar_images_resolve_when_freed() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let image = vs.texture_create();
        vs.black_bars_set_images(image, Rid::empty(), Rid::empty(), Rid::empty()).expect("images");
        assert_eq!(vs.black_bars().images[0], image);

        vs.free(image).expect("free");
        assert_eq!(vs.black_bars().images[0], Rid::empty());
    }

    #[test]
    fn test_finish_releases_everything() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        vs.init().expect("init");
        let scenario = vs.scenario_create();
        let mesh = vs.mesh_create();
        let instance = vs.instance_create();
        vs.instance_set_base(instance, mesh).expect("base");
        vs.instance_set_scenario(instance, scenario).expect("scenario");
        vs.viewport_create();
        assert!(vs.live_handle_count() > 0);

        vs.finish();
        assert_eq!(vs.live_handle_count(), 0);
        assert!(!vs.is_initialized());
        assert_eq!(vs.published_frame().revision, 0);
    }

    #[test]
    fn test_features() {
        let vs = RenderServer::headless(ServerConfig::default());
        assert!(vs.has_feature(Feature::Shaders));
        assert!(!vs.has_feature(Feature::MultiThreaded));
    }
}
