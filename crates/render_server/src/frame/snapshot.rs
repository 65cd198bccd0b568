//! # Published Frame Snapshot
//!
//! [`FrameSnapshot`] is the immutable state the backend executes and the
//! culling queries read. It is rebuilt from the live stores on `sync` and
//! swapped into a shared slot, so a consumer holding the previous snapshot
//! keeps a consistent view while the producer moves on.
//!
//! Every weak reference is resolved while building: a freed target appears
//! as `None` or is left out, never as a dangling handle.

use std::sync::{Arc, PoisonError, RwLock};

use crate::foundation::math::{Color, Rect2, Transform, Transform2D, Vec2};
use crate::resources::camera::Projection;
use crate::resources::handle::{InstanceType, ResourceKind, Rid};
use crate::scene::canvas::{BackBufferCopy, CanvasCommand};
use crate::scene::culling::{CullShape, AABB};
use crate::scene::instance::{InstanceFlags, ObjectId, ShadowCasting};
use crate::scene::scenario::{EnvironmentResolution, ScenarioDebugMode};
use crate::scene::viewport::{ScreenAttachment, ViewportClearMode, ViewportFlags, ViewportUpdateMode};
use crate::server::{Cursor, RenderServer};

/// Material and shader a surface draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDraw {
    /// Resolved material
    pub material: Option<Rid>,
    /// Shader of the resolved material
    pub shader: Option<Rid>,
}

/// A placed instance with live bounds
#[derive(Debug, Clone, PartialEq)]
pub struct CulledInstance {
    /// Instance handle
    pub instance: Rid,
    /// Identity reported by culling
    pub object_id: Option<ObjectId>,
    /// Base resource
    pub base: Rid,
    /// Base kind
    pub base_type: InstanceType,
    /// World bounds including the extra margin
    pub aabb: AABB,
    /// Render layers
    pub layer_mask: u32,
    /// Geometry flags
    pub flags: InstanceFlags,
    /// Shadow casting
    pub shadow_casting: ShadowCasting,
    /// Vertices drawn for this instance
    pub vertex_count: usize,
    /// One entry per drawn surface
    pub surfaces: Vec<SurfaceDraw>,
}

/// A scenario as published
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFrame {
    /// Scenario handle
    pub scenario: Rid,
    /// Debug draw mode
    pub debug: ScenarioDebugMode,
    /// Environment to render with
    pub environment: EnvironmentResolution,
    /// Reflection atlas edge size
    pub reflection_atlas_size: u32,
    /// Instances in placement order
    pub instances: Vec<CulledInstance>,
}

/// Camera state used by a viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    /// Camera handle
    pub camera: Rid,
    /// Projection
    pub projection: Projection,
    /// World transform
    pub transform: Transform,
    /// Visible layers
    pub cull_mask: u32,
    /// Live environment override
    pub environment: Option<Rid>,
    /// Vertical aspect kept fixed
    pub vertical_aspect: bool,
}

/// A canvas shown by a viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportCanvasFrame {
    /// Canvas handle
    pub canvas: Rid,
    /// Global transform times the per-canvas transform
    pub transform: Transform2D,
    /// Draw layer
    pub layer: i32,
}

/// A viewport that draws this frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewportFrame {
    /// Viewport handle
    pub viewport: Rid,
    /// Target width
    pub width: u32,
    /// Target height
    pub height: u32,
    /// Render target texture
    pub render_target: Rid,
    /// Redraw policy at publish time
    pub update_mode: ViewportUpdateMode,
    /// Clear policy at publish time
    pub clear_mode: ViewportClearMode,
    /// Toggles
    pub flags: ViewportFlags,
    /// Live parent viewport
    pub parent: Option<Rid>,
    /// Live scenario
    pub scenario: Option<Rid>,
    /// Live camera
    pub camera: Option<CameraFrame>,
    /// Live canvases by ascending layer
    pub canvases: Vec<ViewportCanvasFrame>,
    /// Screen placement
    pub screen: Option<ScreenAttachment>,
    /// Shadow atlas edge size
    pub shadow_atlas_size: u32,
    /// Shadow atlas quadrant subdivisions
    pub shadow_atlas_subdivision: [u32; 4],
}

/// One canvas item in draw order
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasItemFrame {
    /// Item handle
    pub item: Rid,
    /// Canvas-space transform
    pub transform: Transform2D,
    /// Final color multiplier
    pub modulate: Color,
    /// Effective z
    pub z: i32,
    /// Light mask
    pub light_mask: u32,
    /// Clip children
    pub clip: bool,
    /// Custom bounds
    pub custom_rect: Option<Rect2>,
    /// Distance field texture
    pub distance_field: bool,
    /// Back buffer copy
    pub copy_back_buffer: Option<BackBufferCopy>,
    /// Resolved material
    pub material: Option<Rid>,
    /// Repeat offset of a root item
    pub mirroring: Option<Vec2>,
    /// Recorded commands
    pub commands: Vec<CanvasCommand>,
}

/// A canvas as published
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasFrame {
    /// Canvas handle
    pub canvas: Rid,
    /// Canvas-wide color multiplier
    pub modulate: Color,
    /// Items in draw order
    pub items: Vec<CanvasItemFrame>,
    /// Enabled lights
    pub lights: Vec<Rid>,
    /// Enabled occluders with a live polygon
    pub occluders: Vec<Rid>,
}

/// Letterbox margins and images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlackBars {
    /// Left, top, right, bottom margins in pixels
    pub margins: [i32; 4],
    /// Left, top, right, bottom images
    pub images: [Rid; 4],
}

/// Everything the backend needs for one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameSnapshot {
    /// Increases whenever published content changes
    pub revision: u64,
    /// Resource edit counter at publish time
    pub resource_epoch: u64,
    /// Default clear color
    pub clear_color: Color,
    /// Letterboxing
    pub black_bars: BlackBars,
    /// Hardware cursor slots, freed images resolved to empty
    pub cursors: Vec<Cursor>,
    /// Scenarios in creation order
    pub scenarios: Vec<ScenarioFrame>,
    /// Viewports that draw, children before parents
    pub viewports: Vec<ViewportFrame>,
    /// Canvases in creation order
    pub canvases: Vec<CanvasFrame>,
}

impl FrameSnapshot {
    /// Equal in everything but the revision
    pub fn same_content(&self, other: &Self) -> bool {
        self.resource_epoch == other.resource_epoch
            && self.clear_color == other.clear_color
            && self.black_bars == other.black_bars
            && self.cursors == other.cursors
            && self.scenarios == other.scenarios
            && self.viewports == other.viewports
            && self.canvases == other.canvases
    }

    /// Copy left after one draw consumed the one-shot modes
    ///
    /// `Once` viewports are dropped and `OnlyNextFrame` clears become
    /// `Never`. `None` when nothing was one-shot.
    pub(crate) fn after_one_shot(&self) -> Option<FrameSnapshot> {
        let one_shot = self.viewports.iter().any(|frame| {
            frame.update_mode == ViewportUpdateMode::Once || frame.clear_mode == ViewportClearMode::OnlyNextFrame
        });
        if !one_shot {
            return None;
        }
        let viewports = self
            .viewports
            .iter()
            .filter(|frame| frame.update_mode != ViewportUpdateMode::Once)
            .map(|frame| {
                let mut frame = frame.clone();
                if frame.clear_mode == ViewportClearMode::OnlyNextFrame {
                    frame.clear_mode = ViewportClearMode::Never;
                }
                frame
            })
            .collect();
        Some(FrameSnapshot { viewports, ..self.clone() })
    }

    /// Published scenario
    pub fn scenario(&self, scenario: Rid) -> Option<&ScenarioFrame> {
        self.scenarios.iter().find(|frame| frame.scenario == scenario)
    }

    /// Published canvas
    pub fn canvas(&self, canvas: Rid) -> Option<&CanvasFrame> {
        self.canvases.iter().find(|frame| frame.canvas == canvas)
    }

    /// Published viewport
    pub fn viewport(&self, viewport: Rid) -> Option<&ViewportFrame> {
        self.viewports.iter().find(|frame| frame.viewport == viewport)
    }

    /// Object ids of instances overlapping `shape`, in placement order
    ///
    /// `None` searches every scenario in creation order. Instances without an
    /// object id are skipped.
    pub fn cull(&self, shape: &CullShape, scenario: Option<Rid>) -> Vec<ObjectId> {
        self.scenarios
            .iter()
            .filter(|frame| scenario.map_or(true, |rid| frame.scenario == rid))
            .flat_map(|frame| frame.instances.iter())
            .filter(|instance| shape.overlaps(&instance.aabb))
            .filter_map(|instance| instance.object_id)
            .collect()
    }
}

/// Shared slot holding the current published snapshot
#[derive(Debug, Clone, Default)]
pub struct PublishedFrame {
    slot: Arc<RwLock<Arc<FrameSnapshot>>>,
}

impl PublishedFrame {
    /// Slot holding the empty initial snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&self.slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the snapshot; waits for readers holding the lock
    pub fn publish(&self, snapshot: FrameSnapshot) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Read-only handle for a consumer on another thread
    pub fn reader(&self) -> FrameReader {
        FrameReader { slot: Arc::clone(&self.slot) }
    }
}

/// Consumer-side view of the published slot
#[derive(Debug, Clone)]
pub struct FrameReader {
    slot: Arc<RwLock<Arc<FrameSnapshot>>>,
}

impl FrameReader {
    /// Current snapshot
    pub fn load(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&self.slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Revision of the current snapshot
    pub fn revision(&self) -> u64 {
        self.load().revision
    }
}

impl RenderServer {
    /// Build a snapshot of the live stores
    pub(crate) fn build_snapshot(&self, revision: u64) -> FrameSnapshot {
        let scenarios = self
            .registry
            .handles_of_kind(ResourceKind::Scenario)
            .into_iter()
            .filter_map(|rid| {
                let record = self.scenarios.resolve(rid)?;
                let instances = record
                    .instances
                    .iter()
                    .filter_map(|instance| self.culled_instance(instance, self.instances.resolve(instance)?))
                    .collect();
                Some(ScenarioFrame {
                    scenario: rid,
                    debug: record.debug,
                    environment: self.resolve_environment(record),
                    reflection_atlas_size: record.reflection_atlas_size,
                    instances,
                })
            })
            .collect();

        let canvases = self
            .registry
            .handles_of_kind(ResourceKind::Canvas)
            .into_iter()
            .filter_map(|rid| Some(self.canvas_frame(rid, self.canvases.resolve(rid)?)))
            .collect();

        FrameSnapshot {
            revision,
            resource_epoch: self.pipeline.resource_epoch(),
            clear_color: self.clear_color,
            black_bars: self.black_bars(),
            cursors: self.cursor_frames(),
            scenarios,
            viewports: self.viewport_frames(),
            canvases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn instance_at(object: u64, min: f32, max: f32) -> CulledInstance {
        CulledInstance {
            instance: Rid::empty(),
            object_id: Some(ObjectId(object)),
            base: Rid::empty(),
            base_type: InstanceType::Mesh,
            aabb: AABB::new(Vec3::new(min, min, min), Vec3::new(max, max, max)),
            layer_mask: 1,
            flags: InstanceFlags::default(),
            shadow_casting: ShadowCasting::On,
            vertex_count: 0,
            surfaces: Vec::new(),
        }
    }

    #[test]
    fn test_cull_keeps_placement_order() {
        let snapshot = FrameSnapshot {
            scenarios: vec![ScenarioFrame {
                scenario: Rid::empty(),
                debug: ScenarioDebugMode::Disabled,
                environment: EnvironmentResolution::Keep,
                reflection_atlas_size: 0,
                instances: vec![instance_at(3, 0.0, 1.0), instance_at(1, 0.0, 1.0), instance_at(2, 5.0, 6.0)],
            }],
            ..FrameSnapshot::default()
        };

        let shape = CullShape::Aabb(AABB::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0)));
        assert_eq!(snapshot.cull(&shape, None), vec![ObjectId(3), ObjectId(1)]);
    }

    #[test]
    fn test_same_content_ignores_revision() {
        let a = FrameSnapshot { revision: 1, ..FrameSnapshot::default() };
        let b = FrameSnapshot { revision: 2, ..FrameSnapshot::default() };
        assert!(a.same_content(&b));

        let c = FrameSnapshot { resource_epoch: 1, ..FrameSnapshot::default() };
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_after_one_shot_drops_once_viewports() {
        let snapshot = FrameSnapshot {
            revision: 3,
            viewports: vec![
                ViewportFrame { update_mode: ViewportUpdateMode::Once, ..ViewportFrame::default() },
                ViewportFrame {
                    update_mode: ViewportUpdateMode::Always,
                    clear_mode: ViewportClearMode::OnlyNextFrame,
                    ..ViewportFrame::default()
                },
            ],
            ..FrameSnapshot::default()
        };

        let rest = snapshot.after_one_shot().expect("one-shot modes present");
        assert_eq!(rest.revision, 3);
        assert_eq!(rest.viewports.len(), 1);
        assert_eq!(rest.viewports[0].update_mode, ViewportUpdateMode::Always);
        assert_eq!(rest.viewports[0].clear_mode, ViewportClearMode::Never);
        assert!(rest.after_one_shot().is_none());
    }

    #[test]
    fn test_reader_sees_published_snapshot() {
        let published = PublishedFrame::new();
        let reader = published.reader();
        assert_eq!(reader.revision(), 0);

        published.publish(FrameSnapshot { revision: 4, ..FrameSnapshot::default() });
        assert_eq!(reader.revision(), 4);
        assert_eq!(published.load().revision, 4);
    }
}
