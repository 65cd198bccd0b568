//! # Viewports
//!
//! A viewport composes a scenario seen through a camera with any number of
//! canvases, rendering into a texture it owns. The texture is created with
//! the viewport, resized with it and freed with it.
//!
//! Parent links order render targets only: a child is rendered before its
//! parent so the parent can sample the child's texture. Transforms are not
//! inherited.

use bitflags::bitflags;

use crate::error::{check_index, ServerError, ServerResult};
use crate::foundation::math::{utils, Rect2, Transform2D};
use crate::frame::snapshot::{CameraFrame, ViewportCanvasFrame, ViewportFrame};
use crate::resources::handle::{ResourceKind, Rid};
use crate::resources::texture::{PixelFormat, Texture, TextureFlags};
use crate::server::RenderServer;

const SHADOW_ATLAS_SUBDIVISIONS: [u32; 7] = [0, 1, 4, 16, 64, 256, 1024];
const SHADOW_ATLAS_QUADRANTS: usize = 4;

/// When a viewport is redrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewportUpdateMode {
    /// Never
    Disabled,
    /// On the next draw only, then [`ViewportUpdateMode::Disabled`]
    Once,
    /// While visible
    #[default]
    WhenVisible,
    /// Every draw
    Always,
}

/// When the render target is cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewportClearMode {
    /// Every draw
    #[default]
    Always,
    /// Never
    Never,
    /// On the next draw only, then [`ViewportClearMode::Never`]
    OnlyNextFrame,
}

bitflags! {
    /// Viewport toggles
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewportFlags: u32 {
        /// Flip the target vertically
        const VFLIP = 1 << 0;
        /// Clear to transparent
        const TRANSPARENT_BG = 1 << 1;
        /// Skip the scenario
        const HIDE_SCENARIO = 1 << 2;
        /// Skip the canvases
        const HIDE_CANVAS = 1 << 3;
        /// Skip all 3D work
        const DISABLE_3D = 1 << 4;
        /// Ignore the environment
        const DISABLE_ENVIRONMENT = 1 << 5;
    }
}

/// Where an attached viewport is blitted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenAttachment {
    /// Target rectangle
    pub rect: Rect2,
    /// Screen index
    pub screen: u32,
}

/// A canvas shown by a viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportCanvas {
    /// Canvas handle
    pub canvas: Rid,
    /// Transform applied to the canvas
    pub transform: Transform2D,
    /// Draw layer, lower first
    pub layer: i32,
}

/// Viewport record
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    /// Target width
    pub width: u32,
    /// Target height
    pub height: u32,
    /// Drawn at all
    pub active: bool,
    /// Redraw policy
    pub update_mode: ViewportUpdateMode,
    /// Clear policy
    pub clear_mode: ViewportClearMode,
    /// Toggles
    pub flags: ViewportFlags,
    /// Viewport consuming this one's target
    pub parent: Rid,
    /// Scenario rendered
    pub scenario: Rid,
    /// Camera used
    pub camera: Rid,
    /// Canvases shown, in attach order
    pub canvases: Vec<ViewportCanvas>,
    /// Transform applied to every canvas
    pub global_canvas_transform: Transform2D,
    /// Screen placement when attached
    pub screen: Option<ScreenAttachment>,
    /// Owned render target
    pub render_target: Rid,
    /// Shadow atlas edge size, 0 disables it
    pub shadow_atlas_size: u32,
    /// Shadow atlas subdivision per quadrant
    pub shadow_atlas_subdivision: [u32; SHADOW_ATLAS_QUADRANTS],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            active: true,
            update_mode: ViewportUpdateMode::default(),
            clear_mode: ViewportClearMode::default(),
            flags: ViewportFlags::empty(),
            parent: Rid::empty(),
            scenario: Rid::empty(),
            camera: Rid::empty(),
            canvases: Vec::new(),
            global_canvas_transform: Transform2D::identity(),
            screen: None,
            render_target: Rid::empty(),
            shadow_atlas_size: 0,
            shadow_atlas_subdivision: [0; SHADOW_ATLAS_QUADRANTS],
        }
    }
}

impl Viewport {
    fn canvas_mut(&mut self, canvas: Rid) -> ServerResult<&mut ViewportCanvas> {
        self.canvases
            .iter_mut()
            .find(|entry| entry.canvas == canvas)
            .ok_or_else(|| ServerError::invalid_state(format!("canvas {canvas} is not attached to the viewport")))
    }
}

impl RenderServer {
    /// Create an active viewport and its render-target texture
    pub fn viewport_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Viewport);
        let target = self.allocate(ResourceKind::Texture);
        self.textures.insert(
            target,
            Texture {
                format: PixelFormat::Rgba8,
                flags: TextureFlags::FILTER,
                owner: rid,
                ..Texture::default()
            },
        );
        self.viewports.insert(rid, Viewport { render_target: target, ..Viewport::default() });
        rid
    }

    /// Resize the viewport and its render target
    pub fn viewport_set_size(&mut self, viewport: Rid, width: u32, height: u32) -> ServerResult<()> {
        let record = self.viewports.get_mut(viewport)?;
        record.width = width;
        record.height = height;
        let target = record.render_target;
        if let Some(texture) = self.textures.resolve_mut(target) {
            texture.width = width;
            texture.height = height;
            texture.alloc_width = width;
            texture.alloc_height = height;
            texture.allocated = width > 0 && height > 0;
        }
        self.mark_resources_dirty();
        Ok(())
    }

    /// Toggle drawing
    pub fn viewport_set_active(&mut self, viewport: Rid, active: bool) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.active = active;
        self.mark_staged();
        Ok(())
    }

    /// Set the viewport consuming this one's target; the empty handle clears it
    pub fn viewport_set_parent_viewport(&mut self, viewport: Rid, parent: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(parent, ResourceKind::Viewport)?;
        self.viewports.get(viewport)?;
        let mut cursor = parent;
        let mut steps = 0;
        while let Some(record) = self.viewports.resolve(cursor) {
            if cursor == viewport {
                return Err(ServerError::invalid_state(format!(
                    "parenting viewport {viewport} to {parent} would form a cycle"
                )));
            }
            cursor = record.parent;
            steps += 1;
            if steps > self.viewports.len() {
                break;
            }
        }
        self.viewports.get_mut(viewport)?.parent = parent;
        self.mark_staged();
        Ok(())
    }

    /// Blit the viewport to a screen rectangle
    pub fn viewport_attach_to_screen(&mut self, viewport: Rid, rect: Rect2, screen: u32) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.screen = Some(ScreenAttachment { rect, screen });
        self.mark_staged();
        Ok(())
    }

    /// Stop blitting to a screen
    pub fn viewport_detach(&mut self, viewport: Rid) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.screen = None;
        self.mark_staged();
        Ok(())
    }

    /// Set the redraw policy
    pub fn viewport_set_update_mode(&mut self, viewport: Rid, mode: ViewportUpdateMode) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.update_mode = mode;
        self.mark_staged();
        Ok(())
    }

    /// Current redraw policy
    pub fn viewport_get_update_mode(&self, viewport: Rid) -> ServerResult<ViewportUpdateMode> {
        Ok(self.viewports.get(viewport)?.update_mode)
    }

    /// Set the clear policy
    pub fn viewport_set_clear_mode(&mut self, viewport: Rid, mode: ViewportClearMode) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.clear_mode = mode;
        self.mark_staged();
        Ok(())
    }

    /// Current clear policy
    pub fn viewport_get_clear_mode(&self, viewport: Rid) -> ServerResult<ViewportClearMode> {
        Ok(self.viewports.get(viewport)?.clear_mode)
    }

    /// Set or clear toggles
    pub fn viewport_set_flag(&mut self, viewport: Rid, flag: ViewportFlags, enabled: bool) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.flags.set(flag, enabled);
        self.mark_staged();
        Ok(())
    }

    /// Current toggles
    pub fn viewport_get_flags(&self, viewport: Rid) -> ServerResult<ViewportFlags> {
        Ok(self.viewports.get(viewport)?.flags)
    }

    /// Set or clear the camera
    pub fn viewport_attach_camera(&mut self, viewport: Rid, camera: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(camera, ResourceKind::Camera)?;
        self.viewports.get_mut(viewport)?.camera = camera;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the scenario
    pub fn viewport_set_scenario(&mut self, viewport: Rid, scenario: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(scenario, ResourceKind::Scenario)?;
        self.viewports.get_mut(viewport)?.scenario = scenario;
        self.mark_staged();
        Ok(())
    }

    /// Show a canvas; attaching the same canvas twice is an error
    pub fn viewport_attach_canvas(&mut self, viewport: Rid, canvas: Rid) -> ServerResult<()> {
        self.registry.expect_kind(canvas, ResourceKind::Canvas)?;
        let record = self.viewports.get_mut(viewport)?;
        if record.canvases.iter().any(|entry| entry.canvas == canvas) {
            return Err(ServerError::invalid_state(format!("canvas {canvas} already attached to viewport {viewport}")));
        }
        record.canvases.push(ViewportCanvas { canvas, transform: Transform2D::identity(), layer: 0 });
        self.mark_staged();
        Ok(())
    }

    /// Stop showing a canvas
    pub fn viewport_remove_canvas(&mut self, viewport: Rid, canvas: Rid) -> ServerResult<()> {
        let record = self.viewports.get_mut(viewport)?;
        let Some(position) = record.canvases.iter().position(|entry| entry.canvas == canvas) else {
            return Err(ServerError::invalid_state(format!("canvas {canvas} is not attached to viewport {viewport}")));
        };
        record.canvases.remove(position);
        self.mark_staged();
        Ok(())
    }

    /// Set one attached canvas's transform
    pub fn viewport_set_canvas_transform(&mut self, viewport: Rid, canvas: Rid, transform: Transform2D) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.canvas_mut(canvas)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set one attached canvas's layer
    pub fn viewport_set_canvas_layer(&mut self, viewport: Rid, canvas: Rid, layer: i32) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.canvas_mut(canvas)?.layer = layer;
        self.mark_staged();
        Ok(())
    }

    /// Set the transform applied to every canvas
    pub fn viewport_set_global_canvas_transform(&mut self, viewport: Rid, transform: Transform2D) -> ServerResult<()> {
        self.viewports.get_mut(viewport)?.global_canvas_transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow atlas size, rounded up to a power of two; 0 disables it
    pub fn viewport_set_shadow_atlas_size(&mut self, viewport: Rid, size: u32) -> ServerResult<()> {
        let size = if size == 0 { 0 } else { utils::next_power_of_two(size) };
        self.viewports.get_mut(viewport)?.shadow_atlas_size = size;
        self.mark_staged();
        Ok(())
    }

    /// Set how many shadows one atlas quadrant holds
    pub fn viewport_set_shadow_atlas_quadrant_subdivision(
        &mut self,
        viewport: Rid,
        quadrant: usize,
        subdivision: u32,
    ) -> ServerResult<()> {
        check_index("shadow atlas quadrant", quadrant, SHADOW_ATLAS_QUADRANTS)?;
        if !SHADOW_ATLAS_SUBDIVISIONS.contains(&subdivision) {
            return Err(ServerError::invalid_state(format!(
                "shadow atlas subdivision {subdivision} is not one of {SHADOW_ATLAS_SUBDIVISIONS:?}"
            )));
        }
        self.viewports.get_mut(viewport)?.shadow_atlas_subdivision[quadrant] = subdivision;
        self.mark_staged();
        Ok(())
    }

    /// Render-target texture
    pub fn viewport_get_texture(&self, viewport: Rid) -> ServerResult<Rid> {
        Ok(self.viewports.get(viewport)?.render_target)
    }

    /// Viewport record
    pub fn viewport(&self, viewport: Rid) -> ServerResult<&Viewport> {
        self.viewports.get(viewport)
    }

    /// Number of live ancestors
    fn viewport_depth(&self, record: &Viewport) -> usize {
        let mut depth = 0;
        let mut cursor = record.parent;
        while let Some(parent) = self.viewports.resolve(cursor) {
            depth += 1;
            cursor = parent.parent;
            if depth > self.viewports.len() {
                break;
            }
        }
        depth
    }

    /// Published form of every viewport that will draw, children first
    pub(crate) fn viewport_frames(&self) -> Vec<ViewportFrame> {
        let mut frames: Vec<(usize, u64, ViewportFrame)> = self
            .viewports
            .iter()
            .filter(|(_, record)| record.active && record.update_mode != ViewportUpdateMode::Disabled)
            .map(|(rid, record)| {
                let camera = self.cameras.resolve(record.camera).map(|camera| CameraFrame {
                    camera: record.camera,
                    projection: camera.projection,
                    transform: camera.transform,
                    cull_mask: camera.cull_mask,
                    environment: self.environments.contains(camera.environment).then_some(camera.environment),
                    vertical_aspect: camera.vertical_aspect,
                });
                let mut canvases: Vec<ViewportCanvasFrame> = record
                    .canvases
                    .iter()
                    .filter(|entry| self.canvases.contains(entry.canvas))
                    .map(|entry| ViewportCanvasFrame {
                        canvas: entry.canvas,
                        transform: record.global_canvas_transform * entry.transform,
                        layer: entry.layer,
                    })
                    .collect();
                canvases.sort_by_key(|entry| entry.layer);
                let frame = ViewportFrame {
                    viewport: rid,
                    width: record.width,
                    height: record.height,
                    render_target: record.render_target,
                    update_mode: record.update_mode,
                    clear_mode: record.clear_mode,
                    flags: record.flags,
                    parent: self.viewports.contains(record.parent).then_some(record.parent),
                    scenario: self.scenarios.contains(record.scenario).then_some(record.scenario),
                    camera,
                    canvases,
                    screen: record.screen,
                    shadow_atlas_size: record.shadow_atlas_size,
                    shadow_atlas_subdivision: record.shadow_atlas_subdivision,
                };
                let serial = self.registry.serial(rid).unwrap_or_default();
                (self.viewport_depth(record), serial, frame)
            })
            .collect();
        frames.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        frames.into_iter().map(|(_, _, frame)| frame).collect()
    }

    /// Apply one-shot modes after `frames` were drawn; returns whether anything changed
    pub(crate) fn consume_one_shot_modes(&mut self, frames: &[ViewportFrame]) -> bool {
        let mut changed = false;
        for frame in frames {
            let Some(record) = self.viewports.resolve_mut(frame.viewport) else {
                continue;
            };
            if frame.update_mode == ViewportUpdateMode::Once && record.update_mode == ViewportUpdateMode::Once {
                record.update_mode = ViewportUpdateMode::Disabled;
                changed = true;
            }
            if frame.clear_mode == ViewportClearMode::OnlyNextFrame
                && record.clear_mode == ViewportClearMode::OnlyNextFrame
            {
                record.clear_mode = ViewportClearMode::Never;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;

    #[test]
    fn test_viewport_defaults_and_target() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let viewport = vs.viewport_create();
        let record = vs.viewport(viewport).expect("viewport");

        assert!(record.active);
        assert_eq!(record.update_mode, ViewportUpdateMode::WhenVisible);
        assert_eq!(record.clear_mode, ViewportClearMode::Always);

        let target = vs.viewport_get_texture(viewport).expect("target");
        vs.viewport_set_size(viewport, 320, 200).expect("size");
        assert_eq!(vs.texture_get_width(target), Ok(320));
        assert_eq!(vs.texture_get_height(target), Ok(200));
    }

    #[test]
    fn test_render_target_freed_with_viewport() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let viewport = vs.viewport_create();
        let target = vs.viewport_get_texture(viewport).expect("target");

        assert!(matches!(vs.free(target), Err(ServerError::InvalidState(_))));
        vs.free(viewport).expect("free");
        assert!(vs.texture_get_width(target).is_err());
    }

    #[test]
    fn test_canvas_attach_and_remove() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let viewport = vs.viewport_create();
        let canvas = vs.canvas_create();

        vs.viewport_attach_canvas(viewport, canvas).expect("attach");
        assert!(vs.viewport_attach_canvas(viewport, canvas).is_err());
        vs.viewport_set_canvas_layer(viewport, canvas, 3).expect("layer");
        assert_eq!(vs.viewport(viewport).expect("viewport").canvases[0].layer, 3);

        vs.viewport_remove_canvas(viewport, canvas).expect("remove");
        assert!(vs.viewport_remove_canvas(viewport, canvas).is_err());
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let a = vs.viewport_create();
        let b = vs.viewport_create();

        vs.viewport_set_parent_viewport(b, a).expect("b under a");
        assert!(vs.viewport_set_parent_viewport(a, b).is_err());
        assert!(vs.viewport_set_parent_viewport(a, a).is_err());
    }

    #[test]
    fn test_shadow_atlas_validation() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let viewport = vs.viewport_create();

        vs.viewport_set_shadow_atlas_size(viewport, 3000).expect("size");
        assert_eq!(vs.viewport(viewport).expect("viewport").shadow_atlas_size, 4096);
        vs.viewport_set_shadow_atlas_quadrant_subdivision(viewport, 2, 16).expect("subdiv");
        assert!(matches!(
            vs.viewport_set_shadow_atlas_quadrant_subdivision(viewport, 4, 16),
            Err(ServerError::OutOfRange { .. })
        ));
        assert!(matches!(
            vs.viewport_set_shadow_atlas_quadrant_subdivision(viewport, 0, 5),
            Err(ServerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_children_published_before_parents() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let root = vs.viewport_create();
        let child = vs.viewport_create();
        let sibling = vs.viewport_create();
        vs.viewport_set_parent_viewport(child, root).expect("parent");

        let order: Vec<Rid> = vs.viewport_frames().iter().map(|frame| frame.viewport).collect();
        assert_eq!(order, vec![child, root, sibling]);
    }
}
