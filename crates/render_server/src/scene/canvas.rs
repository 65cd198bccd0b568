//! # Canvas Tree
//!
//! Canvases are roots of a retained 2D draw-list tree. Canvas items own an
//! ordered list of draw commands and reference their parent by handle; a
//! parent lists its children but never owns their lifetime. Freeing a parent
//! detaches its children instead of freeing them.
//!
//! ## Draw order
//!
//! Siblings draw in attach order, stable-sorted by draw index (unset is 0)
//! and then by Y position when the parent asks for it. Children marked
//! `draw_behind_parent` draw before their parent. The flattened list of a
//! canvas is finally stable-sorted by effective z.

use std::collections::HashMap;

use crate::error::{ServerError, ServerResult};
use crate::foundation::collections::OrderedSet;
use crate::foundation::math::{Color, Rect2, Transform2D, Vec2};
use crate::frame::snapshot::{CanvasFrame, CanvasItemFrame};
use crate::resources::canvas_light::{CANVAS_ITEM_Z_MAX, CANVAS_ITEM_Z_MIN};
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Where a canvas item hangs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanvasParent {
    /// Detached
    #[default]
    None,
    /// Root item of a canvas
    Canvas(Rid),
    /// Child of another item
    Item(Rid),
}

/// Canvas record
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    /// Root items in attach order
    pub items: OrderedSet<Rid>,
    /// Canvas-wide color multiplier
    pub modulate: Color,
    /// Repeat offsets of individual root items
    pub mirroring: HashMap<Rid, Vec2>,
    /// Attached 2D lights
    pub lights: OrderedSet<Rid>,
    /// Attached light occluders
    pub occluders: OrderedSet<Rid>,
}

/// How a nine-patch axis fills its center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NinePatchAxisMode {
    /// Stretch
    #[default]
    Stretch,
    /// Repeat
    Tile,
    /// Repeat, scaled to fit whole tiles
    TileFit,
}

/// Nine-patch draw parameters
#[derive(Debug, Clone, PartialEq)]
pub struct NinePatch {
    /// Destination
    pub rect: Rect2,
    /// Source region in the texture, no area for the whole texture
    pub source: Rect2,
    /// Texture
    pub texture: Rid,
    /// Left, top, right, bottom margins
    pub margins: [f32; 4],
    /// Horizontal fill
    pub x_axis: NinePatchAxisMode,
    /// Vertical fill
    pub y_axis: NinePatchAxisMode,
    /// Draw the center patch
    pub draw_center: bool,
    /// Color multiplier
    pub modulate: Color,
}

impl Default for NinePatch {
    fn default() -> Self {
        Self {
            rect: Rect2::default(),
            source: Rect2::default(),
            texture: Rid::empty(),
            margins: [0.0; 4],
            x_axis: NinePatchAxisMode::Stretch,
            y_axis: NinePatchAxisMode::Stretch,
            draw_center: true,
            modulate: Color::WHITE,
        }
    }
}

/// One recorded draw command
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    /// Line segment
    Line {
        /// Start
        from: Vec2,
        /// End
        to: Vec2,
        /// Color
        color: Color,
        /// Width in pixels
        width: f32,
    },
    /// Filled rectangle
    Rect {
        /// Area
        rect: Rect2,
        /// Color
        color: Color,
    },
    /// Filled circle
    Circle {
        /// Center
        center: Vec2,
        /// Radius
        radius: f32,
        /// Color
        color: Color,
    },
    /// Textured rectangle
    TextureRect {
        /// Destination
        rect: Rect2,
        /// Texture
        texture: Rid,
        /// Repeat instead of stretch
        tile: bool,
        /// Color multiplier
        modulate: Color,
        /// Swap U and V
        transpose: bool,
    },
    /// Part of a texture in a rectangle
    TextureRectRegion {
        /// Destination
        rect: Rect2,
        /// Texture
        texture: Rid,
        /// Source region in pixels
        source: Rect2,
        /// Color multiplier
        modulate: Color,
        /// Swap U and V
        transpose: bool,
    },
    /// Nine-patch
    NinePatch(NinePatch),
    /// Point, line, triangle or quad
    Primitive {
        /// One to four points
        points: Vec<Vec2>,
        /// Per-point colors, or one, or none
        colors: Vec<Color>,
        /// Per-point UVs or none
        uvs: Vec<Vec2>,
        /// Texture
        texture: Rid,
        /// Line width for two points
        width: f32,
    },
    /// Filled polygon
    Polygon {
        /// Outline points
        points: Vec<Vec2>,
        /// Per-point colors, or one, or none
        colors: Vec<Color>,
        /// Per-point UVs or none
        uvs: Vec<Vec2>,
        /// Texture
        texture: Rid,
    },
    /// Indexed triangles
    TriangleArray {
        /// Three indices per triangle
        indices: Vec<u32>,
        /// Vertices
        points: Vec<Vec2>,
        /// Per-point colors, or one, or none
        colors: Vec<Color>,
        /// Per-point UVs or none
        uvs: Vec<Vec2>,
        /// Texture
        texture: Rid,
    },
    /// Mesh in canvas space
    Mesh {
        /// Mesh
        mesh: Rid,
        /// Texture
        texture: Rid,
    },
    /// Multimesh in canvas space
    Multimesh {
        /// Multimesh
        multimesh: Rid,
        /// Texture
        texture: Rid,
    },
    /// Transform for the following commands
    SetTransform(Transform2D),
    /// Ignore the item clip for the following commands
    ClipIgnore(bool),
}

/// Back buffer copy request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackBufferCopy {
    /// Copied area, ignored when `full_screen`
    pub rect: Rect2,
    /// Copy the whole screen
    pub full_screen: bool,
}

/// Canvas item record
#[derive(Debug, Clone)]
pub struct CanvasItem {
    /// Parent
    pub parent: CanvasParent,
    /// Children in attach order
    pub children: OrderedSet<Rid>,
    /// Drawn at all, with its subtree
    pub visible: bool,
    /// Mask matched against light cull masks
    pub light_mask: u32,
    /// Transform relative to the parent
    pub transform: Transform2D,
    /// Clip children to the custom rect
    pub clip: bool,
    /// Texture is a distance field
    pub distance_field: bool,
    /// Bounds used for culling and clipping
    pub custom_rect: Option<Rect2>,
    /// Color multiplier inherited by children
    pub modulate: Color,
    /// Color multiplier for this item only
    pub self_modulate: Color,
    /// Draw before the parent
    pub draw_behind_parent: bool,
    /// Recorded commands in append order
    pub commands: Vec<CanvasCommand>,
    /// Sort children by Y position
    pub sort_children_by_y: bool,
    /// Z index
    pub z_index: i32,
    /// Z adds to the parent's z
    pub z_relative: bool,
    /// Back buffer copy before drawing
    pub copy_back_buffer: Option<BackBufferCopy>,
    /// Order among siblings
    pub draw_index: i32,
    /// Material
    pub material: Rid,
    /// Use the parent's material instead of `material`
    pub use_parent_material: bool,
}

impl Default for CanvasItem {
    fn default() -> Self {
        Self {
            parent: CanvasParent::None,
            children: OrderedSet::new(),
            visible: true,
            light_mask: 1,
            transform: Transform2D::identity(),
            clip: false,
            distance_field: false,
            custom_rect: None,
            modulate: Color::WHITE,
            self_modulate: Color::WHITE,
            draw_behind_parent: false,
            commands: Vec::new(),
            sort_children_by_y: false,
            z_index: 0,
            z_relative: true,
            copy_back_buffer: None,
            draw_index: 0,
            material: Rid::empty(),
            use_parent_material: false,
        }
    }
}

fn check_color_count(colors: usize, points: usize) -> ServerResult<()> {
    if colors > 1 && colors != points {
        return Err(ServerError::invalid_state(format!("{colors} colors for {points} points")));
    }
    Ok(())
}

fn check_uv_count(uvs: usize, points: usize) -> ServerResult<()> {
    if uvs != 0 && uvs != points {
        return Err(ServerError::invalid_state(format!("{uvs} UVs for {points} points")));
    }
    Ok(())
}

fn clamp_z(z: i32) -> i32 {
    z.clamp(CANVAS_ITEM_Z_MIN, CANVAS_ITEM_Z_MAX)
}

/// State inherited from the parent while flattening
#[derive(Clone, Copy)]
struct Inherited {
    transform: Transform2D,
    modulate: Color,
    z: i32,
    material: Option<Rid>,
}

impl RenderServer {
    /// Create an empty canvas
    pub fn canvas_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Canvas);
        self.canvases.insert(rid, Canvas::default());
        rid
    }

    /// Set the repeat offset of a root item
    pub fn canvas_set_item_mirroring(&mut self, canvas: Rid, item: Rid, mirroring: Vec2) -> ServerResult<()> {
        let record = self.canvases.get_mut(canvas)?;
        if !record.items.contains(&item) {
            return Err(ServerError::invalid_state(format!("item {item} is not a root item of canvas {canvas}")));
        }
        record.mirroring.insert(item, mirroring);
        self.mark_staged();
        Ok(())
    }

    /// Set the canvas-wide color multiplier
    pub fn canvas_set_modulate(&mut self, canvas: Rid, color: Color) -> ServerResult<()> {
        self.canvases.get_mut(canvas)?.modulate = color;
        self.mark_staged();
        Ok(())
    }

    /// Canvas record
    pub fn canvas(&self, canvas: Rid) -> ServerResult<&Canvas> {
        self.canvases.get(canvas)
    }

    /// Create a detached canvas item
    pub fn canvas_item_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::CanvasItem);
        self.canvas_items.insert(rid, CanvasItem::default());
        rid
    }

    /// Attach to a canvas, another item, or nothing (empty handle)
    ///
    /// Parenting an item to itself or to one of its descendants is rejected.
    pub fn canvas_item_set_parent(&mut self, item: Rid, parent: Rid) -> ServerResult<()> {
        let new_parent = if parent.is_empty() {
            CanvasParent::None
        } else {
            match self.registry.kind_of(parent)? {
                ResourceKind::Canvas => CanvasParent::Canvas(parent),
                ResourceKind::CanvasItem => CanvasParent::Item(parent),
                _ => return Err(ServerError::unknown_handle(parent)),
            }
        };
        self.canvas_items.get(item)?;

        if let CanvasParent::Item(mut cursor) = new_parent {
            while let Some(record) = self.canvas_items.resolve(cursor) {
                if cursor == item {
                    return Err(ServerError::invalid_state(format!(
                        "canvas item {item} cannot be parented to itself or a descendant"
                    )));
                }
                match record.parent {
                    CanvasParent::Item(next) => cursor = next,
                    _ => break,
                }
            }
        }

        let previous = std::mem::replace(&mut self.canvas_items.get_mut(item)?.parent, new_parent);
        self.detach_canvas_child(previous, item);
        match new_parent {
            CanvasParent::Canvas(canvas) => {
                if let Some(record) = self.canvases.resolve_mut(canvas) {
                    record.items.insert(item);
                }
            }
            CanvasParent::Item(parent) => {
                if let Some(record) = self.canvas_items.resolve_mut(parent) {
                    record.children.insert(item);
                }
            }
            CanvasParent::None => {}
        }
        self.mark_staged();
        Ok(())
    }

    /// Show or hide the item and its subtree
    pub fn canvas_item_set_visible(&mut self, item: Rid, visible: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.visible = visible;
        self.mark_staged();
        Ok(())
    }

    /// Set the light mask
    pub fn canvas_item_set_light_mask(&mut self, item: Rid, mask: u32) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.light_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Set the transform relative to the parent
    pub fn canvas_item_set_transform(&mut self, item: Rid, transform: Transform2D) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Clip children to the custom rect
    pub fn canvas_item_set_clip(&mut self, item: Rid, clip: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.clip = clip;
        self.mark_staged();
        Ok(())
    }

    /// Mark textures as distance fields
    pub fn canvas_item_set_distance_field_mode(&mut self, item: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.distance_field = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the custom bounds
    pub fn canvas_item_set_custom_rect(&mut self, item: Rid, rect: Option<Rect2>) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.custom_rect = rect;
        self.mark_staged();
        Ok(())
    }

    /// Set the inherited color multiplier
    pub fn canvas_item_set_modulate(&mut self, item: Rid, color: Color) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.modulate = color;
        self.mark_staged();
        Ok(())
    }

    /// Set the color multiplier for this item only
    pub fn canvas_item_set_self_modulate(&mut self, item: Rid, color: Color) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.self_modulate = color;
        self.mark_staged();
        Ok(())
    }

    /// Draw before the parent
    pub fn canvas_item_set_draw_behind_parent(&mut self, item: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.draw_behind_parent = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Append a line
    pub fn canvas_item_add_line(&mut self, item: Rid, from: Vec2, to: Vec2, color: Color, width: f32) -> ServerResult<()> {
        self.push_canvas_command(item, CanvasCommand::Line { from, to, color, width })
    }

    /// Append a filled rectangle
    pub fn canvas_item_add_rect(&mut self, item: Rid, rect: Rect2, color: Color) -> ServerResult<()> {
        self.push_canvas_command(item, CanvasCommand::Rect { rect, color })
    }

    /// Append a filled circle
    pub fn canvas_item_add_circle(&mut self, item: Rid, center: Vec2, radius: f32, color: Color) -> ServerResult<()> {
        self.push_canvas_command(item, CanvasCommand::Circle { center, radius, color })
    }

    /// Append a textured rectangle
    pub fn canvas_item_add_texture_rect(
        &mut self,
        item: Rid,
        rect: Rect2,
        texture: Rid,
        tile: bool,
        modulate: Color,
        transpose: bool,
    ) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(item, CanvasCommand::TextureRect { rect, texture, tile, modulate, transpose })
    }

    /// Append a region of a texture
    pub fn canvas_item_add_texture_rect_region(
        &mut self,
        item: Rid,
        rect: Rect2,
        texture: Rid,
        source: Rect2,
        modulate: Color,
        transpose: bool,
    ) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(item, CanvasCommand::TextureRectRegion { rect, texture, source, modulate, transpose })
    }

    /// Append a nine-patch
    pub fn canvas_item_add_nine_patch(&mut self, item: Rid, patch: NinePatch) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(patch.texture, ResourceKind::Texture)?;
        if patch.margins.iter().any(|&m| m < 0.0) {
            return Err(ServerError::invalid_state(format!("nine-patch margins must be non-negative: {:?}", patch.margins)));
        }
        self.push_canvas_command(item, CanvasCommand::NinePatch(patch))
    }

    /// Append a point, line, triangle or quad
    pub fn canvas_item_add_primitive(
        &mut self,
        item: Rid,
        points: &[Vec2],
        colors: &[Color],
        uvs: &[Vec2],
        texture: Rid,
        width: f32,
    ) -> ServerResult<()> {
        if !(1..=4).contains(&points.len()) {
            return Err(ServerError::invalid_state(format!("primitives take 1 to 4 points, got {}", points.len())));
        }
        check_color_count(colors.len(), points.len())?;
        check_uv_count(uvs.len(), points.len())?;
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(
            item,
            CanvasCommand::Primitive {
                points: points.to_vec(),
                colors: colors.to_vec(),
                uvs: uvs.to_vec(),
                texture,
                width,
            },
        )
    }

    /// Append a filled polygon
    pub fn canvas_item_add_polygon(
        &mut self,
        item: Rid,
        points: &[Vec2],
        colors: &[Color],
        uvs: &[Vec2],
        texture: Rid,
    ) -> ServerResult<()> {
        if points.len() < 3 {
            return Err(ServerError::invalid_state(format!("polygons need at least 3 points, got {}", points.len())));
        }
        check_color_count(colors.len(), points.len())?;
        check_uv_count(uvs.len(), points.len())?;
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(
            item,
            CanvasCommand::Polygon { points: points.to_vec(), colors: colors.to_vec(), uvs: uvs.to_vec(), texture },
        )
    }

    /// Append indexed triangles; an empty index list draws the points in order
    pub fn canvas_item_add_triangle_array(
        &mut self,
        item: Rid,
        indices: &[u32],
        points: &[Vec2],
        colors: &[Color],
        uvs: &[Vec2],
        texture: Rid,
    ) -> ServerResult<()> {
        let vertex_total = if indices.is_empty() { points.len() } else { indices.len() };
        if vertex_total % 3 != 0 {
            return Err(ServerError::invalid_state(format!("{vertex_total} vertices do not form whole triangles")));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= points.len()) {
            return Err(ServerError::out_of_range("triangle vertex", index as usize, points.len()));
        }
        check_color_count(colors.len(), points.len())?;
        check_uv_count(uvs.len(), points.len())?;
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(
            item,
            CanvasCommand::TriangleArray {
                indices: indices.to_vec(),
                points: points.to_vec(),
                colors: colors.to_vec(),
                uvs: uvs.to_vec(),
                texture,
            },
        )
    }

    /// Append a mesh
    pub fn canvas_item_add_mesh(&mut self, item: Rid, mesh: Rid, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind(mesh, ResourceKind::Mesh)?;
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(item, CanvasCommand::Mesh { mesh, texture })
    }

    /// Append a multimesh
    pub fn canvas_item_add_multimesh(&mut self, item: Rid, multimesh: Rid, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind(multimesh, ResourceKind::Multimesh)?;
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.push_canvas_command(item, CanvasCommand::Multimesh { multimesh, texture })
    }

    /// Append a transform change
    pub fn canvas_item_add_set_transform(&mut self, item: Rid, transform: Transform2D) -> ServerResult<()> {
        self.push_canvas_command(item, CanvasCommand::SetTransform(transform))
    }

    /// Append a clip-ignore toggle
    pub fn canvas_item_add_clip_ignore(&mut self, item: Rid, ignore: bool) -> ServerResult<()> {
        self.push_canvas_command(item, CanvasCommand::ClipIgnore(ignore))
    }

    /// Sort children by Y position
    pub fn canvas_item_set_sort_children_by_y(&mut self, item: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.sort_children_by_y = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Set the z index, clamped to ±4096
    pub fn canvas_item_set_z_index(&mut self, item: Rid, z: i32) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.z_index = clamp_z(z);
        self.mark_staged();
        Ok(())
    }

    /// Make z relative to the parent's
    pub fn canvas_item_set_z_as_relative_to_parent(&mut self, item: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.z_relative = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Request a back buffer copy before drawing; `None` turns it off
    pub fn canvas_item_set_copy_to_backbuffer(&mut self, item: Rid, copy: Option<BackBufferCopy>) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.copy_back_buffer = copy;
        self.mark_staged();
        Ok(())
    }

    /// Remove every command
    pub fn canvas_item_clear(&mut self, item: Rid) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.commands.clear();
        self.mark_staged();
        Ok(())
    }

    /// Set the order among siblings
    pub fn canvas_item_set_draw_index(&mut self, item: Rid, index: i32) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.draw_index = index;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the material
    pub fn canvas_item_set_material(&mut self, item: Rid, material: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(material, ResourceKind::Material)?;
        self.canvas_items.get_mut(item)?.material = material;
        self.mark_staged();
        Ok(())
    }

    /// Inherit the parent's material
    pub fn canvas_item_set_use_parent_material(&mut self, item: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.use_parent_material = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Canvas item record
    pub fn canvas_item(&self, item: Rid) -> ServerResult<&CanvasItem> {
        self.canvas_items.get(item)
    }

    fn push_canvas_command(&mut self, item: Rid, command: CanvasCommand) -> ServerResult<()> {
        self.canvas_items.get_mut(item)?.commands.push(command);
        self.mark_staged();
        Ok(())
    }

    pub(crate) fn detach_canvas_child(&mut self, parent: CanvasParent, child: Rid) {
        match parent {
            CanvasParent::Canvas(canvas) => {
                if let Some(record) = self.canvases.resolve_mut(canvas) {
                    record.items.remove(&child);
                    record.mirroring.remove(&child);
                }
            }
            CanvasParent::Item(item) => {
                if let Some(record) = self.canvas_items.resolve_mut(item) {
                    record.children.remove(&child);
                }
            }
            CanvasParent::None => {}
        }
    }

    fn sorted_canvas_children(&self, children: impl Iterator<Item = Rid>, by_y: bool) -> Vec<(Rid, &CanvasItem)> {
        let mut list: Vec<(Rid, &CanvasItem)> = children
            .filter_map(|child| self.canvas_items.resolve(child).map(|record| (child, record)))
            .collect();
        list.sort_by_key(|(_, record)| record.draw_index);
        if by_y {
            list.sort_by(|a, b| a.1.transform[(1, 2)].total_cmp(&b.1.transform[(1, 2)]));
        }
        list
    }

    fn flatten_canvas_item(
        &self,
        rid: Rid,
        record: &CanvasItem,
        inherited: Inherited,
        mirroring: Option<Vec2>,
        out: &mut Vec<CanvasItemFrame>,
    ) {
        if !record.visible {
            return;
        }
        let material = if record.use_parent_material {
            inherited.material
        } else {
            self.materials.contains(record.material).then_some(record.material)
        };
        let own = Inherited {
            transform: inherited.transform * record.transform,
            modulate: inherited.modulate.modulate(record.modulate),
            z: clamp_z(if record.z_relative { inherited.z + record.z_index } else { record.z_index }),
            material,
        };

        let children = self.sorted_canvas_children(record.children.iter(), record.sort_children_by_y);
        for &(child, child_record) in children.iter().filter(|(_, c)| c.draw_behind_parent) {
            self.flatten_canvas_item(child, child_record, own, None, out);
        }
        out.push(CanvasItemFrame {
            item: rid,
            transform: own.transform,
            modulate: own.modulate.modulate(record.self_modulate),
            z: own.z,
            light_mask: record.light_mask,
            clip: record.clip,
            custom_rect: record.custom_rect,
            distance_field: record.distance_field,
            copy_back_buffer: record.copy_back_buffer,
            material,
            mirroring,
            commands: record.commands.clone(),
        });
        for &(child, child_record) in children.iter().filter(|(_, c)| !c.draw_behind_parent) {
            self.flatten_canvas_item(child, child_record, own, None, out);
        }
    }

    /// Published form of a canvas: its items flattened into draw order
    pub(crate) fn canvas_frame(&self, canvas: Rid, record: &Canvas) -> CanvasFrame {
        let root = Inherited { transform: Transform2D::identity(), modulate: record.modulate, z: 0, material: None };
        let mut items = Vec::new();
        for (rid, item) in self.sorted_canvas_children(record.items.iter(), false) {
            let mirroring = record.mirroring.get(&rid).copied();
            self.flatten_canvas_item(rid, item, root, mirroring, &mut items);
        }
        items.sort_by_key(|item| item.z);

        CanvasFrame {
            canvas,
            modulate: record.modulate,
            items,
            lights: record
                .lights
                .iter()
                .filter(|&light| self.canvas_lights.resolve(light).is_some_and(|l| l.enabled))
                .collect(),
            occluders: record
                .occluders
                .iter()
                .filter(|&occluder| {
                    self.canvas_occluders
                        .resolve(occluder)
                        .is_some_and(|o| o.enabled && self.occluder_polygons.contains(o.polygon))
                })
                .collect(),
        }
    }
}
