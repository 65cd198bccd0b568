//! # 2D Lights and Occluders
//!
//! Canvas lights and light occluders live in their own stores and are
//! attached to at most one canvas at a time. The canvas keeps the membership
//! sets; attaching elsewhere moves the handle between sets.
//!
//! Occluder polygons hold the shape shared by any number of occluders. An
//! occluder pointing at a freed polygon simply casts nothing.

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{utils, Color, Transform2D, Vec2};
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Canvas z limit, shared with canvas items
pub const CANVAS_ITEM_Z_MAX: i32 = 4096;
/// Canvas z lower limit
pub const CANVAS_ITEM_Z_MIN: i32 = -4096;

const SHADOW_BUFFER_MIN: u32 = 32;
const SHADOW_BUFFER_MAX: u32 = 16384;

/// How a light combines with what it touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanvasLightMode {
    /// Add
    #[default]
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mix,
    /// Only lit where the mask texture is set
    Mask,
}

/// Shadow edge filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanvasLightShadowFilter {
    /// Hard edges
    #[default]
    None,
    /// 3-tap PCF
    Pcf3,
    /// 5-tap PCF
    Pcf5,
    /// 7-tap PCF
    Pcf7,
    /// 9-tap PCF
    Pcf9,
    /// 13-tap PCF
    Pcf13,
}

/// Which polygon faces block light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OccluderPolygonCullMode {
    /// Both faces
    #[default]
    Disabled,
    /// Clockwise faces
    Clockwise,
    /// Counter-clockwise faces
    CounterClockwise,
}

/// Canvas light record
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLight {
    /// Canvas the light is attached to
    pub canvas: Rid,
    /// Enabled
    pub enabled: bool,
    /// Texture scale
    pub scale: f32,
    /// Placement in canvas space
    pub transform: Transform2D,
    /// Light shape texture
    pub texture: Rid,
    /// Texture offset
    pub texture_offset: Vec2,
    /// Color
    pub color: Color,
    /// Height for normal-mapped lighting
    pub height: f32,
    /// Energy
    pub energy: f32,
    /// Item z range lit, inclusive
    pub z_range: (i32, i32),
    /// Canvas layer range lit, inclusive
    pub layer_range: (i32, i32),
    /// Item light mask filter
    pub item_cull_mask: u32,
    /// Item mask filter for shadow casting
    pub item_shadow_cull_mask: u32,
    /// Blend mode
    pub mode: CanvasLightMode,
    /// Shadows enabled
    pub shadow_enabled: bool,
    /// Shadow map width, power of two
    pub shadow_buffer_size: u32,
    /// Shadow gradient length
    pub shadow_gradient_length: f32,
    /// Shadow filter
    pub shadow_filter: CanvasLightShadowFilter,
    /// Shadow color
    pub shadow_color: Color,
}

impl Default for CanvasLight {
    fn default() -> Self {
        Self {
            canvas: Rid::empty(),
            enabled: true,
            scale: 1.0,
            transform: Transform2D::identity(),
            texture: Rid::empty(),
            texture_offset: Vec2::zeros(),
            color: Color::WHITE,
            height: 0.0,
            energy: 1.0,
            z_range: (-1024, 1024),
            layer_range: (0, 0),
            item_cull_mask: 1,
            item_shadow_cull_mask: 1,
            mode: CanvasLightMode::Add,
            shadow_enabled: false,
            shadow_buffer_size: 2048,
            shadow_gradient_length: 0.0,
            shadow_filter: CanvasLightShadowFilter::None,
            shadow_color: Color::BLACK,
        }
    }
}

/// Light occluder record
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLightOccluder {
    /// Canvas the occluder is attached to
    pub canvas: Rid,
    /// Enabled
    pub enabled: bool,
    /// Shape
    pub polygon: Rid,
    /// Placement in canvas space
    pub transform: Transform2D,
    /// Lights whose item cull mask overlaps this mask are blocked
    pub light_mask: u32,
}

impl Default for CanvasLightOccluder {
    fn default() -> Self {
        Self {
            canvas: Rid::empty(),
            enabled: true,
            polygon: Rid::empty(),
            transform: Transform2D::identity(),
            light_mask: 1,
        }
    }
}

/// Occluder polygon record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OccluderPolygon {
    /// Outline points
    pub points: Vec<Vec2>,
    /// Whether the last point joins the first
    pub closed: bool,
    /// Segment pairs derived from the outline or set directly
    pub lines: Vec<Vec2>,
    /// Face culling
    pub cull_mode: OccluderPolygonCullMode,
}

fn outline_to_lines(points: &[Vec2], closed: bool) -> Vec<Vec2> {
    let mut lines: Vec<Vec2> = points.windows(2).flat_map(|pair| [pair[0], pair[1]]).collect();
    if closed && points.len() > 2 {
        if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
            lines.extend([last, first]);
        }
    }
    lines
}

impl RenderServer {
    /// Create an enabled, detached canvas light
    pub fn canvas_light_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::CanvasLight);
        self.canvas_lights.insert(rid, CanvasLight::default());
        rid
    }

    /// Move the light to `canvas`; the empty handle detaches it
    pub fn canvas_light_attach_to_canvas(&mut self, light: Rid, canvas: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(canvas, ResourceKind::Canvas)?;
        let record = self.canvas_lights.get_mut(light)?;
        let previous = std::mem::replace(&mut record.canvas, canvas);
        if let Some(old) = self.canvases.resolve_mut(previous) {
            old.lights.remove(&light);
        }
        if let Some(new) = self.canvases.resolve_mut(canvas) {
            new.lights.insert(light);
        }
        self.mark_staged();
        Ok(())
    }

    /// Enable or disable
    pub fn canvas_light_set_enabled(&mut self, light: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.enabled = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Set the texture scale
    pub fn canvas_light_set_scale(&mut self, light: Rid, scale: f32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.scale = scale;
        self.mark_staged();
        Ok(())
    }

    /// Set the placement
    pub fn canvas_light_set_transform(&mut self, light: Rid, transform: Transform2D) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the shape texture
    pub fn canvas_light_set_texture(&mut self, light: Rid, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        self.canvas_lights.get_mut(light)?.texture = texture;
        self.mark_staged();
        Ok(())
    }

    /// Set the texture offset
    pub fn canvas_light_set_texture_offset(&mut self, light: Rid, offset: Vec2) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.texture_offset = offset;
        self.mark_staged();
        Ok(())
    }

    /// Set the color
    pub fn canvas_light_set_color(&mut self, light: Rid, color: Color) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.color = color;
        self.mark_staged();
        Ok(())
    }

    /// Set the height
    pub fn canvas_light_set_height(&mut self, light: Rid, height: f32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.height = height;
        self.mark_staged();
        Ok(())
    }

    /// Set the energy
    pub fn canvas_light_set_energy(&mut self, light: Rid, energy: f32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.energy = energy;
        self.mark_staged();
        Ok(())
    }

    /// Set the lit z range, clamped to the canvas z limits
    pub fn canvas_light_set_z_range(&mut self, light: Rid, min_z: i32, max_z: i32) -> ServerResult<()> {
        let clamp = |z: i32| z.clamp(CANVAS_ITEM_Z_MIN, CANVAS_ITEM_Z_MAX);
        self.canvas_lights.get_mut(light)?.z_range = (clamp(min_z), clamp(max_z));
        self.mark_staged();
        Ok(())
    }

    /// Set the lit canvas layer range
    pub fn canvas_light_set_layer_range(&mut self, light: Rid, min_layer: i32, max_layer: i32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.layer_range = (min_layer, max_layer);
        self.mark_staged();
        Ok(())
    }

    /// Set the item cull mask
    pub fn canvas_light_set_item_cull_mask(&mut self, light: Rid, mask: u32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.item_cull_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow item cull mask
    pub fn canvas_light_set_item_shadow_cull_mask(&mut self, light: Rid, mask: u32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.item_shadow_cull_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Set the blend mode
    pub fn canvas_light_set_mode(&mut self, light: Rid, mode: CanvasLightMode) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.mode = mode;
        self.mark_staged();
        Ok(())
    }

    /// Toggle shadows
    pub fn canvas_light_set_shadow_enabled(&mut self, light: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.shadow_enabled = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow map width, clamped then rounded up to a power of two
    pub fn canvas_light_set_shadow_buffer_size(&mut self, light: Rid, size: u32) -> ServerResult<()> {
        let size = utils::next_power_of_two(size.clamp(SHADOW_BUFFER_MIN, SHADOW_BUFFER_MAX));
        self.canvas_lights.get_mut(light)?.shadow_buffer_size = size;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow gradient length
    pub fn canvas_light_set_shadow_gradient_length(&mut self, light: Rid, length: f32) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.shadow_gradient_length = length;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow filter
    pub fn canvas_light_set_shadow_filter(&mut self, light: Rid, filter: CanvasLightShadowFilter) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.shadow_filter = filter;
        self.mark_staged();
        Ok(())
    }

    /// Set the shadow color
    pub fn canvas_light_set_shadow_color(&mut self, light: Rid, color: Color) -> ServerResult<()> {
        self.canvas_lights.get_mut(light)?.shadow_color = color;
        self.mark_staged();
        Ok(())
    }

    /// Canvas light record
    pub fn canvas_light(&self, light: Rid) -> ServerResult<&CanvasLight> {
        self.canvas_lights.get(light)
    }

    /// Create an enabled, detached occluder with no polygon
    pub fn canvas_light_occluder_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::CanvasLightOccluder);
        self.canvas_occluders.insert(rid, CanvasLightOccluder::default());
        rid
    }

    /// Move the occluder to `canvas`; the empty handle detaches it
    pub fn canvas_light_occluder_attach_to_canvas(&mut self, occluder: Rid, canvas: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(canvas, ResourceKind::Canvas)?;
        let record = self.canvas_occluders.get_mut(occluder)?;
        let previous = std::mem::replace(&mut record.canvas, canvas);
        if let Some(old) = self.canvases.resolve_mut(previous) {
            old.occluders.remove(&occluder);
        }
        if let Some(new) = self.canvases.resolve_mut(canvas) {
            new.occluders.insert(occluder);
        }
        self.mark_staged();
        Ok(())
    }

    /// Enable or disable
    pub fn canvas_light_occluder_set_enabled(&mut self, occluder: Rid, enabled: bool) -> ServerResult<()> {
        self.canvas_occluders.get_mut(occluder)?.enabled = enabled;
        self.mark_staged();
        Ok(())
    }

    /// Set or clear the shape
    pub fn canvas_light_occluder_set_polygon(&mut self, occluder: Rid, polygon: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(polygon, ResourceKind::CanvasOccluderPolygon)?;
        self.canvas_occluders.get_mut(occluder)?.polygon = polygon;
        self.mark_staged();
        Ok(())
    }

    /// Set the placement
    pub fn canvas_light_occluder_set_transform(&mut self, occluder: Rid, transform: Transform2D) -> ServerResult<()> {
        self.canvas_occluders.get_mut(occluder)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set the light mask
    pub fn canvas_light_occluder_set_light_mask(&mut self, occluder: Rid, mask: u32) -> ServerResult<()> {
        self.canvas_occluders.get_mut(occluder)?.light_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Occluder record
    pub fn canvas_light_occluder(&self, occluder: Rid) -> ServerResult<&CanvasLightOccluder> {
        self.canvas_occluders.get(occluder)
    }

    /// Create an empty occluder polygon
    pub fn canvas_occluder_polygon_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::CanvasOccluderPolygon);
        self.occluder_polygons.insert(rid, OccluderPolygon::default());
        rid
    }

    /// Set the outline; segment pairs are derived from it
    pub fn canvas_occluder_polygon_set_shape(&mut self, polygon: Rid, points: &[Vec2], closed: bool) -> ServerResult<()> {
        let record = self.occluder_polygons.get_mut(polygon)?;
        record.points = points.to_vec();
        record.closed = closed;
        record.lines = outline_to_lines(points, closed);
        self.mark_staged();
        Ok(())
    }

    /// Set the segment pairs directly; `lines` holds two points per segment
    pub fn canvas_occluder_polygon_set_shape_as_lines(&mut self, polygon: Rid, lines: &[Vec2]) -> ServerResult<()> {
        if lines.len() % 2 != 0 {
            return Err(ServerError::invalid_state(format!(
                "occluder lines need an even point count, got {}",
                lines.len()
            )));
        }
        let record = self.occluder_polygons.get_mut(polygon)?;
        record.points.clear();
        record.closed = false;
        record.lines = lines.to_vec();
        self.mark_staged();
        Ok(())
    }

    /// Set face culling
    pub fn canvas_occluder_polygon_set_cull_mode(&mut self, polygon: Rid, mode: OccluderPolygonCullMode) -> ServerResult<()> {
        self.occluder_polygons.get_mut(polygon)?.cull_mode = mode;
        self.mark_staged();
        Ok(())
    }

    /// Occluder polygon record
    pub fn canvas_occluder_polygon(&self, polygon: Rid) -> ServerResult<&OccluderPolygon> {
        self.occluder_polygons.get(polygon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;

    #[test]
    fn test_light_moves_between_canvases() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let a = vs.canvas_create();
        let b = vs.canvas_create();
        let light = vs.canvas_light_create();

        vs.canvas_light_attach_to_canvas(light, a).expect("attach a");
        vs.canvas_light_attach_to_canvas(light, b).expect("attach b");

        assert!(!vs.canvas(a).expect("canvas").lights.contains(&light));
        assert!(vs.canvas(b).expect("canvas").lights.contains(&light));
        assert_eq!(vs.canvas_light(light).expect("light").canvas, b);

        vs.canvas_light_attach_to_canvas(light, Rid::empty()).expect("detach");
        assert!(vs.canvas(b).expect("canvas").lights.is_empty());
    }

    #[test]
    fn test_shadow_buffer_and_z_clamps() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let light = vs.canvas_light_create();

        vs.canvas_light_set_shadow_buffer_size(light, 1000).expect("size");
        assert_eq!(vs.canvas_light(light).expect("light").shadow_buffer_size, 1024);
        vs.canvas_light_set_shadow_buffer_size(light, 1).expect("size");
        assert_eq!(vs.canvas_light(light).expect("light").shadow_buffer_size, 32);

        vs.canvas_light_set_z_range(light, -10_000, 10_000).expect("z");
        assert_eq!(vs.canvas_light(light).expect("light").z_range, (CANVAS_ITEM_Z_MIN, CANVAS_ITEM_Z_MAX));
    }

    #[test]
    fn test_polygon_outline_to_lines() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let polygon = vs.canvas_occluder_polygon_create();
        let points = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)];

        vs.canvas_occluder_polygon_set_shape(polygon, &points, true).expect("shape");
        assert_eq!(vs.canvas_occluder_polygon(polygon).expect("polygon").lines.len(), 6);

        vs.canvas_occluder_polygon_set_shape(polygon, &points, false).expect("shape");
        assert_eq!(vs.canvas_occluder_polygon(polygon).expect("polygon").lines.len(), 4);

        assert!(vs.canvas_occluder_polygon_set_shape_as_lines(polygon, &points).is_err());
        assert_eq!(vs.canvas_occluder_polygon(polygon).expect("polygon").lines.len(), 4);
    }

    #[test]
    fn test_occluder_polygon_kind_checked() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let occluder = vs.canvas_light_occluder_create();
        let texture = vs.texture_create();
        assert!(vs.canvas_light_occluder_set_polygon(occluder, texture).is_err());
    }
}
