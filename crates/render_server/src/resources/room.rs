//! Room and portal stores
//!
//! A room is a union of convex prisms: a convex polygon in the XZ plane
//! extruded upward by a height, then placed by a transform. Portals are
//! convex outlines in their local XY plane (z = 0).
//!
//! Instances reference rooms and LOD sources by plain handle. Nothing here
//! detects reference cycles between rooms, portals and instances.

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Color, Transform, Vec2, Vec3};
use crate::resources::handle::{ResourceKind, Rid};
use crate::scene::culling::AABB;
use crate::server::RenderServer;

/// One convex prism of a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomBound {
    /// Convex outline in the XZ plane
    pub polygon: Vec<Vec2>,
    /// Extrusion along +Y
    pub height: f32,
    /// Placement of the prism
    pub transform: Transform,
}

impl RoomBound {
    /// Bounds of the placed prism
    pub fn aabb(&self) -> Option<AABB> {
        let points = self.polygon.iter().flat_map(|p| {
            [0.0, self.height].map(|y| self.transform.transform_point(Vec3::new(p.x, y, p.y)))
        });
        AABB::from_points(points)
    }
}

/// Room record
#[derive(Debug, Clone, Default)]
pub struct Room {
    /// Convex prisms making up the room
    pub bounds: Vec<RoomBound>,
}

impl Room {
    /// Union of every prism's bounds
    pub fn aabb(&self) -> Option<AABB> {
        self.bounds.iter().filter_map(RoomBound::aabb).reduce(|a, b| a.merge(&b))
    }
}

/// Portal record
#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    /// Convex outline, clockwise points outward
    pub shape: Vec<Vec2>,
    /// Whether the portal connects its rooms
    pub enabled: bool,
    /// Distance past which the portal is treated as closed
    pub disable_distance: f32,
    /// Color drawn when closed by distance
    pub disabled_color: Color,
}

impl Default for Portal {
    fn default() -> Self {
        Self { shape: Vec::new(), enabled: true, disable_distance: 0.0, disabled_color: Color::BLACK }
    }
}

impl Portal {
    /// Bounds of the outline in its plane
    pub fn aabb(&self) -> Option<AABB> {
        AABB::from_points(self.shape.iter().map(|p| Vec3::new(p.x, p.y, 0.0)))
    }
}

impl RenderServer {
    /// Create a room with no bounds
    pub fn room_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Room);
        self.rooms.insert(rid, Room::default());
        rid
    }

    /// Add a convex prism to the room
    pub fn room_add_bounds(&mut self, room: Rid, polygon: &[Vec2], height: f32, transform: Transform) -> ServerResult<()> {
        if polygon.len() < 3 {
            return Err(ServerError::invalid_state(format!(
                "room bounds need at least 3 points, got {}",
                polygon.len()
            )));
        }
        if height < 0.0 {
            return Err(ServerError::invalid_state(format!("room height must be non-negative, got {height}")));
        }
        self.rooms.get_mut(room)?.bounds.push(RoomBound { polygon: polygon.to_vec(), height, transform });
        self.mark_resources_dirty();
        Ok(())
    }

    /// Remove every prism
    pub fn room_clear_bounds(&mut self, room: Rid) -> ServerResult<()> {
        self.rooms.get_mut(room)?.bounds.clear();
        self.mark_resources_dirty();
        Ok(())
    }

    /// Room record
    pub fn room(&self, room: Rid) -> ServerResult<&Room> {
        self.rooms.get(room)
    }

    /// Create an enabled portal with no shape
    pub fn portal_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Portal);
        self.portals.insert(rid, Portal::default());
        rid
    }

    /// Set the outline
    pub fn portal_set_shape(&mut self, portal: Rid, shape: &[Vec2]) -> ServerResult<()> {
        self.portals.get_mut(portal)?.shape = shape.to_vec();
        self.mark_resources_dirty();
        Ok(())
    }

    /// Open or close the portal
    pub fn portal_set_enabled(&mut self, portal: Rid, enabled: bool) -> ServerResult<()> {
        self.portals.get_mut(portal)?.enabled = enabled;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the closing distance
    pub fn portal_set_disable_distance(&mut self, portal: Rid, distance: f32) -> ServerResult<()> {
        self.portals.get_mut(portal)?.disable_distance = distance;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the color drawn when closed by distance
    pub fn portal_set_disabled_color(&mut self, portal: Rid, color: Color) -> ServerResult<()> {
        self.portals.get_mut(portal)?.disabled_color = color;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Portal record
    pub fn portal(&self, portal: Rid) -> ServerResult<&Portal> {
        self.portals.get(portal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use approx::assert_relative_eq;

    fn square() -> Vec<Vec2> {
        vec![Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0), Vec2::new(2.0, 2.0), Vec2::new(0.0, 2.0)]
    }

    #[test]
    fn test_room_bounds_are_prisms() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let room = vs.room_create();
        vs.room_add_bounds(room, &square(), 3.0, Transform::from_position(Vec3::new(10.0, 0.0, 0.0)))
            .expect("bounds");

        let aabb = vs.room(room).expect("room").aabb().expect("aabb");
        assert_relative_eq!(aabb.min, Vec3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(aabb.max, Vec3::new(12.0, 3.0, 2.0));

        vs.room_clear_bounds(room).expect("clear");
        assert!(vs.room(room).expect("room").aabb().is_none());
    }

    #[test]
    fn test_degenerate_room_polygon_rejected() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let room = vs.room_create();
        assert!(vs.room_add_bounds(room, &square()[..2], 1.0, Transform::identity()).is_err());
    }

    #[test]
    fn test_portal_defaults_and_shape() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let portal = vs.portal_create();
        assert!(vs.portal(portal).expect("portal").enabled);

        vs.portal_set_shape(portal, &square()).expect("shape");
        vs.portal_set_enabled(portal, false).expect("enabled");
        let record = vs.portal(portal).expect("portal");
        assert!(!record.enabled);
        assert_relative_eq!(record.aabb().expect("aabb").max, Vec3::new(2.0, 2.0, 0.0));
    }
}
