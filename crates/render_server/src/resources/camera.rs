//! Camera store

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::Transform;
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Camera projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in degrees
        fov_degrees: f32,
        /// Near plane
        z_near: f32,
        /// Far plane
        z_far: f32,
    },
    /// Orthogonal projection
    Orthogonal {
        /// Vertical size of the view volume
        size: f32,
        /// Near plane
        z_near: f32,
        /// Far plane
        z_far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Perspective { fov_degrees: 70.0, z_near: 0.05, z_far: 100.0 }
    }
}

/// Camera record
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Projection
    pub projection: Projection,
    /// World transform
    pub transform: Transform,
    /// Layers the camera sees
    pub cull_mask: u32,
    /// Environment overriding the scenario's
    pub environment: Rid,
    /// Keep the vertical aspect fixed instead of the horizontal one
    pub vertical_aspect: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            transform: Transform::identity(),
            cull_mask: u32::MAX,
            environment: Rid::empty(),
            vertical_aspect: false,
        }
    }
}

fn check_clip_planes(z_near: f32, z_far: f32) -> ServerResult<()> {
    if z_near <= 0.0 || z_far <= z_near {
        return Err(ServerError::invalid_state(format!(
            "invalid clip planes near {z_near} far {z_far}"
        )));
    }
    Ok(())
}

impl RenderServer {
    /// Create a perspective camera at the origin
    pub fn camera_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Camera);
        self.cameras.insert(rid, Camera::default());
        rid
    }

    /// Switch to a perspective projection
    pub fn camera_set_perspective(&mut self, camera: Rid, fov_degrees: f32, z_near: f32, z_far: f32) -> ServerResult<()> {
        check_clip_planes(z_near, z_far)?;
        self.cameras.get_mut(camera)?.projection = Projection::Perspective { fov_degrees, z_near, z_far };
        self.mark_staged();
        Ok(())
    }

    /// Switch to an orthogonal projection
    pub fn camera_set_orthogonal(&mut self, camera: Rid, size: f32, z_near: f32, z_far: f32) -> ServerResult<()> {
        check_clip_planes(z_near, z_far)?;
        self.cameras.get_mut(camera)?.projection = Projection::Orthogonal { size, z_near, z_far };
        self.mark_staged();
        Ok(())
    }

    /// Set the world transform
    pub fn camera_set_transform(&mut self, camera: Rid, transform: Transform) -> ServerResult<()> {
        self.cameras.get_mut(camera)?.transform = transform;
        self.mark_staged();
        Ok(())
    }

    /// Set the visible layers
    pub fn camera_set_cull_mask(&mut self, camera: Rid, mask: u32) -> ServerResult<()> {
        self.cameras.get_mut(camera)?.cull_mask = mask;
        self.mark_staged();
        Ok(())
    }

    /// Override the scenario environment; the empty handle removes the override
    pub fn camera_set_environment(&mut self, camera: Rid, environment: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(environment, ResourceKind::Environment)?;
        self.cameras.get_mut(camera)?.environment = environment;
        self.mark_staged();
        Ok(())
    }

    /// Keep the vertical aspect fixed
    pub fn camera_set_use_vertical_aspect(&mut self, camera: Rid, enable: bool) -> ServerResult<()> {
        self.cameras.get_mut(camera)?.vertical_aspect = enable;
        self.mark_staged();
        Ok(())
    }

    /// Camera record
    pub fn camera(&self, camera: Rid) -> ServerResult<&Camera> {
        self.cameras.get(camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;

    #[test]
    fn test_projection_switch() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let camera = vs.camera_create();

        vs.camera_set_orthogonal(camera, 10.0, 0.1, 50.0).expect("ortho");
        assert_eq!(
            vs.camera(camera).expect("camera").projection,
            Projection::Orthogonal { size: 10.0, z_near: 0.1, z_far: 50.0 }
        );
        assert!(vs.camera_set_perspective(camera, 60.0, 1.0, 0.5).is_err());
    }

    #[test]
    fn test_environment_must_be_environment() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let camera = vs.camera_create();
        let env = vs.environment_create();
        let mesh = vs.mesh_create();

        assert!(vs.camera_set_environment(camera, mesh).is_err());
        vs.camera_set_environment(camera, env).expect("env");
        assert_eq!(vs.camera(camera).expect("camera").environment, env);
    }
}
