//! Skeleton store

use crate::error::{check_index, ServerError, ServerResult};
use crate::foundation::math::{Transform, Transform2D};
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Skeleton record; bones are either all 3D or all 2D
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    /// Whether the bones are 2D
    pub use_2d: bool,
    /// 3D bone transforms
    pub bones: Vec<Transform>,
    /// 2D bone transforms
    pub bones_2d: Vec<Transform2D>,
}

impl Skeleton {
    /// Number of bones
    pub fn bone_count(&self) -> usize {
        if self.use_2d {
            self.bones_2d.len()
        } else {
            self.bones.len()
        }
    }
}

impl RenderServer {
    /// Create a skeleton with no bones
    pub fn skeleton_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Skeleton);
        self.skeletons.insert(rid, Skeleton::default());
        rid
    }

    /// Resize to `bones` identity bones of the given dimensionality
    pub fn skeleton_allocate(&mut self, skeleton: Rid, bones: usize, use_2d: bool) -> ServerResult<()> {
        let record = self.skeletons.get_mut(skeleton)?;
        record.use_2d = use_2d;
        if use_2d {
            record.bones.clear();
            record.bones_2d = vec![Transform2D::identity(); bones];
        } else {
            record.bones_2d.clear();
            record.bones = vec![Transform::identity(); bones];
        }
        self.mark_resources_dirty();
        Ok(())
    }

    /// Number of bones
    pub fn skeleton_get_bone_count(&self, skeleton: Rid) -> ServerResult<usize> {
        Ok(self.skeletons.get(skeleton)?.bone_count())
    }

    /// Set a 3D bone transform
    pub fn skeleton_bone_set_transform(&mut self, skeleton: Rid, bone: usize, transform: Transform) -> ServerResult<()> {
        let record = self.skeletons.get_mut(skeleton)?;
        if record.use_2d {
            return Err(ServerError::invalid_state(format!("skeleton {skeleton} is 2D")));
        }
        check_index("bone", bone, record.bones.len())?;
        record.bones[bone] = transform;
        self.mark_resources_dirty();
        Ok(())
    }

    /// 3D bone transform; identity on a 2D skeleton
    pub fn skeleton_bone_get_transform(&self, skeleton: Rid, bone: usize) -> ServerResult<Transform> {
        let record = self.skeletons.get(skeleton)?;
        check_index("bone", bone, record.bone_count())?;
        Ok(record.bones.get(bone).copied().unwrap_or_default())
    }

    /// Set a 2D bone transform
    pub fn skeleton_bone_set_transform_2d(&mut self, skeleton: Rid, bone: usize, transform: Transform2D) -> ServerResult<()> {
        let record = self.skeletons.get_mut(skeleton)?;
        if !record.use_2d {
            return Err(ServerError::invalid_state(format!("skeleton {skeleton} is 3D")));
        }
        check_index("bone", bone, record.bones_2d.len())?;
        record.bones_2d[bone] = transform;
        self.mark_resources_dirty();
        Ok(())
    }

    /// 2D bone transform; identity on a 3D skeleton
    pub fn skeleton_bone_get_transform_2d(&self, skeleton: Rid, bone: usize) -> ServerResult<Transform2D> {
        let record = self.skeletons.get(skeleton)?;
        check_index("bone", bone, record.bone_count())?;
        Ok(record.bones_2d.get(bone).copied().unwrap_or_else(Transform2D::identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_bone_transforms() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let skeleton = vs.skeleton_create();
        vs.skeleton_allocate(skeleton, 3, false).expect("allocate");

        let moved = Transform::from_position(Vec3::new(0.0, 1.0, 0.0));
        vs.skeleton_bone_set_transform(skeleton, 2, moved).expect("set");
        assert_eq!(vs.skeleton_bone_get_transform(skeleton, 2), Ok(moved));
        assert_eq!(vs.skeleton_get_bone_count(skeleton), Ok(3));
        assert!(matches!(
            vs.skeleton_bone_set_transform(skeleton, 3, moved),
            Err(ServerError::OutOfRange { what: "bone", .. })
        ));
    }

    #[test]
    fn test_dimensionality_mismatch() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let skeleton = vs.skeleton_create();
        vs.skeleton_allocate(skeleton, 1, true).expect("allocate");

        assert!(matches!(
            vs.skeleton_bone_set_transform(skeleton, 0, Transform::identity()),
            Err(ServerError::InvalidState(_))
        ));
        assert_eq!(vs.skeleton_bone_get_transform(skeleton, 0), Ok(Transform::identity()));
        vs.skeleton_bone_set_transform_2d(skeleton, 0, Transform2D::new_translation(&crate::foundation::math::Vec2::new(1.0, 2.0)))
            .expect("2d");
    }
}
