//! Multimesh store
//!
//! A multimesh draws one mesh many times. Per-instance transforms are either
//! 3D or 2D, fixed at allocation, and per-instance colors are optional.

use crate::error::{check_index, ServerError, ServerResult};
use crate::foundation::math::{Color, Transform, Transform2D, Vec3};
use crate::resources::handle::{ResourceKind, Rid};
use crate::scene::culling::AABB;
use crate::server::RenderServer;

/// Dimensionality of per-instance transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MultimeshTransformFormat {
    /// 2D affine transforms
    Transform2D,
    /// 3D transforms
    #[default]
    Transform3D,
}

/// Storage of per-instance colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MultimeshColorFormat {
    /// No per-instance color
    #[default]
    None,
    /// 8 bits per channel
    Color8Bit,
    /// Float channels
    Float,
}

/// Per-instance data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultimeshInstance {
    /// 3D transform (3D format only)
    pub transform: Transform,
    /// 2D transform (2D format only)
    pub transform_2d: Transform2D,
    /// Color (when a color format is set)
    pub color: Color,
}

impl Default for MultimeshInstance {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            transform_2d: Transform2D::identity(),
            color: Color::WHITE,
        }
    }
}

/// Multimesh record
#[derive(Debug, Clone, Default)]
pub struct Multimesh {
    /// Mesh drawn for every instance
    pub mesh: Rid,
    /// Transform dimensionality
    pub transform_format: MultimeshTransformFormat,
    /// Color storage
    pub color_format: MultimeshColorFormat,
    /// Instance table
    pub instances: Vec<MultimeshInstance>,
    /// How many instances are drawn, `None` for all
    pub visible_instances: Option<usize>,
}

impl Multimesh {
    /// Instances that are actually drawn
    pub fn visible(&self) -> &[MultimeshInstance] {
        let count = self.visible_instances.map_or(self.instances.len(), |n| n.min(self.instances.len()));
        &self.instances[..count]
    }

    fn instance(&self, index: usize) -> ServerResult<&MultimeshInstance> {
        check_index("multimesh instance", index, self.instances.len())?;
        Ok(&self.instances[index])
    }

    fn instance_mut(&mut self, index: usize) -> ServerResult<&mut MultimeshInstance> {
        check_index("multimesh instance", index, self.instances.len())?;
        Ok(&mut self.instances[index])
    }
}

impl RenderServer {
    /// Create an empty multimesh
    pub fn multimesh_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Multimesh);
        self.multimeshes.insert(rid, Multimesh::default());
        rid
    }

    /// Size the instance table; existing instance data is reset
    pub fn multimesh_allocate(
        &mut self,
        multimesh: Rid,
        instances: usize,
        transform_format: MultimeshTransformFormat,
        color_format: MultimeshColorFormat,
    ) -> ServerResult<()> {
        let record = self.multimeshes.get_mut(multimesh)?;
        record.transform_format = transform_format;
        record.color_format = color_format;
        record.instances = vec![MultimeshInstance::default(); instances];
        record.visible_instances = None;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Size of the instance table
    pub fn multimesh_get_instance_count(&self, multimesh: Rid) -> ServerResult<usize> {
        Ok(self.multimeshes.get(multimesh)?.instances.len())
    }

    /// Set the mesh drawn per instance; the empty handle unbinds
    pub fn multimesh_set_mesh(&mut self, multimesh: Rid, mesh: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(mesh, ResourceKind::Mesh)?;
        self.multimeshes.get_mut(multimesh)?.mesh = mesh;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Mesh drawn per instance, `None` if unset or freed
    pub fn multimesh_get_mesh(&self, multimesh: Rid) -> ServerResult<Option<Rid>> {
        let mesh = self.multimeshes.get(multimesh)?.mesh;
        Ok(self.meshes.contains(mesh).then_some(mesh))
    }

    /// Set a 3D instance transform
    pub fn multimesh_instance_set_transform(&mut self, multimesh: Rid, index: usize, transform: Transform) -> ServerResult<()> {
        let record = self.multimeshes.get_mut(multimesh)?;
        if record.transform_format != MultimeshTransformFormat::Transform3D {
            return Err(ServerError::invalid_state(format!("multimesh {multimesh} uses 2D transforms")));
        }
        record.instance_mut(index)?.transform = transform;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set a 2D instance transform
    pub fn multimesh_instance_set_transform_2d(
        &mut self,
        multimesh: Rid,
        index: usize,
        transform: Transform2D,
    ) -> ServerResult<()> {
        let record = self.multimeshes.get_mut(multimesh)?;
        if record.transform_format != MultimeshTransformFormat::Transform2D {
            return Err(ServerError::invalid_state(format!("multimesh {multimesh} uses 3D transforms")));
        }
        record.instance_mut(index)?.transform_2d = transform;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set an instance color
    pub fn multimesh_instance_set_color(&mut self, multimesh: Rid, index: usize, color: Color) -> ServerResult<()> {
        let record = self.multimeshes.get_mut(multimesh)?;
        if record.color_format == MultimeshColorFormat::None {
            return Err(ServerError::invalid_state(format!("multimesh {multimesh} has no color format")));
        }
        record.instance_mut(index)?.color = color;
        self.mark_resources_dirty();
        Ok(())
    }

    /// 3D instance transform; identity on a 2D multimesh
    pub fn multimesh_instance_get_transform(&self, multimesh: Rid, index: usize) -> ServerResult<Transform> {
        let record = self.multimeshes.get(multimesh)?;
        let instance = record.instance(index)?;
        Ok(match record.transform_format {
            MultimeshTransformFormat::Transform3D => instance.transform,
            MultimeshTransformFormat::Transform2D => Transform::identity(),
        })
    }

    /// 2D instance transform; identity on a 3D multimesh
    pub fn multimesh_instance_get_transform_2d(&self, multimesh: Rid, index: usize) -> ServerResult<Transform2D> {
        let record = self.multimeshes.get(multimesh)?;
        let instance = record.instance(index)?;
        Ok(match record.transform_format {
            MultimeshTransformFormat::Transform2D => instance.transform_2d,
            MultimeshTransformFormat::Transform3D => Transform2D::identity(),
        })
    }

    /// Instance color; white without a color format
    pub fn multimesh_instance_get_color(&self, multimesh: Rid, index: usize) -> ServerResult<Color> {
        let record = self.multimeshes.get(multimesh)?;
        let instance = record.instance(index)?;
        Ok(match record.color_format {
            MultimeshColorFormat::None => Color::WHITE,
            _ => instance.color,
        })
    }

    /// Limit drawing to the first `visible` instances; `None` draws all
    pub fn multimesh_set_visible_instances(&mut self, multimesh: Rid, visible: Option<usize>) -> ServerResult<()> {
        let record = self.multimeshes.get_mut(multimesh)?;
        if let Some(count) = visible {
            if count > record.instances.len() {
                return Err(ServerError::out_of_range("visible instance count", count, record.instances.len() + 1));
            }
        }
        record.visible_instances = visible;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Visible instance limit, `None` for all
    pub fn multimesh_get_visible_instances(&self, multimesh: Rid) -> ServerResult<Option<usize>> {
        Ok(self.multimeshes.get(multimesh)?.visible_instances)
    }

    /// Bounds of every visible instance's mesh; `None` without a live mesh or instances
    pub fn multimesh_get_aabb(&self, multimesh: Rid) -> ServerResult<Option<AABB>> {
        let record = self.multimeshes.get(multimesh)?;
        Ok(self.multimesh_local_aabb(record))
    }

    pub(crate) fn multimesh_local_aabb(&self, record: &Multimesh) -> Option<AABB> {
        let mesh_aabb = self.meshes.resolve(record.mesh)?.local_aabb()?;
        record
            .visible()
            .iter()
            .map(|instance| match record.transform_format {
                MultimeshTransformFormat::Transform3D => mesh_aabb.transformed(&instance.transform.to_matrix()),
                MultimeshTransformFormat::Transform2D => {
                    let points = mesh_aabb.corners().map(|c| {
                        let p = instance.transform_2d * Vec3::new(c.x, c.y, 1.0);
                        Vec3::new(p.x, p.y, c.z)
                    });
                    AABB::from_points(points).unwrap_or(mesh_aabb)
                }
            })
            .reduce(|a, b| a.merge(&b))
    }
}
