//! Immediate geometry store
//!
//! Geometry is recorded in chunks between `immediate_begin` and
//! `immediate_end`. Attribute calls set the state picked up by the next
//! `immediate_vertex`.

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Color, Vec2, Vec3, Vec4};
use crate::resources::handle::{ResourceKind, Rid};
use crate::resources::mesh::PrimitiveType;
use crate::scene::culling::AABB;
use crate::server::RenderServer;

/// One recorded vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImmediateVertex {
    /// Position
    pub position: Vec3,
    /// Normal
    pub normal: Vec3,
    /// Tangent, w is the binormal sign
    pub tangent: Vec4,
    /// Color
    pub color: Color,
    /// First UV channel
    pub uv: Vec2,
    /// Second UV channel
    pub uv2: Vec2,
}

impl Default for ImmediateVertex {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            normal: Vec3::z(),
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            color: Color::WHITE,
            uv: Vec2::zeros(),
            uv2: Vec2::zeros(),
        }
    }
}

/// Geometry recorded by one begin/end pair
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImmediateChunk {
    /// Primitive assembly
    pub primitive: PrimitiveType,
    /// Texture sampled by the chunk
    pub texture: Rid,
    /// Vertices in submission order
    pub vertices: Vec<ImmediateVertex>,
}

/// Immediate geometry record
#[derive(Debug, Clone, Default)]
pub struct Immediate {
    /// Finished chunks
    pub chunks: Vec<ImmediateChunk>,
    /// Material used for every chunk
    pub material: Rid,
    building: Option<ImmediateChunk>,
    pending: ImmediateVertex,
}

impl Immediate {
    /// Whether a chunk is being recorded
    pub fn is_building(&self) -> bool {
        self.building.is_some()
    }

    /// Vertices across finished chunks
    pub fn vertex_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.vertices.len()).sum()
    }

    /// Bounds of every finished vertex
    pub fn aabb(&self) -> Option<AABB> {
        AABB::from_points(self.chunks.iter().flat_map(|c| c.vertices.iter().map(|v| v.position)))
    }

    fn chunk_mut(&mut self, immediate: Rid) -> ServerResult<&mut ImmediateChunk> {
        self.building
            .as_mut()
            .ok_or_else(|| ServerError::invalid_state(format!("immediate {immediate} is not recording")))
    }
}

impl RenderServer {
    /// Create empty immediate geometry
    pub fn immediate_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Immediate);
        self.immediates.insert(rid, Immediate::default());
        rid
    }

    /// Start recording a chunk
    pub fn immediate_begin(&mut self, immediate: Rid, primitive: PrimitiveType, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        let record = self.immediates.get_mut(immediate)?;
        if record.is_building() {
            return Err(ServerError::invalid_state(format!("immediate {immediate} is already recording")));
        }
        record.building = Some(ImmediateChunk { primitive, texture, vertices: Vec::new() });
        record.pending = ImmediateVertex::default();
        Ok(())
    }

    /// Emit a vertex with the current attributes
    pub fn immediate_vertex(&mut self, immediate: Rid, position: Vec3) -> ServerResult<()> {
        let record = self.immediates.get_mut(immediate)?;
        let vertex = ImmediateVertex { position, ..record.pending };
        record.chunk_mut(immediate)?.vertices.push(vertex);
        Ok(())
    }

    /// Emit a vertex on the z = 0 plane
    pub fn immediate_vertex_2d(&mut self, immediate: Rid, position: Vec2) -> ServerResult<()> {
        self.immediate_vertex(immediate, Vec3::new(position.x, position.y, 0.0))
    }

    /// Normal for following vertices
    pub fn immediate_normal(&mut self, immediate: Rid, normal: Vec3) -> ServerResult<()> {
        self.update_pending(immediate, |v| v.normal = normal)
    }

    /// Tangent for following vertices
    pub fn immediate_tangent(&mut self, immediate: Rid, tangent: Vec4) -> ServerResult<()> {
        self.update_pending(immediate, |v| v.tangent = tangent)
    }

    /// Color for following vertices
    pub fn immediate_color(&mut self, immediate: Rid, color: Color) -> ServerResult<()> {
        self.update_pending(immediate, |v| v.color = color)
    }

    /// UV for following vertices
    pub fn immediate_uv(&mut self, immediate: Rid, uv: Vec2) -> ServerResult<()> {
        self.update_pending(immediate, |v| v.uv = uv)
    }

    /// Second UV for following vertices
    pub fn immediate_uv2(&mut self, immediate: Rid, uv: Vec2) -> ServerResult<()> {
        self.update_pending(immediate, |v| v.uv2 = uv)
    }

    fn update_pending(&mut self, immediate: Rid, update: impl FnOnce(&mut ImmediateVertex)) -> ServerResult<()> {
        let record = self.immediates.get_mut(immediate)?;
        record.chunk_mut(immediate)?;
        update(&mut record.pending);
        Ok(())
    }

    /// Finish the chunk being recorded
    pub fn immediate_end(&mut self, immediate: Rid) -> ServerResult<()> {
        let record = self.immediates.get_mut(immediate)?;
        let chunk = record
            .building
            .take()
            .ok_or_else(|| ServerError::invalid_state(format!("immediate {immediate} is not recording")))?;
        record.chunks.push(chunk);
        self.mark_resources_dirty();
        Ok(())
    }

    /// Drop every finished chunk
    pub fn immediate_clear(&mut self, immediate: Rid) -> ServerResult<()> {
        let record = self.immediates.get_mut(immediate)?;
        if record.is_building() {
            return Err(ServerError::invalid_state(format!("immediate {immediate} is still recording")));
        }
        record.chunks.clear();
        self.mark_resources_dirty();
        Ok(())
    }

    /// Material for every chunk; the empty handle unbinds
    pub fn immediate_set_material(&mut self, immediate: Rid, material: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(material, ResourceKind::Material)?;
        self.immediates.get_mut(immediate)?.material = material;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Material, `None` if unset or freed
    pub fn immediate_get_material(&self, immediate: Rid) -> ServerResult<Option<Rid>> {
        let material = self.immediates.get(immediate)?.material;
        Ok(self.materials.contains(material).then_some(material))
    }

    /// Immediate geometry record
    pub fn immediate(&self, immediate: Rid) -> ServerResult<&Immediate> {
        self.immediates.get(immediate)
    }
}
