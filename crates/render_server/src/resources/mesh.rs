//! # Mesh Store
//!
//! A mesh is an ordered list of surfaces. Each surface holds interleaved
//! vertex bytes, optional index bytes, its bounding box, morph target buffers,
//! per-bone bounding boxes and the material bound to it. Every surface-level
//! operation is addressed by `(mesh, surface index)`.
//!
//! ## Vertex Layout
//!
//! Attributes are interleaved per vertex in [`ArrayFormat`] bit order:
//!
//! | attribute | bytes                |
//! |-----------|----------------------|
//! | vertex    | 12 (3 x f32)         |
//! | normal    | 12 (3 x f32)         |
//! | tangent   | 16 (4 x f32)         |
//! | color     | 16 (4 x f32)         |
//! | uv, uv2   | 8 each (2 x f32)     |
//! | bones     | 8 (4 x u16)          |
//! | weights   | 16 (4 x f32)         |
//!
//! Indices are `u16` when the surface has at most 65535 vertices, `u32`
//! otherwise.

use bitflags::bitflags;
use bytemuck::Pod;

use crate::error::{check_index, ServerError, ServerResult};
use crate::foundation::math::{Color, Vec2, Vec3, Vec4};
use crate::resources::handle::{ResourceKind, Rid};
use crate::scene::culling::AABB;
use crate::server::RenderServer;

bitflags! {
    /// Which vertex attributes a surface carries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArrayFormat: u32 {
        /// Positions (mandatory)
        const VERTEX = 1 << 0;
        /// Normals
        const NORMAL = 1 << 1;
        /// Tangents with binormal sign
        const TANGENT = 1 << 2;
        /// Vertex colors
        const COLOR = 1 << 3;
        /// First UV channel
        const TEX_UV = 1 << 4;
        /// Second UV channel
        const TEX_UV2 = 1 << 5;
        /// Bone indices
        const BONES = 1 << 6;
        /// Bone weights
        const WEIGHTS = 1 << 7;
        /// Index buffer present
        const INDEX = 1 << 8;
    }
}

/// Bone influences per vertex
pub const WEIGHTS_PER_VERTEX: usize = 4;

impl ArrayFormat {
    /// Bytes per interleaved vertex
    pub fn vertex_stride(self) -> usize {
        [
            (Self::VERTEX, 12),
            (Self::NORMAL, 12),
            (Self::TANGENT, 16),
            (Self::COLOR, 16),
            (Self::TEX_UV, 8),
            (Self::TEX_UV2, 8),
            (Self::BONES, 8),
            (Self::WEIGHTS, 16),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, size)| size)
        .sum()
    }
}

/// Bytes per index for a surface with `vertex_count` vertices
pub fn index_size(vertex_count: usize) -> usize {
    if vertex_count <= usize::from(u16::MAX) {
        2
    } else {
        4
    }
}

/// How vertices are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    /// Points
    Points,
    /// Line list
    Lines,
    /// Line strip
    LineStrip,
    /// Closed line strip
    LineLoop,
    /// Triangle list
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

/// How morph targets combine with the base shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MorphTargetMode {
    /// Weights are normalized against the base shape
    #[default]
    Normalized,
    /// Targets are offsets added to the base shape
    Relative,
}

/// Typed vertex arrays; empty vectors mean "attribute absent"
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshArrays {
    /// Positions
    pub vertices: Vec<Vec3>,
    /// Normals
    pub normals: Vec<Vec3>,
    /// Tangents, w is the binormal sign
    pub tangents: Vec<Vec4>,
    /// Vertex colors
    pub colors: Vec<Color>,
    /// First UV channel
    pub uvs: Vec<Vec2>,
    /// Second UV channel
    pub uv2s: Vec<Vec2>,
    /// Bone indices
    pub bones: Vec<[u16; WEIGHTS_PER_VERTEX]>,
    /// Bone weights
    pub weights: Vec<[f32; WEIGHTS_PER_VERTEX]>,
    /// Indices into the vertex arrays
    pub indices: Vec<u32>,
}

impl MeshArrays {
    /// Format bitmask describing which arrays are present
    pub fn format(&self) -> ArrayFormat {
        let mut format = ArrayFormat::empty();
        format.set(ArrayFormat::VERTEX, !self.vertices.is_empty());
        format.set(ArrayFormat::NORMAL, !self.normals.is_empty());
        format.set(ArrayFormat::TANGENT, !self.tangents.is_empty());
        format.set(ArrayFormat::COLOR, !self.colors.is_empty());
        format.set(ArrayFormat::TEX_UV, !self.uvs.is_empty());
        format.set(ArrayFormat::TEX_UV2, !self.uv2s.is_empty());
        format.set(ArrayFormat::BONES, !self.bones.is_empty());
        format.set(ArrayFormat::WEIGHTS, !self.weights.is_empty());
        format.set(ArrayFormat::INDEX, !self.indices.is_empty());
        format
    }

    /// Check array lengths against the vertex count and indices against range
    pub fn validate(&self, primitive: PrimitiveType) -> ServerResult<()> {
        let count = self.vertices.len();
        if count == 0 {
            return Err(ServerError::invalid_state("surface arrays must contain vertices"));
        }

        let lengths = [
            ("normal", self.normals.len()),
            ("tangent", self.tangents.len()),
            ("color", self.colors.len()),
            ("uv", self.uvs.len()),
            ("uv2", self.uv2s.len()),
            ("bone", self.bones.len()),
            ("weight", self.weights.len()),
        ];
        for (name, len) in lengths {
            if len != 0 && len != count {
                return Err(ServerError::invalid_state(format!(
                    "{name} array has {len} entries for {count} vertices"
                )));
            }
        }
        if self.bones.is_empty() != self.weights.is_empty() {
            return Err(ServerError::invalid_state("bone and weight arrays must be supplied together"));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(ServerError::out_of_range("vertex", index as usize, count));
        }
        if primitive == PrimitiveType::Triangles && self.indices.len() % 3 != 0 {
            return Err(ServerError::invalid_state(format!(
                "{} indices do not form whole triangles",
                self.indices.len()
            )));
        }
        Ok(())
    }

    /// Interleave the vertex attributes
    pub fn pack_vertices(&self) -> Vec<u8> {
        let format = self.format();
        let mut bytes = Vec::with_capacity(format.vertex_stride() * self.vertices.len());

        for i in 0..self.vertices.len() {
            let v = self.vertices[i];
            bytes.extend_from_slice(bytemuck::cast_slice(&[v.x, v.y, v.z]));
            if let Some(n) = self.normals.get(i) {
                bytes.extend_from_slice(bytemuck::cast_slice(&[n.x, n.y, n.z]));
            }
            if let Some(t) = self.tangents.get(i) {
                bytes.extend_from_slice(bytemuck::cast_slice(&[t.x, t.y, t.z, t.w]));
            }
            if let Some(c) = self.colors.get(i) {
                bytes.extend_from_slice(bytemuck::cast_slice(&[c.r, c.g, c.b, c.a]));
            }
            if let Some(uv) = self.uvs.get(i) {
                bytes.extend_from_slice(bytemuck::cast_slice(&[uv.x, uv.y]));
            }
            if let Some(uv) = self.uv2s.get(i) {
                bytes.extend_from_slice(bytemuck::cast_slice(&[uv.x, uv.y]));
            }
            if let Some(b) = self.bones.get(i) {
                bytes.extend_from_slice(bytemuck::bytes_of(b));
            }
            if let Some(w) = self.weights.get(i) {
                bytes.extend_from_slice(bytemuck::bytes_of(w));
            }
        }
        bytes
    }

    /// Pack the index array at the width the vertex count calls for
    pub fn pack_indices(&self) -> Vec<u8> {
        if index_size(self.vertices.len()) == 2 {
            let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
            bytemuck::cast_slice(&narrow).to_vec()
        } else {
            bytemuck::cast_slice(&self.indices).to_vec()
        }
    }

    /// Bounds of the positions
    pub fn aabb(&self) -> Option<AABB> {
        AABB::from_points(self.vertices.iter().copied())
    }

    /// Per-bone bounds of the vertices each bone influences
    pub fn bone_aabbs(&self) -> Vec<AABB> {
        let mut bounds: Vec<Option<AABB>> = Vec::new();
        for ((vertex, bones), weights) in self.vertices.iter().zip(&self.bones).zip(&self.weights) {
            for (&bone, &weight) in bones.iter().zip(weights) {
                if weight <= 0.0 {
                    continue;
                }
                let bone = usize::from(bone);
                if bounds.len() <= bone {
                    bounds.resize(bone + 1, None);
                }
                bounds[bone] = Some(match bounds[bone] {
                    Some(aabb) => aabb.expanded_to(*vertex),
                    None => AABB::new(*vertex, *vertex),
                });
            }
        }
        bounds.into_iter().map(Option::unwrap_or_default).collect()
    }
}

fn read<T: Pod>(bytes: &[u8], offset: &mut usize) -> T {
    let size = std::mem::size_of::<T>();
    let value = bytemuck::pod_read_unaligned(&bytes[*offset..*offset + size]);
    *offset += size;
    value
}

/// Decode interleaved buffers back into typed arrays
///
/// The buffers must have passed [`validate_buffers`].
pub fn decode_arrays(format: ArrayFormat, vertex_data: &[u8], vertex_count: usize, index_data: &[u8]) -> MeshArrays {
    let mut arrays = MeshArrays::default();
    let stride = format.vertex_stride();
    if stride == 0 {
        return arrays;
    }

    for chunk in vertex_data.chunks_exact(stride).take(vertex_count) {
        let mut offset = 0;
        if format.contains(ArrayFormat::VERTEX) {
            let [x, y, z]: [f32; 3] = read(chunk, &mut offset);
            arrays.vertices.push(Vec3::new(x, y, z));
        }
        if format.contains(ArrayFormat::NORMAL) {
            let [x, y, z]: [f32; 3] = read(chunk, &mut offset);
            arrays.normals.push(Vec3::new(x, y, z));
        }
        if format.contains(ArrayFormat::TANGENT) {
            let [x, y, z, w]: [f32; 4] = read(chunk, &mut offset);
            arrays.tangents.push(Vec4::new(x, y, z, w));
        }
        if format.contains(ArrayFormat::COLOR) {
            let [r, g, b, a]: [f32; 4] = read(chunk, &mut offset);
            arrays.colors.push(Color::rgba(r, g, b, a));
        }
        if format.contains(ArrayFormat::TEX_UV) {
            let [u, v]: [f32; 2] = read(chunk, &mut offset);
            arrays.uvs.push(Vec2::new(u, v));
        }
        if format.contains(ArrayFormat::TEX_UV2) {
            let [u, v]: [f32; 2] = read(chunk, &mut offset);
            arrays.uv2s.push(Vec2::new(u, v));
        }
        if format.contains(ArrayFormat::BONES) {
            arrays.bones.push(read(chunk, &mut offset));
        }
        if format.contains(ArrayFormat::WEIGHTS) {
            arrays.weights.push(read(chunk, &mut offset));
        }
    }

    if format.contains(ArrayFormat::INDEX) {
        arrays.indices = if index_size(vertex_count) == 2 {
            index_data
                .chunks_exact(2)
                .map(|c| u32::from(bytemuck::pod_read_unaligned::<u16>(c)))
                .collect()
        } else {
            index_data.chunks_exact(4).map(bytemuck::pod_read_unaligned::<u32>).collect()
        };
    }
    arrays
}

/// One drawable surface of a mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Surface {
    /// Attributes present in `vertex_data`
    pub format: ArrayFormat,
    /// Primitive assembly
    pub primitive: PrimitiveType,
    /// Interleaved vertex bytes
    pub vertex_data: Vec<u8>,
    /// Number of vertices
    pub vertex_count: usize,
    /// Index bytes, empty without [`ArrayFormat::INDEX`]
    pub index_data: Vec<u8>,
    /// Number of indices
    pub index_count: usize,
    /// Local bounds
    pub aabb: AABB,
    /// One vertex buffer per morph target, same layout as `vertex_data`
    pub morph_targets: Vec<Vec<u8>>,
    /// Bounds per bone for skinned culling
    pub bone_aabbs: Vec<AABB>,
    /// Material bound to the surface
    pub material: Rid,
}

/// Check raw buffer sizes against the declared format and counts
pub fn validate_buffers(surface: &Surface) -> ServerResult<()> {
    if !surface.format.contains(ArrayFormat::VERTEX) {
        return Err(ServerError::invalid_state("surface format must include vertices"));
    }
    if surface.vertex_count == 0 {
        return Err(ServerError::invalid_state("surface must have at least one vertex"));
    }
    let expected = surface.format.vertex_stride() * surface.vertex_count;
    if surface.vertex_data.len() != expected {
        return Err(ServerError::invalid_state(format!(
            "vertex buffer is {} bytes, format needs {expected}",
            surface.vertex_data.len()
        )));
    }
    let expected = if surface.format.contains(ArrayFormat::INDEX) {
        if surface.index_count == 0 {
            return Err(ServerError::invalid_state("indexed surface has no indices"));
        }
        index_size(surface.vertex_count) * surface.index_count
    } else {
        0
    };
    if surface.index_data.len() != expected {
        return Err(ServerError::invalid_state(format!(
            "index buffer is {} bytes, expected {expected}",
            surface.index_data.len()
        )));
    }
    if surface.morph_targets.iter().any(|target| target.len() != surface.vertex_data.len()) {
        return Err(ServerError::invalid_state("morph target buffers must match the vertex buffer size"));
    }
    Ok(())
}

/// Mesh record
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Surfaces in draw order
    pub surfaces: Vec<Surface>,
    /// Morph targets every surface must carry
    pub morph_target_count: usize,
    /// Morph blending mode
    pub morph_target_mode: MorphTargetMode,
    /// Bounds overriding the merged surface bounds
    pub custom_aabb: Option<AABB>,
}

impl Mesh {
    /// Custom bounds, else the merged surface bounds
    pub fn local_aabb(&self) -> Option<AABB> {
        self.custom_aabb.or_else(|| {
            self.surfaces
                .iter()
                .map(|surface| surface.aabb)
                .reduce(|a, b| a.merge(&b))
        })
    }

    /// Vertices across all surfaces
    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(|surface| surface.vertex_count).sum()
    }

    /// Vertex and index bytes across all surfaces
    pub fn byte_size(&self) -> usize {
        self.surfaces
            .iter()
            .map(|s| s.vertex_data.len() + s.index_data.len() + s.morph_targets.iter().map(Vec::len).sum::<usize>())
            .sum()
    }

    fn surface(&self, index: usize) -> ServerResult<&Surface> {
        check_index("surface", index, self.surfaces.len())?;
        Ok(&self.surfaces[index])
    }
}

impl RenderServer {
    /// Create a mesh with no surfaces
    pub fn mesh_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Mesh);
        self.meshes.insert(rid, Mesh::default());
        rid
    }

    /// Append a surface built from raw buffers, returning its index
    pub fn mesh_add_surface(&mut self, mesh: Rid, surface: Surface) -> ServerResult<usize> {
        self.registry.expect_kind_or_empty(surface.material, ResourceKind::Material)?;
        validate_buffers(&surface)?;
        let record = self.meshes.get_mut(mesh)?;
        if surface.morph_targets.len() != record.morph_target_count {
            return Err(ServerError::invalid_state(format!(
                "surface has {} morph targets, mesh expects {}",
                surface.morph_targets.len(),
                record.morph_target_count
            )));
        }
        record.surfaces.push(surface);
        let index = record.surfaces.len() - 1;
        log::trace!("Mesh {mesh} gained surface {index}");
        self.mark_resources_dirty();
        Ok(index)
    }

    /// Append a surface built from typed arrays, returning its index
    ///
    /// Derives the format bitmask, packs the buffers and computes the bounds.
    /// Morph targets must supply the same attributes as the base arrays.
    pub fn mesh_add_surface_from_arrays(
        &mut self,
        mesh: Rid,
        primitive: PrimitiveType,
        arrays: &MeshArrays,
        morph_targets: &[MeshArrays],
    ) -> ServerResult<usize> {
        self.meshes.get(mesh)?;
        arrays.validate(primitive)?;

        let format = arrays.format();
        let vertex_format = format - ArrayFormat::INDEX;
        let mut packed_targets = Vec::with_capacity(morph_targets.len());
        for target in morph_targets {
            if target.format() - ArrayFormat::INDEX != vertex_format || target.vertices.len() != arrays.vertices.len() {
                return Err(ServerError::invalid_state("morph target arrays must match the base arrays"));
            }
            packed_targets.push(target.pack_vertices());
        }

        let surface = Surface {
            format,
            primitive,
            vertex_data: arrays.pack_vertices(),
            vertex_count: arrays.vertices.len(),
            index_data: arrays.pack_indices(),
            index_count: arrays.indices.len(),
            aabb: arrays.aabb().unwrap_or_default(),
            morph_targets: packed_targets,
            bone_aabbs: arrays.bone_aabbs(),
            material: Rid::empty(),
        };
        self.mesh_add_surface(mesh, surface)
    }

    /// Set how many morph targets surfaces carry; only legal on an empty mesh
    pub fn mesh_set_morph_target_count(&mut self, mesh: Rid, count: usize) -> ServerResult<()> {
        let record = self.meshes.get_mut(mesh)?;
        if !record.surfaces.is_empty() {
            return Err(ServerError::invalid_state("morph target count can only change on a mesh without surfaces"));
        }
        record.morph_target_count = count;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Morph targets per surface
    pub fn mesh_get_morph_target_count(&self, mesh: Rid) -> ServerResult<usize> {
        Ok(self.meshes.get(mesh)?.morph_target_count)
    }

    /// Set the morph blending mode
    pub fn mesh_set_morph_target_mode(&mut self, mesh: Rid, mode: MorphTargetMode) -> ServerResult<()> {
        self.meshes.get_mut(mesh)?.morph_target_mode = mode;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Morph blending mode
    pub fn mesh_get_morph_target_mode(&self, mesh: Rid) -> ServerResult<MorphTargetMode> {
        Ok(self.meshes.get(mesh)?.morph_target_mode)
    }

    /// Bind a material to a surface; the empty handle unbinds
    pub fn mesh_surface_set_material(&mut self, mesh: Rid, surface: usize, material: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(material, ResourceKind::Material)?;
        let record = self.meshes.get_mut(mesh)?;
        check_index("surface", surface, record.surfaces.len())?;
        record.surfaces[surface].material = material;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Material bound to a surface, `None` if unset or freed
    pub fn mesh_surface_get_material(&self, mesh: Rid, surface: usize) -> ServerResult<Option<Rid>> {
        let material = self.meshes.get(mesh)?.surface(surface)?.material;
        Ok(self.materials.contains(material).then_some(material))
    }

    /// Vertex count of a surface
    pub fn mesh_surface_get_array_len(&self, mesh: Rid, surface: usize) -> ServerResult<usize> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.vertex_count)
    }

    /// Index count of a surface
    pub fn mesh_surface_get_array_index_len(&self, mesh: Rid, surface: usize) -> ServerResult<usize> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.index_count)
    }

    /// Interleaved vertex bytes of a surface
    pub fn mesh_surface_get_array(&self, mesh: Rid, surface: usize) -> ServerResult<Vec<u8>> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.vertex_data.clone())
    }

    /// Index bytes of a surface
    pub fn mesh_surface_get_index_array(&self, mesh: Rid, surface: usize) -> ServerResult<Vec<u8>> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.index_data.clone())
    }

    /// Typed arrays decoded from a surface's buffers
    pub fn mesh_surface_get_arrays(&self, mesh: Rid, surface: usize) -> ServerResult<MeshArrays> {
        let s = self.meshes.get(mesh)?.surface(surface)?;
        Ok(decode_arrays(s.format, &s.vertex_data, s.vertex_count, &s.index_data))
    }

    /// Format bitmask of a surface
    pub fn mesh_surface_get_format(&self, mesh: Rid, surface: usize) -> ServerResult<ArrayFormat> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.format)
    }

    /// Primitive type of a surface
    pub fn mesh_surface_get_primitive_type(&self, mesh: Rid, surface: usize) -> ServerResult<PrimitiveType> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.primitive)
    }

    /// Local bounds of a surface
    pub fn mesh_surface_get_aabb(&self, mesh: Rid, surface: usize) -> ServerResult<AABB> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.aabb)
    }

    /// Morph target buffers of a surface
    pub fn mesh_surface_get_morph_targets(&self, mesh: Rid, surface: usize) -> ServerResult<Vec<Vec<u8>>> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.morph_targets.clone())
    }

    /// Per-bone bounds of a surface
    pub fn mesh_surface_get_skeleton_aabb(&self, mesh: Rid, surface: usize) -> ServerResult<Vec<AABB>> {
        Ok(self.meshes.get(mesh)?.surface(surface)?.bone_aabbs.clone())
    }

    /// Remove a surface; later surfaces shift down by one
    pub fn mesh_remove_surface(&mut self, mesh: Rid, surface: usize) -> ServerResult<()> {
        let record = self.meshes.get_mut(mesh)?;
        check_index("surface", surface, record.surfaces.len())?;
        record.surfaces.remove(surface);
        self.mark_resources_dirty();
        Ok(())
    }

    /// Number of surfaces
    pub fn mesh_get_surface_count(&self, mesh: Rid) -> ServerResult<usize> {
        Ok(self.meshes.get(mesh)?.surfaces.len())
    }

    /// Override (or with `None`, stop overriding) the merged surface bounds
    pub fn mesh_set_custom_aabb(&mut self, mesh: Rid, aabb: Option<AABB>) -> ServerResult<()> {
        self.meshes.get_mut(mesh)?.custom_aabb = aabb;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Custom bounds, if any
    pub fn mesh_get_custom_aabb(&self, mesh: Rid) -> ServerResult<Option<AABB>> {
        Ok(self.meshes.get(mesh)?.custom_aabb)
    }

    /// Remove every surface
    pub fn mesh_clear(&mut self, mesh: Rid) -> ServerResult<()> {
        self.meshes.get_mut(mesh)?.surfaces.clear();
        self.mark_resources_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use approx::assert_relative_eq;

    fn triangle() -> MeshArrays {
        MeshArrays {
            vertices: vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)],
            normals: vec![Vec3::z(); 3],
            uvs: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
            indices: vec![0, 1, 2],
            ..MeshArrays::default()
        }
    }

    fn server() -> RenderServer {
        RenderServer::headless(ServerConfig::default())
    }

    #[test]
    fn test_stride_and_format() {
        let arrays = triangle();
        let format = arrays.format();

        assert_eq!(format, ArrayFormat::VERTEX | ArrayFormat::NORMAL | ArrayFormat::TEX_UV | ArrayFormat::INDEX);
        assert_eq!(format.vertex_stride(), 32);
        assert_eq!(arrays.pack_vertices().len(), 96);
        assert_eq!(arrays.pack_indices().len(), 6);
    }

    #[test]
    fn test_add_surface_from_arrays_derives_aabb() {
        let mut vs = server();
        let mesh = vs.mesh_create();
        let index = vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &triangle(), &[]).expect("surface");

        assert_eq!(index, 0);
        assert_eq!(vs.mesh_surface_get_array_len(mesh, 0), Ok(3));
        assert_eq!(vs.mesh_surface_get_array_index_len(mesh, 0), Ok(3));
        let aabb = vs.mesh_surface_get_aabb(mesh, 0).expect("aabb");
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(vs.mesh_surface_get_arrays(mesh, 0), Ok(triangle()));
    }

    #[test]
    fn test_invalid_arrays_rejected() {
        let mut vs = server();
        let mesh = vs.mesh_create();

        let mut bad_index = triangle();
        bad_index.indices = vec![0, 1, 5];
        assert!(matches!(
            vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &bad_index, &[]),
            Err(ServerError::OutOfRange { index: 5, len: 3, .. })
        ));

        let mut short_normals = triangle();
        short_normals.normals.pop();
        assert!(vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &short_normals, &[]).is_err());
        assert_eq!(vs.mesh_get_surface_count(mesh), Ok(0));
    }

    #[test]
    fn test_remove_surface_shifts_down() {
        let mut vs = server();
        let mesh = vs.mesh_create();
        for scale in [1.0_f32, 2.0, 3.0] {
            let mut arrays = triangle();
            arrays.vertices.iter_mut().for_each(|v| *v *= scale);
            vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &arrays, &[]).expect("surface");
        }

        vs.mesh_remove_surface(mesh, 1).expect("remove");
        assert_eq!(vs.mesh_get_surface_count(mesh), Ok(2));
        assert_relative_eq!(vs.mesh_surface_get_aabb(mesh, 0).expect("aabb").max.x, 1.0);
        assert_relative_eq!(vs.mesh_surface_get_aabb(mesh, 1).expect("aabb").max.x, 3.0);
        assert!(matches!(vs.mesh_surface_get_aabb(mesh, 2), Err(ServerError::OutOfRange { .. })));
    }

    #[test]
    fn test_morph_targets_must_match_count() {
        let mut vs = server();
        let mesh = vs.mesh_create();
        vs.mesh_set_morph_target_count(mesh, 1).expect("count");

        let mut target = triangle();
        target.indices.clear();
        assert!(vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &triangle(), &[]).is_err());
        vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &triangle(), &[target]).expect("surface");

        assert_eq!(vs.mesh_surface_get_morph_targets(mesh, 0).expect("targets").len(), 1);
        assert!(vs.mesh_set_morph_target_count(mesh, 2).is_err());
    }

    #[test]
    fn test_raw_surface_buffer_validation() {
        let mut vs = server();
        let mesh = vs.mesh_create();
        let surface = Surface {
            format: ArrayFormat::VERTEX,
            vertex_data: vec![0; 20],
            vertex_count: 2,
            ..Surface::default()
        };
        assert!(vs.mesh_add_surface(mesh, surface).is_err());
    }

    #[test]
    fn test_wide_indices_roundtrip() {
        let count = 70_000;
        let arrays = MeshArrays {
            vertices: (0..count).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            indices: vec![0, 69_999, 1],
            ..MeshArrays::default()
        };
        let decoded = decode_arrays(arrays.format(), &arrays.pack_vertices(), count, &arrays.pack_indices());
        assert_eq!(decoded.indices, vec![0, 69_999, 1]);
    }

    #[test]
    fn test_bone_aabbs() {
        let mut arrays = triangle();
        arrays.bones = vec![[0, 1, 0, 0], [0, 0, 0, 0], [1, 0, 0, 0]];
        arrays.weights = vec![[0.5, 0.5, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]];

        let bones = arrays.bone_aabbs();
        assert_eq!(bones.len(), 2);
        assert_relative_eq!(bones[0].max, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(bones[1].max, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_custom_aabb_overrides_surfaces() {
        let mut vs = server();
        let mesh = vs.mesh_create();
        vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &triangle(), &[]).expect("surface");

        let custom = AABB::new(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0));
        vs.mesh_set_custom_aabb(mesh, Some(custom)).expect("custom");
        assert_eq!(vs.meshes.get(mesh).expect("mesh").local_aabb(), Some(custom));

        vs.mesh_clear(mesh).expect("clear");
        assert_eq!(vs.mesh_get_surface_count(mesh), Ok(0));
    }
}
