//! # Default Resources
//!
//! The placeholder catalogue created by [`RenderServer::init`]: a white
//! texture, a checkerboard test texture, a test cube and sixteen 2D
//! materials indexed by a 4-bit capability mask. These stay valid until
//! [`RenderServer::finish`] and cannot be freed before it.
//!
//! Also holds the procedural mesh helpers.

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Vec2, Vec3};
use crate::resources::handle::Rid;
use crate::resources::material::MaterialParam;
use crate::resources::mesh::{MeshArrays, PrimitiveType};
use crate::resources::shader::ShaderMode;
use crate::resources::texture::TextureFlags;
use crate::scene::culling::Plane;
use crate::server::RenderServer;

const MATERIAL_2D_SHADER: &str = "shader_type spatial;\n\
uniform bool shaded;\n\
uniform bool transparent;\n\
uniform bool cut_alpha;\n\
uniform bool opaque_prepass;\n\
uniform sampler2D texture_albedo;\n";

const CHECKER_CELL: u32 = 16;

/// Distance under which a point counts as lying on a plane
const PLANE_EPSILON: f32 = 1e-4;

/// Handles of the placeholder catalogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultResources {
    /// Opaque white texture
    pub white_texture: Rid,
    /// Checkerboard texture
    pub test_texture: Rid,
    /// Unit cube mesh
    pub test_cube: Rid,
    /// Shader shared by the 2D materials
    pub material_2d_shader: Rid,
    /// 2D materials indexed by [`material_2d_index`]
    pub material_2d: [Rid; 16],
}

impl DefaultResources {
    /// Whether `rid` belongs to the catalogue
    pub fn contains(&self, rid: Rid) -> bool {
        !rid.is_empty()
            && (rid == self.white_texture
                || rid == self.test_texture
                || rid == self.test_cube
                || rid == self.material_2d_shader
                || self.material_2d.contains(&rid))
    }
}

/// Index of a 2D material variant
pub const fn material_2d_index(shaded: bool, transparent: bool, cut_alpha: bool, opaque_prepass: bool) -> usize {
    (shaded as usize) | (transparent as usize) << 1 | (cut_alpha as usize) << 2 | (opaque_prepass as usize) << 3
}

/// Flat-shaded cube arrays with the given half extent
fn cube_arrays(half_extent: f32) -> MeshArrays {
    // normal, u axis, v axis
    let faces = [
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), -Vec3::x(), Vec3::y()),
        (Vec3::x(), -Vec3::z(), Vec3::y()),
        (-Vec3::x(), Vec3::z(), Vec3::y()),
        (Vec3::y(), Vec3::x(), -Vec3::z()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut arrays = MeshArrays::default();
    for (face, (normal, u, v)) in faces.into_iter().enumerate() {
        for (cu, cv) in corners {
            arrays.vertices.push((normal + u * cu + v * cv) * half_extent);
            arrays.normals.push(normal);
            arrays.uvs.push(Vec2::new((cu + 1.0) * 0.5, 1.0 - (cv + 1.0) * 0.5));
        }
        let base = (face * 4) as u32;
        arrays.indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    arrays
}

/// UV sphere arrays; `lats` rings between the poles, `lons` segments around
fn sphere_arrays(lats: u32, lons: u32, radius: f32) -> MeshArrays {
    let mut arrays = MeshArrays::default();
    for lat in 0..=lats {
        let theta = std::f32::consts::PI * lat as f32 / lats as f32;
        for lon in 0..=lons {
            let phi = std::f32::consts::TAU * lon as f32 / lons as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            arrays.vertices.push(normal * radius);
            arrays.normals.push(normal);
            arrays.uvs.push(Vec2::new(lon as f32 / lons as f32, lat as f32 / lats as f32));
        }
    }

    let stride = lons + 1;
    for lat in 0..lats {
        for lon in 0..lons {
            let a = lat * stride + lon;
            let b = a + stride;
            arrays.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    arrays
}

fn checker_image(size: u32) -> DynamicImage {
    let cell = CHECKER_CELL.min(size).max(1);
    DynamicImage::ImageRgba8(RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([64, 64, 64, 255])
        }
    }))
}

impl RenderServer {
    pub(crate) fn create_default_resources(&mut self) -> ServerResult<DefaultResources> {
        let settings = self.config.defaults.clone();

        let white = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            settings.white_texture_size,
            settings.white_texture_size,
            Rgba([255, 255, 255, 255]),
        ));
        let white_texture = self.texture_create_from_image(&white, TextureFlags::DEFAULT)?;
        self.texture_set_path(white_texture, "default://white")?;

        let test_texture =
            self.texture_create_from_image(&checker_image(settings.test_texture_size), TextureFlags::DEFAULT)?;
        self.texture_set_path(test_texture, "default://test")?;

        let test_cube = self.mesh_create();
        self.mesh_add_surface_from_arrays(
            test_cube,
            PrimitiveType::Triangles,
            &cube_arrays(settings.test_cube_half_extent),
            &[],
        )?;

        let material_2d_shader = self.shader_create(ShaderMode::Spatial);
        self.shader_set_code(material_2d_shader, MATERIAL_2D_SHADER)?;

        let mut material_2d = [Rid::empty(); 16];
        for (index, slot) in material_2d.iter_mut().enumerate() {
            let material = self.material_create();
            self.material_set_shader(material, material_2d_shader)?;
            for (bit, name) in ["shaded", "transparent", "cut_alpha", "opaque_prepass"].iter().enumerate() {
                self.material_set_param(material, name, Some(MaterialParam::Bool(index & (1 << bit) != 0)))?;
            }
            *slot = material;
        }

        log::debug!("Created default resource catalogue");
        Ok(DefaultResources { white_texture, test_texture, test_cube, material_2d_shader, material_2d })
    }

    fn default_resource(&self, pick: impl FnOnce(&DefaultResources) -> Rid) -> Rid {
        match &self.defaults {
            Some(defaults) => pick(defaults),
            None => {
                log::warn!("Default resources requested before init");
                Rid::empty()
            }
        }
    }

    /// Unit test cube; empty before `init`
    pub fn get_test_cube(&self) -> Rid {
        self.default_resource(|defaults| defaults.test_cube)
    }

    /// Checkerboard texture; empty before `init`
    pub fn get_test_texture(&self) -> Rid {
        self.default_resource(|defaults| defaults.test_texture)
    }

    /// White texture; empty before `init`
    pub fn get_white_texture(&self) -> Rid {
        self.default_resource(|defaults| defaults.white_texture)
    }

    /// Default 2D material for a capability combination; empty before `init`
    pub fn material_2d_get(&self, shaded: bool, transparent: bool, cut_alpha: bool, opaque_prepass: bool) -> Rid {
        let index = material_2d_index(shaded, transparent, cut_alpha, opaque_prepass);
        self.default_resource(|defaults| defaults.material_2d[index])
    }

    /// Create a UV sphere mesh
    pub fn make_sphere_mesh(&mut self, lats: u32, lons: u32, radius: f32) -> ServerResult<Rid> {
        if !self.is_initialized() {
            return Err(ServerError::invalid_state("make_sphere_mesh requires init"));
        }
        if lats < 2 || lons < 3 {
            return Err(ServerError::invalid_state(format!(
                "sphere needs at least 2 rings and 3 segments, got {lats}x{lons}"
            )));
        }
        let mesh = self.mesh_create();
        self.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &sphere_arrays(lats, lons, radius), &[])?;
        Ok(mesh)
    }

    /// Append a triangle surface built from convex faces
    ///
    /// Each face is a planar polygon of at least three points, fanned from its
    /// first point and flat shaded.
    pub fn mesh_add_surface_from_mesh_data(&mut self, mesh: Rid, faces: &[Vec<Vec3>]) -> ServerResult<usize> {
        self.meshes.get(mesh)?;
        let mut arrays = MeshArrays::default();
        for face in faces {
            if face.len() < 3 {
                return Err(ServerError::invalid_state(format!("face has {} points, needs 3", face.len())));
            }
            let normal = (face[1] - face[0]).cross(&(face[2] - face[0])).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y);
            for i in 1..face.len() - 1 {
                for point in [face[0], face[i], face[i + 1]] {
                    arrays.vertices.push(point);
                    arrays.normals.push(normal);
                }
            }
        }
        self.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &arrays, &[])
    }

    /// Append the convex solid bounded by `planes` as a triangle surface
    ///
    /// Plane normals point inward, as in [`crate::scene::ConvexVolume`].
    /// Fails when the planes do not enclose a solid.
    pub fn mesh_add_surface_from_planes(&mut self, mesh: Rid, planes: &[Plane]) -> ServerResult<usize> {
        self.meshes.get(mesh)?;
        if planes.len() < 4 {
            return Err(ServerError::invalid_state(format!(
                "a closed convex solid needs at least 4 planes, got {}",
                planes.len()
            )));
        }
        let faces = convex_faces(planes);
        if faces.len() < 4 {
            return Err(ServerError::invalid_state(format!(
                "{} planes enclose no solid ({} faces)",
                planes.len(),
                faces.len()
            )));
        }
        log::trace!("Mesh {mesh}: convex surface with {} faces from {} planes", faces.len(), planes.len());
        self.mesh_add_surface_from_mesh_data(mesh, &faces)
    }
}

/// Point shared by three planes, `None` when two of them are parallel
fn intersect_planes(a: &Plane, b: &Plane, c: &Plane) -> Option<Vec3> {
    let bc = b.normal.cross(&c.normal);
    let denominator = a.normal.dot(&bc);
    if denominator.abs() < PLANE_EPSILON {
        return None;
    }
    let ca = c.normal.cross(&a.normal);
    let ab = a.normal.cross(&b.normal);
    Some(-(bc * a.distance + ca * b.distance + ab * c.distance) / denominator)
}

/// Faces of the convex region inside every plane
///
/// Each face lists its corners counter-clockwise seen from outside, so the
/// fan normal points away from the region. Planes that only touch the region
/// in an edge or a corner produce no face.
fn convex_faces(planes: &[Plane]) -> Vec<Vec<Vec3>> {
    let mut corners: Vec<Vec3> = Vec::new();
    for i in 0..planes.len() {
        for j in i + 1..planes.len() {
            for k in j + 1..planes.len() {
                let Some(point) = intersect_planes(&planes[i], &planes[j], &planes[k]) else {
                    continue;
                };
                let inside = planes.iter().all(|plane| plane.distance_to_point(point) >= -PLANE_EPSILON);
                let known = corners.iter().any(|corner| (corner - point).norm() < PLANE_EPSILON);
                if inside && !known {
                    corners.push(point);
                }
            }
        }
    }

    planes
        .iter()
        .filter_map(|plane| {
            let mut face: Vec<Vec3> = corners
                .iter()
                .copied()
                .filter(|corner| plane.distance_to_point(*corner).abs() < PLANE_EPSILON)
                .collect();
            if face.len() < 3 {
                return None;
            }
            let center = face.iter().sum::<Vec3>() / face.len() as f32;
            let outward = -plane.normal;
            let u = (face[0] - center).try_normalize(PLANE_EPSILON)?;
            let v = outward.cross(&u);
            let angle = |corner: &Vec3| {
                let offset = corner - center;
                offset.dot(&v).atan2(offset.dot(&u))
            };
            face.sort_by(|a, b| angle(a).total_cmp(&angle(b)));
            Some(face)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_material_2d_index_bits() {
        assert_eq!(material_2d_index(false, false, false, false), 0);
        assert_eq!(material_2d_index(true, false, false, false), 1);
        assert_eq!(material_2d_index(false, true, false, true), 10);
        assert_eq!(material_2d_index(true, true, true, true), 15);
    }

    #[test]
    fn test_catalogue_after_init() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        assert!(vs.get_test_cube().is_empty());

        vs.init().expect("init");
        let cube = vs.get_test_cube();
        assert_eq!(vs.mesh_get_surface_count(cube), Ok(1));
        assert_eq!(vs.texture_get_width(vs.get_white_texture()), Ok(16));
        assert_eq!(vs.texture_get_width(vs.get_test_texture()), Ok(256));

        let a = vs.material_2d_get(true, false, false, false);
        let b = vs.material_2d_get(false, true, false, false);
        assert_ne!(a, b);
        assert_eq!(
            vs.material_get_param(b, "transparent").expect("param"),
            Some(MaterialParam::Bool(true))
        );

        assert!(matches!(vs.free(cube), Err(ServerError::InvalidState(_))));
    }

    #[test]
    fn test_cube_bounds() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        vs.init().expect("init");
        let aabb = vs.mesh_surface_get_aabb(vs.get_test_cube(), 0).expect("aabb");
        assert_relative_eq!(aabb.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_relative_eq!(aabb.max, Vec3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_sphere_requires_init() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        assert!(vs.make_sphere_mesh(8, 8, 1.0).is_err());

        vs.init().expect("init");
        let sphere = vs.make_sphere_mesh(4, 6, 2.0).expect("sphere");
        let aabb = vs.mesh_surface_get_aabb(sphere, 0).expect("aabb");
        assert_relative_eq!(aabb.max.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(aabb.min.y, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_surface_from_mesh_data_fans_faces() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let mesh = vs.mesh_create();
        let quad = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        vs.mesh_add_surface_from_mesh_data(mesh, &[quad]).expect("surface");
        assert_eq!(vs.mesh_surface_get_array_len(mesh, 0), Ok(6));

        assert!(vs.mesh_add_surface_from_mesh_data(mesh, &[vec![Vec3::zeros(); 2]]).is_err());
    }

    fn cube_planes(half: f32) -> Vec<Plane> {
        [Vec3::x(), Vec3::y(), Vec3::z()]
            .into_iter()
            .flat_map(|axis| {
                [
                    Plane::from_point_normal(axis * half, -axis),
                    Plane::from_point_normal(-axis * half, axis),
                ]
            })
            .collect()
    }

    #[test]
    fn test_surface_from_planes_builds_cube() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let mesh = vs.mesh_create();
        vs.mesh_add_surface_from_planes(mesh, &cube_planes(1.0)).expect("cube");

        assert_eq!(vs.mesh_surface_get_array_len(mesh, 0), Ok(36));
        let aabb = vs.mesh_surface_get_aabb(mesh, 0).expect("aabb");
        assert_relative_eq!(aabb.min, Vec3::new(-1.0, -1.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-5);

        let arrays = vs.mesh_surface_get_arrays(mesh, 0).expect("arrays");
        for (vertex, normal) in arrays.vertices.chunks(3).zip(arrays.normals.chunks(3)) {
            let center = (vertex[0] + vertex[1] + vertex[2]) / 3.0;
            assert!(normal[0].dot(&center) > 0.0, "face normal {:?} points inward", normal[0]);
        }
    }

    #[test]
    fn test_surface_from_planes_clips_corner() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let mesh = vs.mesh_create();
        let mut planes = cube_planes(1.0);
        planes.push(Plane::from_point_normal(Vec3::new(0.5, 0.5, 0.5), Vec3::new(-1.0, -1.0, -1.0)));
        vs.mesh_add_surface_from_planes(mesh, &planes).expect("clipped cube");

        let aabb = vs.mesh_surface_get_aabb(mesh, 0).expect("aabb");
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-5);
        let arrays = vs.mesh_surface_get_arrays(mesh, 0).expect("arrays");
        assert!(arrays.vertices.iter().all(|v| v.x + v.y + v.z <= 1.5 + 1e-4));
    }

    #[test]
    fn test_surface_from_planes_rejects_open_sets() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let mesh = vs.mesh_create();
        let slab = [
            Plane::from_point_normal(Vec3::x(), -Vec3::x()),
            Plane::from_point_normal(-Vec3::x(), Vec3::x()),
            Plane::from_point_normal(Vec3::y(), -Vec3::y()),
            Plane::from_point_normal(-Vec3::y(), Vec3::y()),
        ];
        assert!(matches!(
            vs.mesh_add_surface_from_planes(mesh, &slab),
            Err(ServerError::InvalidState(_))
        ));
        assert!(vs.mesh_add_surface_from_planes(mesh, &slab[..3]).is_err());
        assert_eq!(vs.mesh_get_surface_count(mesh), Ok(0));
    }
}
