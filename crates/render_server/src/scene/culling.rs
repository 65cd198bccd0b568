//! Bounding volumes and cull shapes
//!
//! Instance bounds are axis-aligned boxes in world space. The three query
//! shapes (box, segment, convex region) only need a conservative
//! overlap test against those boxes.

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a corner and a size
    pub fn from_position_size(position: Vec3, size: Vec3) -> Self {
        Self { min: position, max: position + size }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing every point, `None` for no points
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| aabb.expanded_to(p)))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB (touching counts)
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Test ray intersection with this AABB using slab method
    /// Returns the distance to the entry point if the ray intersects, None otherwise
    pub fn intersect_ray(&self, ray_origin: Vec3, ray_dir: Vec3) -> Option<f32> {
        self.slab_interval(ray_origin, ray_dir)
            .filter(|&(_, tmax)| tmax >= 0.0)
            .map(|(tmin, _)| tmin.max(0.0))
    }

    /// Whether the segment `from..=to` touches this box
    pub fn intersects_segment(&self, from: Vec3, to: Vec3) -> bool {
        self.slab_interval(from, to - from)
            .is_some_and(|(tmin, tmax)| tmax >= 0.0 && tmin <= 1.0)
    }

    // Parametric entry/exit of the line `origin + t * dir`. Axes the line runs
    // parallel to are rejected outright when the origin lies outside their slab.
    fn slab_interval(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in 0..3 {
            if dir[axis] == 0.0 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[axis];
            let t1 = (self.min[axis] - origin[axis]) * inv;
            let t2 = (self.max[axis] - origin[axis]) * inv;
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }

        (tmax >= tmin).then_some((tmin, tmax))
    }

    /// Grow the box to contain a point
    pub fn expanded_to(self, point: Vec3) -> Self {
        Self {
            min: self.min.inf(&point),
            max: self.max.sup(&point),
        }
    }

    /// Smallest box containing both boxes
    pub fn merge(&self, other: &AABB) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Grow every face outward by `margin`
    pub fn grow(&self, margin: f32) -> Self {
        let m = Vec3::new(margin, margin, margin);
        Self { min: self.min - m, max: self.max + m }
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box around this box after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self
            .corners()
            .map(|corner| matrix.transform_point(&Point3::from(corner)).coords);
        let first = corners[0];
        corners[1..]
            .iter()
            .fold(Self::new(first, first), |aabb, &p| aabb.expanded_to(p))
    }
}

/// Plane defined by normal and distance from origin
///
/// Points with a non-negative signed distance are on the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane through `point` facing `normal`
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, distance: -normal.dot(&point) }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Convex region bounded by an ordered set of half-spaces
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConvexVolume {
    /// Bounding planes, normals pointing inward
    pub planes: Vec<Plane>,
}

impl ConvexVolume {
    /// Create a convex volume from planes
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Check if an AABB is inside or intersects the volume
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the normal; if it is outside, the box is
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }
            plane.distance_to_point(p) >= 0.0
        })
    }
}

/// One of the three spatial query shapes
#[derive(Debug, Clone, PartialEq)]
pub enum CullShape {
    /// Axis-aligned box
    Aabb(AABB),
    /// Line segment between two points
    Segment {
        /// Start point
        from: Vec3,
        /// End point
        to: Vec3,
    },
    /// Convex region
    Convex(ConvexVolume),
}

impl CullShape {
    /// Whether a world-space box overlaps the shape
    pub fn overlaps(&self, bounds: &AABB) -> bool {
        match self {
            Self::Aabb(aabb) => aabb.intersects(bounds),
            Self::Segment { from, to } => bounds.intersects_segment(*from, *to),
            Self::Convex(volume) => volume.intersects_aabb(bounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> AABB {
        AABB::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_aabb_contains_point() {
        let aabb = AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_intersects() {
        let aabb1 = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let aabb2 = AABB::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let aabb3 = AABB::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));

        assert!(aabb1.intersects(&aabb2));
        assert!(!aabb1.intersects(&aabb3));
    }

    #[test]
    fn test_segment_hits_and_misses() {
        let aabb = unit_box();

        assert!(aabb.intersects_segment(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(2.0, 0.5, 0.5)));
        // Stops short of the box
        assert!(!aabb.intersects_segment(Vec3::new(-3.0, 0.5, 0.5), Vec3::new(-1.0, 0.5, 0.5)));
        // Parallel to x, outside the y slab
        assert!(!aabb.intersects_segment(Vec3::new(-1.0, 3.0, 0.5), Vec3::new(2.0, 3.0, 0.5)));
        // Fully inside
        assert!(aabb.intersects_segment(Vec3::new(0.2, 0.2, 0.2), Vec3::new(0.8, 0.8, 0.8)));
    }

    #[test]
    fn test_ray_entry_distance() {
        let aabb = unit_box();
        let t = aabb.intersect_ray(Vec3::new(-2.0, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(t.expect("hit"), 2.0);
        assert!(aabb.intersect_ray(Vec3::new(-2.0, 0.5, 0.5), Vec3::new(-1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_transformed_box() {
        let matrix = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)) * Mat4::new_scaling(2.0);
        let moved = unit_box().transformed(&matrix);

        assert_relative_eq!(moved.min, Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(moved.max, Vec3::new(7.0, 2.0, 2.0));
    }

    #[test]
    fn test_convex_volume_half_spaces() {
        // x >= 0.5 and x <= 3
        let volume = ConvexVolume::new(vec![
            Plane::from_point_normal(Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            Plane::from_point_normal(Vec3::new(3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
        ]);

        assert!(volume.intersects_aabb(&unit_box()));
        assert!(!volume.intersects_aabb(&AABB::new(Vec3::new(4.0, 0.0, 0.0), Vec3::new(5.0, 1.0, 1.0))));
        assert!(ConvexVolume::default().intersects_aabb(&unit_box()));
    }

    #[test]
    fn test_from_points_and_merge() {
        assert!(AABB::from_points(std::iter::empty()).is_none());

        let aabb = AABB::from_points([Vec3::new(1.0, -1.0, 0.0), Vec3::new(-1.0, 2.0, 3.0)]).expect("points");
        assert_relative_eq!(aabb.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));

        let merged = aabb.merge(&unit_box()).grow(1.0);
        assert_relative_eq!(merged.min, Vec3::new(-2.0, -2.0, -1.0));
        assert_relative_eq!(merged.max, Vec3::new(2.0, 3.0, 4.0));
    }
}
