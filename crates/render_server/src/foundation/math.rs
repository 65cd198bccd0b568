//! Math utilities and types
//!
//! Provides the value types the server stores in resource records: vectors,
//! 3D transforms, 2D affine transforms, colors and rectangles.

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// 2D affine transform stored as a homogeneous 3x3 matrix.
///
/// Canvas items, canvas lights and 2D skeleton bones use this representation.
pub type Transform2D = Mat3;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and uniform scale
    pub fn from_position_scale(position: Vec3, scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        let matrix = self.to_matrix();
        matrix.transform_point(&Point3::from(point)).coords
    }

    /// Combine this transform with another (`self` applied after `other`)
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }
}

/// Linear RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub r: f32,
    /// Green channel
    pub g: f32,
    /// Blue channel
    pub b: f32,
    /// Alpha channel
    pub a: f32,
}

impl Color {
    /// Opaque white
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    /// Opaque black
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    /// Fully transparent black
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    /// Create a color from all four channels
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Component-wise multiplication, used when composing modulates
    pub fn modulate(self, other: Self) -> Self {
        Self::rgba(self.r * other.r, self.g * other.g, self.b * other.b, self.a * other.a)
    }

    /// Quantize to 8-bit RGBA
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Axis-aligned 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect2 {
    /// Top-left corner
    pub position: Vec2,
    /// Width and height
    pub size: Vec2,
}

impl Rect2 {
    /// Create a rectangle from position and size components
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    /// Whether the rectangle has zero area
    pub fn has_no_area(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }
}

/// Math utility functions
pub mod utils {
    /// Smallest power of two that is greater than or equal to `value`
    pub fn next_power_of_two(value: u32) -> u32 {
        value.max(1).next_power_of_two()
    }

    /// Whether `value` is zero or a power of two
    pub fn is_zero_or_power_of_two(value: u32) -> bool {
        value == 0 || value.is_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_point_translation_and_scale() {
        let transform = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), 2.0);
        let p = transform.transform_point(Vec3::new(1.0, 1.0, 1.0));

        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 4.0);
        assert_relative_eq!(p.z, 5.0);
    }

    #[test]
    fn test_color_modulate_and_quantize() {
        let c = Color::rgba(1.0, 0.5, 0.25, 1.0).modulate(Color::rgba(0.5, 1.0, 1.0, 0.5));
        assert_eq!(c.to_rgba8(), [128, 128, 64, 128]);
    }

    #[test]
    fn test_power_of_two_helpers() {
        assert_eq!(utils::next_power_of_two(33), 64);
        assert_eq!(utils::next_power_of_two(0), 1);
        assert!(utils::is_zero_or_power_of_two(0));
        assert!(utils::is_zero_or_power_of_two(256));
        assert!(!utils::is_zero_or_power_of_two(100));
    }
}
