//! Material store

use std::collections::BTreeMap;

use crate::error::{ServerError, ServerResult};
use crate::foundation::math::{Color, Mat4, Vec2, Vec3};
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Typed value of a material parameter
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialParam {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f32),
    /// 2D vector
    Vec2(Vec2),
    /// 3D vector
    Vec3(Vec3),
    /// Color
    Color(Color),
    /// 4x4 matrix
    Transform(Mat4),
    /// Texture handle
    Texture(Rid),
}

/// Material record
#[derive(Debug, Clone)]
pub struct Material {
    /// Shader the parameters feed
    pub shader: Rid,
    /// Parameter values by uniform name
    pub params: BTreeMap<String, MaterialParam>,
    /// Line width for line primitives
    pub line_width: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self { shader: Rid::empty(), params: BTreeMap::new(), line_width: 1.0 }
    }
}

impl RenderServer {
    /// Create a material with no shader
    pub fn material_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Material);
        self.materials.insert(rid, Material::default());
        rid
    }

    /// Bind a shader; the empty handle unbinds
    pub fn material_set_shader(&mut self, material: Rid, shader: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(shader, ResourceKind::Shader)?;
        self.materials.get_mut(material)?.shader = shader;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Bound shader, `None` if unset or freed
    pub fn material_get_shader(&self, material: Rid) -> ServerResult<Option<Rid>> {
        let shader = self.materials.get(material)?.shader;
        Ok(self.shaders.contains(shader).then_some(shader))
    }

    /// Set a named parameter; `None` removes it
    pub fn material_set_param(&mut self, material: Rid, name: &str, value: Option<MaterialParam>) -> ServerResult<()> {
        if let Some(MaterialParam::Texture(texture)) = value {
            self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        }
        let record = self.materials.get_mut(material)?;
        match value {
            Some(value) => record.params.insert(name.to_string(), value),
            None => record.params.remove(name),
        };
        self.mark_resources_dirty();
        Ok(())
    }

    /// Named parameter value
    pub fn material_get_param(&self, material: Rid, name: &str) -> ServerResult<Option<MaterialParam>> {
        Ok(self.materials.get(material)?.params.get(name).cloned())
    }

    /// Line width used when drawing line primitives
    pub fn material_set_line_width(&mut self, material: Rid, width: f32) -> ServerResult<()> {
        if width <= 0.0 {
            return Err(ServerError::invalid_state(format!("line width must be positive, got {width}")));
        }
        self.materials.get_mut(material)?.line_width = width;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Material record
    pub fn material(&self, material: Rid) -> ServerResult<&Material> {
        self.materials.get(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use crate::resources::shader::ShaderMode;
    use approx::assert_relative_eq;

    #[test]
    fn test_material_params() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let material = vs.material_create();

        vs.material_set_param(material, "roughness", Some(MaterialParam::Float(0.25))).expect("set");
        assert_eq!(vs.material_get_param(material, "roughness"), Ok(Some(MaterialParam::Float(0.25))));

        vs.material_set_param(material, "roughness", None).expect("remove");
        assert_eq!(vs.material_get_param(material, "roughness"), Ok(None));
    }

    #[test]
    fn test_material_shader_must_be_shader() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let material = vs.material_create();
        let texture = vs.texture_create();
        let shader = vs.shader_create(ShaderMode::Spatial);

        assert!(matches!(vs.material_set_shader(material, texture), Err(ServerError::InvalidHandle { .. })));
        vs.material_set_shader(material, shader).expect("shader");
        assert_eq!(vs.material_get_shader(material), Ok(Some(shader)));
    }

    #[test]
    fn test_line_width_validation() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let material = vs.material_create();

        assert!(vs.material_set_line_width(material, 0.0).is_err());
        vs.material_set_line_width(material, 2.0).expect("width");
        assert_relative_eq!(vs.material(material).expect("record").line_width, 2.0);
    }
}
