//! Shader store
//!
//! Shader code is opaque to the server apart from its `uniform` declarations,
//! which are scanned to report the parameter list.

use std::collections::BTreeMap;

use crate::error::ServerResult;
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

/// Pipeline stage a shader is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderMode {
    /// 3D surface shader
    #[default]
    Spatial,
    /// 2D canvas item shader
    CanvasItem,
    /// Particle or light processing shader
    Light,
}

/// A `uniform` declared by shader code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderParam {
    /// Uniform name
    pub name: String,
    /// Declared type, as written
    pub type_name: String,
}

/// Shader record
#[derive(Debug, Clone, Default)]
pub struct Shader {
    /// Stage
    pub mode: ShaderMode,
    /// Source code
    pub code: String,
    /// Fallback textures for sampler uniforms
    pub default_textures: BTreeMap<String, Rid>,
    params: Vec<ShaderParam>,
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Scan `uniform <type> <name>` declarations in declaration order
pub fn parse_uniforms(code: &str) -> Vec<ShaderParam> {
    code.split(';')
        .filter_map(|statement| {
            let mut tokens = statement
                .split_whitespace()
                .skip_while(|token| *token != "uniform")
                .skip(1)
                .filter(|token| !PRECISION_QUALIFIERS.contains(token));
            let type_name = tokens.next()?;
            let name = tokens
                .next()?
                .split(|c: char| c == ':' || c == '=' || c == '[')
                .next()
                .filter(|name| !name.is_empty())?;
            Some(ShaderParam { name: name.to_string(), type_name: type_name.to_string() })
        })
        .collect()
}

impl RenderServer {
    /// Create a shader for the given stage
    pub fn shader_create(&mut self, mode: ShaderMode) -> Rid {
        let rid = self.allocate(ResourceKind::Shader);
        self.shaders.insert(rid, Shader { mode, ..Shader::default() });
        rid
    }

    /// Change the stage
    pub fn shader_set_mode(&mut self, shader: Rid, mode: ShaderMode) -> ServerResult<()> {
        self.shaders.get_mut(shader)?.mode = mode;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Stage
    pub fn shader_get_mode(&self, shader: Rid) -> ServerResult<ShaderMode> {
        Ok(self.shaders.get(shader)?.mode)
    }

    /// Replace the source code and rescan its uniforms
    pub fn shader_set_code(&mut self, shader: Rid, code: impl Into<String>) -> ServerResult<()> {
        let record = self.shaders.get_mut(shader)?;
        record.code = code.into();
        record.params = parse_uniforms(&record.code);
        log::trace!("Shader {shader} declares {} uniforms", record.params.len());
        self.mark_resources_dirty();
        Ok(())
    }

    /// Source code
    pub fn shader_get_code(&self, shader: Rid) -> ServerResult<String> {
        Ok(self.shaders.get(shader)?.code.clone())
    }

    /// Uniforms declared by the current code
    pub fn shader_get_param_list(&self, shader: Rid) -> ServerResult<Vec<ShaderParam>> {
        Ok(self.shaders.get(shader)?.params.clone())
    }

    /// Set or clear (empty handle) the default texture of a sampler uniform
    pub fn shader_set_default_texture_param(&mut self, shader: Rid, name: &str, texture: Rid) -> ServerResult<()> {
        self.registry.expect_kind_or_empty(texture, ResourceKind::Texture)?;
        let record = self.shaders.get_mut(shader)?;
        if texture.is_empty() {
            record.default_textures.remove(name);
        } else {
            record.default_textures.insert(name.to_string(), texture);
        }
        self.mark_resources_dirty();
        Ok(())
    }

    /// Default texture of a sampler uniform, `None` if unset or freed
    pub fn shader_get_default_texture_param(&self, shader: Rid, name: &str) -> ServerResult<Option<Rid>> {
        let record = self.shaders.get(shader)?;
        Ok(record
            .default_textures
            .get(name)
            .copied()
            .filter(|texture| self.textures.contains(*texture)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;

    #[test]
    fn test_parse_uniforms() {
        let code = "shader_type spatial;\n\
                    uniform vec4 albedo : hint_color = vec4(1.0);\n\
                    uniform highp float roughness=0.5;\n\
                    uniform sampler2D tex;\n\
                    void fragment() { ALBEDO = albedo.rgb; }";
        let params = parse_uniforms(code);

        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["albedo", "roughness", "tex"]);
        assert_eq!(params[1].type_name, "float");
    }

    #[test]
    fn test_shader_code_roundtrip() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let shader = vs.shader_create(ShaderMode::CanvasItem);

        vs.shader_set_code(shader, "uniform float speed;").expect("code");
        assert_eq!(vs.shader_get_mode(shader), Ok(ShaderMode::CanvasItem));
        assert_eq!(vs.shader_get_code(shader).as_deref(), Ok("uniform float speed;"));
        assert_eq!(vs.shader_get_param_list(shader).expect("params").len(), 1);
    }

    #[test]
    fn test_default_texture_resolves_absent_after_free() {
        let mut vs = RenderServer::headless(ServerConfig::default());
        let shader = vs.shader_create(ShaderMode::Spatial);
        let texture = vs.texture_create();

        vs.shader_set_default_texture_param(shader, "tex", texture).expect("param");
        assert_eq!(vs.shader_get_default_texture_param(shader, "tex"), Ok(Some(texture)));

        vs.free(texture).expect("free");
        assert_eq!(vs.shader_get_default_texture_param(shader, "tex"), Ok(None));
    }
}
