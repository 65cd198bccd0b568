//! # Server Configuration
//!
//! Configuration structures for the render server. Every section is
//! serializable so a host can keep the whole thing in a TOML or RON file.
//!
//! ## Configuration Categories
//!
//! - **Logging**: filter level handed to `env_logger`
//! - **Frame**: clear color and texture upload behavior
//! - **Defaults**: the placeholder resource catalogue created by `init()`

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::foundation::math::Color;

/// # Logging Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter string (e.g. "info", "render_server=debug")
    pub log_level: String,
}

impl LoggingConfig {
    /// Create a logging configuration with the given filter
    pub fn new(log_level: impl Into<String>) -> Self {
        Self { log_level: log_level.into() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// # Frame Configuration
///
/// Behavior of the frame pipeline that is not tied to a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Clear color used by viewports whose environment does not override it
    pub default_clear_color: Color,
    /// Halve every image passed to `texture_set_data`
    pub shrink_textures_x2: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            default_clear_color: Color::rgb(0.3, 0.3, 0.3),
            shrink_textures_x2: false,
        }
    }
}

/// # Default Resource Configuration
///
/// Controls the placeholder catalogue (white texture, test texture, test cube,
/// 2D materials) and fixed-capacity server tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultResourceConfig {
    /// Create the placeholder catalogue during `init()`
    pub create_on_init: bool,
    /// Edge length of the white texture in pixels
    pub white_texture_size: u32,
    /// Edge length of the checkerboard test texture in pixels
    pub test_texture_size: u32,
    /// Half extent of the test cube mesh
    pub test_cube_half_extent: f32,
    /// Number of hardware cursor slots
    pub max_cursors: usize,
}

impl Default for DefaultResourceConfig {
    fn default() -> Self {
        Self {
            create_on_init: true,
            white_texture_size: 16,
            test_texture_size: 256,
            test_cube_half_extent: 0.5,
            max_cursors: 8,
        }
    }
}

/// # Complete Server Configuration
///
/// Top-level configuration handed to [`crate::RenderServer::new`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Frame pipeline configuration
    pub frame: FrameConfig,
    /// Placeholder resource configuration
    pub defaults: DefaultResourceConfig,
}

impl ServerConfig {
    /// Set the log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.log_level = level.into();
        self
    }

    /// Enable or disable the placeholder catalogue
    pub fn with_default_resources(mut self, enabled: bool) -> Self {
        self.defaults.create_on_init = enabled;
        self
    }

    /// Set the number of cursor slots
    pub fn with_max_cursors(mut self, max_cursors: usize) -> Self {
        self.defaults.max_cursors = max_cursors;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log level cannot be empty".to_string()));
        }
        if self.defaults.white_texture_size == 0 || self.defaults.test_texture_size == 0 {
            return Err(ConfigError::Invalid("default texture sizes must be non-zero".to_string()));
        }
        if self.defaults.test_cube_half_extent <= 0.0 {
            return Err(ConfigError::Invalid("test cube extent must be positive".to_string()));
        }
        if self.defaults.max_cursors == 0 {
            return Err(ConfigError::Invalid("at least one cursor slot is required".to_string()));
        }
        Ok(())
    }
}

impl Config for ServerConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cursors_rejected() {
        let config = ServerConfig::default().with_max_cursors(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("render_server_cfg_{}.toml", std::process::id()));
        let config = ServerConfig::default().with_log_level("debug").with_max_cursors(4);

        config.save_to_file(&path).expect("save");
        let loaded = ServerConfig::load_from_file(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed: ServerConfig = ron::from_str("(logging: (log_level: \"warn\"))").expect("parse");
        assert_eq!(parsed.logging.log_level, "warn");
        assert_eq!(parsed.defaults, DefaultResourceConfig::default());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = ServerConfig::load_from_file("settings.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
