//! Logging utilities

use std::sync::Once;

use crate::core::config::LoggingConfig;

pub use log::{debug, error, info, trace, warn};

static INIT: Once = Once::new();

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `config.log_level`. Subsequent calls are ignored, so tests and embedding
/// applications can call this freely.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.parse_filters(&config.log_level);
        }

        // try_init: a host may already have installed its own logger
        if builder.try_init().is_ok() {
            log::debug!("logging initialized at '{}'", config.log_level);
        }
    });
}
