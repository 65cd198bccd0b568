//! # Core Server Module
//!
//! Shared configuration for every subsystem of the server.

pub mod config;

pub use config::{DefaultResourceConfig, FrameConfig, LoggingConfig, ServerConfig};
