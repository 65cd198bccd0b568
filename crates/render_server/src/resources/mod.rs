//! # Resource Stores
//!
//! One module per resource kind. Each holds the record type, its enums and
//! the handle-addressed `RenderServer` methods that create and mutate it.
//! Setters validate first and leave the record untouched on error.

pub mod camera;
pub mod canvas_light;
pub mod environment;
pub mod handle;
pub mod immediate;
pub mod light;
pub mod material;
pub mod mesh;
pub mod multimesh;
pub mod reflection_probe;
pub mod room;
pub mod shader;
pub mod skeleton;
pub mod store;
pub mod texture;

pub use handle::{HandleRegistry, InstanceType, ResourceKind, Rid};
pub use store::Store;
