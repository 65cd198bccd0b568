//! # Scene Composition
//!
//! Everything that places resources into a renderable world:
//! - Bounding volumes and cull shapes
//! - The instance graph
//! - Scenarios and viewports
//! - The 2D canvas tree

pub mod canvas;
pub mod culling;
pub mod instance;
pub mod scenario;
pub mod viewport;

pub use culling::{ConvexVolume, CullShape, Plane, AABB};
pub use instance::{InstanceFlags, ObjectId, ShadowCasting};
pub use scenario::{EnvironmentResolution, ScenarioDebugMode};
pub use viewport::{ViewportClearMode, ViewportFlags, ViewportUpdateMode};
