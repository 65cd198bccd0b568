//! # Render Server
//!
//! A handle-indirected scene and resource server. Client code allocates
//! opaque [`Rid`] handles, edits records through handle-scoped setters and
//! composes instances into scenarios and viewports. Edits are visible to
//! getters at once but reach the execution backend only through the snapshot
//! published by [`RenderServer::sync`].
//!
//! ## Quick Start
//!
//! ```rust
//! use render_server::prelude::*;
//!
//! let mut vs = RenderServer::headless(ServerConfig::default());
//! vs.init()?;
//!
//! let scenario = vs.scenario_create();
//! let instance = vs.instance_create2(vs.get_test_cube(), scenario)?;
//! vs.instance_attach_object_id(instance, Some(ObjectId(7)))?;
//!
//! vs.sync();
//! vs.draw();
//!
//! let hits = vs.instances_cull_aabb(AABB::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)), scenario)?;
//! assert_eq!(hits, vec![ObjectId(7)]);
//!
//! vs.finish();
//! # Ok::<(), ServerError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod defaults;
pub mod error;
pub mod foundation;
pub mod frame;
pub mod resources;
pub mod scene;

mod server;

pub use error::{ServerError, ServerResult};
pub use resources::{ResourceKind, Rid};
pub use server::{BootImage, Cursor, Feature, RenderInfo, RenderServer};

/// Common imports for server users
pub mod prelude {
    pub use crate::{
        core::ServerConfig,
        error::{ServerError, ServerResult},
        foundation::math::{Color, Mat4, Rect2, Transform, Transform2D, Vec2, Vec3},
        frame::{FramePhase, FrameReader, FrameSnapshot, HeadlessBackend, RenderBackend},
        resources::{ResourceKind, Rid},
        scene::{
            ConvexVolume, CullShape, EnvironmentResolution, InstanceFlags, ObjectId, Plane, ViewportFlags,
            ViewportUpdateMode, AABB,
        },
        Feature, RenderInfo, RenderServer,
    };
}
