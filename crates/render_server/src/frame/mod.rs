//! Frame pipeline: phases, the published snapshot and the backend boundary

pub mod backend;
pub mod pipeline;
pub mod snapshot;

pub use backend::{HeadlessBackend, HeadlessStats, RenderBackend};
pub use pipeline::{FramePhase, FramePipeline};
pub use snapshot::{FrameReader, FrameSnapshot, PublishedFrame};
