//! Backend boundary
//!
//! The execution backend receives the published snapshot once per `draw`
//! and acknowledges it. It never sees the live stores.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::frame::snapshot::FrameSnapshot;

/// Executes published frames
///
/// # Threading
/// The server calls into its backend from the producer thread only. A backend
/// that hands work to another thread should read from a
/// [`FrameReader`](crate::frame::snapshot::FrameReader) there instead.
pub trait RenderBackend {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Called once from `init`
    fn initialize(&mut self) {}

    /// Execute one frame; `false` reports a failed frame
    fn execute_frame(&mut self, frame: &FrameSnapshot) -> bool;

    /// Called once from `finish`
    fn shutdown(&mut self) {}
}

/// Counters shared between a [`HeadlessBackend`] and its observers
#[derive(Debug, Default)]
pub struct HeadlessStats {
    frames_executed: AtomicU64,
    last_viewport_count: AtomicUsize,
    last_revision: AtomicU64,
}

impl HeadlessStats {
    /// Frames executed so far
    pub fn frames_executed(&self) -> u64 {
        self.frames_executed.load(Ordering::Acquire)
    }

    /// Viewports in the last executed frame
    pub fn last_viewport_count(&self) -> usize {
        self.last_viewport_count.load(Ordering::Acquire)
    }

    /// Revision of the last executed frame
    pub fn last_revision(&self) -> u64 {
        self.last_revision.load(Ordering::Acquire)
    }
}

/// Backend that draws nothing and counts frames
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    stats: Arc<HeadlessStats>,
}

impl HeadlessBackend {
    /// New backend with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters, readable after the backend moves into a server
    pub fn stats(&self) -> Arc<HeadlessStats> {
        Arc::clone(&self.stats)
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn execute_frame(&mut self, frame: &FrameSnapshot) -> bool {
        self.stats.frames_executed.fetch_add(1, Ordering::AcqRel);
        self.stats.last_viewport_count.store(frame.viewports.len(), Ordering::Release);
        self.stats.last_revision.store(frame.revision, Ordering::Release);
        log::trace!("Headless frame {} with {} viewports", frame.revision, frame.viewports.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_counts_frames() {
        let mut backend = HeadlessBackend::new();
        let stats = backend.stats();

        assert!(backend.execute_frame(&FrameSnapshot { revision: 3, ..FrameSnapshot::default() }));
        assert!(backend.execute_frame(&FrameSnapshot::default()));

        assert_eq!(stats.frames_executed(), 2);
        assert_eq!(stats.last_viewport_count(), 0);
        assert_eq!(stats.last_revision(), 0);
    }
}
