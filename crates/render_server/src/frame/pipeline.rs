//! Frame pipeline phases
//!
//! Tracks where the server is between staging mutations, publishing them on
//! `sync` and executing the published snapshot on `draw`:
//!
//! ```text
//! Idle -> Staged -> Published -> Executing -> Idle
//! ```
//!
//! The controller only keeps counters. Building and swapping the snapshot is
//! done by the server, which reports back whether content changed.

/// Current phase of the frame pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FramePhase {
    /// Nothing pending since the last draw
    #[default]
    Idle,
    /// Mutations are waiting for `sync`
    Staged,
    /// A snapshot is published and waiting for `draw`
    Published,
    /// The backend is executing the published snapshot
    Executing,
}

/// Phase and revision bookkeeping for `sync` / `draw`
#[derive(Debug, Clone, Default)]
pub struct FramePipeline {
    phase: FramePhase,
    pending: bool,
    resource_epoch: u64,
    published_revision: u64,
    drawn_revision: u64,
    frames_drawn: u64,
}

impl FramePipeline {
    /// Idle pipeline holding the empty revision 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Whether mutations arrived since the last publish
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Resource edit counter
    pub fn resource_epoch(&self) -> u64 {
        self.resource_epoch
    }

    /// Revision of the published snapshot
    pub fn published_revision(&self) -> u64 {
        self.published_revision
    }

    /// Revision the last draw consumed
    pub fn drawn_revision(&self) -> u64 {
        self.drawn_revision
    }

    /// Number of completed draws
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Record a scene mutation
    pub fn stage(&mut self) {
        self.pending = true;
        if matches!(self.phase, FramePhase::Idle | FramePhase::Published) {
            log::trace!("Frame pipeline: {:?} -> Staged", self.phase);
            self.phase = FramePhase::Staged;
        }
    }

    /// Record a resource mutation; resource edits always count as changed content
    pub fn bump_resources(&mut self) {
        self.resource_epoch += 1;
        self.stage();
    }

    /// Revision the next snapshot should carry
    pub fn next_revision(&self) -> u64 {
        self.published_revision + 1
    }

    /// Move to Published; `changed` advances the published revision
    pub fn publish(&mut self, changed: bool) -> u64 {
        if changed {
            self.published_revision += 1;
        }
        self.pending = false;
        log::debug!("Frame pipeline: {:?} -> Published (revision {})", self.phase, self.published_revision);
        self.phase = FramePhase::Published;
        self.published_revision
    }

    /// Move to Executing
    pub fn begin_execute(&mut self) {
        log::trace!("Frame pipeline: {:?} -> Executing", self.phase);
        self.phase = FramePhase::Executing;
    }

    /// Record that `revision` was drawn and settle to Idle or Staged
    pub fn end_execute(&mut self, revision: u64) {
        self.drawn_revision = revision;
        self.frames_drawn += 1;
        self.phase = if self.pending { FramePhase::Staged } else { FramePhase::Idle };
        log::trace!("Frame pipeline: Executing -> {:?}", self.phase);
    }

    /// Whether the published snapshot differs from the last drawn one
    pub fn has_changed(&self) -> bool {
        self.published_revision != self.drawn_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut pipeline = FramePipeline::new();
        assert_eq!(pipeline.phase(), FramePhase::Idle);

        pipeline.stage();
        assert_eq!(pipeline.phase(), FramePhase::Staged);
        assert!(pipeline.is_pending());

        assert_eq!(pipeline.publish(true), 1);
        assert_eq!(pipeline.phase(), FramePhase::Published);
        assert!(pipeline.has_changed());

        pipeline.begin_execute();
        assert_eq!(pipeline.phase(), FramePhase::Executing);
        pipeline.end_execute(1);
        assert_eq!(pipeline.phase(), FramePhase::Idle);
        assert!(!pipeline.has_changed());
        assert_eq!(pipeline.frames_drawn(), 1);
    }

    #[test]
    fn test_unchanged_publish_keeps_revision() {
        let mut pipeline = FramePipeline::new();
        assert_eq!(pipeline.publish(false), 0);
        assert_eq!(pipeline.publish(false), 0);
        assert_eq!(pipeline.phase(), FramePhase::Published);
        assert!(!pipeline.has_changed());
    }

    #[test]
    fn test_mutation_during_published_restages() {
        let mut pipeline = FramePipeline::new();
        pipeline.publish(true);
        pipeline.bump_resources();
        assert_eq!(pipeline.phase(), FramePhase::Staged);
        assert_eq!(pipeline.resource_epoch(), 1);

        pipeline.begin_execute();
        pipeline.end_execute(1);
        assert_eq!(pipeline.phase(), FramePhase::Staged);
    }
}
