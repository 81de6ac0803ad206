//! One unit of encoding work.

use cadence_model::{Eyes, Frame};
use cadence_player::PlayerVideo;
use std::sync::Arc;

/// A rendered-frame recipe bound to its position in the output.
///
/// Owned by the scheduler's queue until a worker pops it; a worker that
/// cannot finish it puts it back at the head.
#[derive(Debug, Clone)]
pub struct DcpVideo {
    frame: Arc<PlayerVideo>,
    index: Frame,
    frames_per_second: u32,
}

impl DcpVideo {
    pub fn new(frame: Arc<PlayerVideo>, index: Frame, frames_per_second: u32) -> Self {
        Self {
            frame,
            index,
            frames_per_second,
        }
    }

    pub fn frame(&self) -> &Arc<PlayerVideo> {
        &self.frame
    }

    /// Output frame index.
    pub fn index(&self) -> Frame {
        self.index
    }

    pub fn eyes(&self) -> Eyes {
        self.frame.eyes
    }

    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }
}
