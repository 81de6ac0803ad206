//! A piece: one content item paired with its decoder.

use cadence_model::{Content, ContentTime, DcpTime, Frame, FrameRateChange};
use std::sync::Arc;

use crate::decoder::Decoder;

/// Stable reference to a piece, valid only for the piece list it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceRef {
    pub generation: u64,
    pub index: usize,
}

pub struct Piece {
    pub content: Arc<Content>,
    pub decoder: Box<dyn Decoder>,
    pub frc: FrameRateChange,
    pub done: bool,
}

impl Piece {
    pub fn new(content: Arc<Content>, decoder: Box<dyn Decoder>, frc: FrameRateChange) -> Self {
        Self {
            content,
            decoder,
            frc,
            done: false,
        }
    }

    pub fn position(&self) -> DcpTime {
        self.content.position
    }

    pub fn end(&self) -> DcpTime {
        self.content.end(&self.frc)
    }

    pub fn length_after_trim(&self) -> DcpTime {
        self.content.length_after_trim(&self.frc)
    }

    fn trim_start_dcp(&self) -> DcpTime {
        DcpTime::from_content(self.content.trim_start, &self.frc)
    }

    /// Offset into the used part of the content, clamped to `[0, length_after_trim]`.
    fn offset_into(&self, time: DcpTime) -> DcpTime {
        (time - self.position())
            .clamp_non_negative()
            .min(self.length_after_trim())
    }

    /// Native video frame shown at output time `time`.
    pub fn dcp_to_content_video(&self, time: DcpTime) -> Frame {
        let s = self.offset_into(time) + self.trim_start_dcp();
        (s.frames_floor(f64::from(self.frc.dcp)) as f64 / self.frc.factor()) as Frame
    }

    /// Output time at which native video frame `frame` is shown.
    pub fn content_video_to_dcp(&self, frame: Frame) -> DcpTime {
        let d = DcpTime::from_seconds(frame as f64 * self.frc.factor() / f64::from(self.frc.dcp))
            - self.trim_start_dcp();
        (d + self.position()).clamp_non_negative()
    }

    /// Resampled audio frame (counted at `audio_rate`) playing at `time`.
    pub fn dcp_to_resampled_audio(&self, time: DcpTime, audio_rate: u32) -> Frame {
        (self.offset_into(time) + self.trim_start_dcp()).frames_floor(f64::from(audio_rate))
    }

    /// Output time of resampled audio frame `frame` (counted at `audio_rate`).
    pub fn resampled_audio_to_dcp(&self, frame: Frame, audio_rate: u32) -> DcpTime {
        (DcpTime::from_frames(frame, f64::from(audio_rate)) - self.trim_start_dcp()
            + self.position())
        .clamp_non_negative()
    }

    pub fn dcp_to_content_time(&self, time: DcpTime) -> ContentTime {
        ContentTime::from_dcp(self.offset_into(time), &self.frc) + self.content.trim_start
    }

    pub fn content_time_to_dcp(&self, time: ContentTime) -> DcpTime {
        (DcpTime::from_content(time - self.content.trim_start, &self.frc) + self.position())
            .clamp_non_negative()
    }
}
