//! The seam between the player and whatever decodes content.
//!
//! A decoder advertises what it can produce through [`DecoderCapabilities`]
//! and, on each [`Decoder::pass`], appends what it decoded to an event queue.
//! The player drains that queue, in order, before `pass` returns, so data is
//! handled synchronously with the call that produced it.

use cadence_audio::ContentAudio;
use cadence_common::CadenceResult;
use cadence_model::{Content, ContentTime, Eyes, Frame, Image, ImageSubtitle, TextSubtitle};
use std::sync::Arc;

use crate::player_video::EncodedData;

/// Which kinds of data a decoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderCapabilities {
    pub video: bool,
    pub audio: bool,
    pub subtitle: bool,
}

/// What the caller of [`Decoder::pass`] is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Video,
    Audio,
    Subtitle,
}

/// A decoded video frame, indexed at the content's native frame rate.
#[derive(Debug, Clone)]
pub struct ContentVideo {
    pub image: Arc<Image>,
    pub frame: Frame,
    pub eyes: Eyes,
    /// Already-compressed data for this frame, when the source carries it.
    pub encoded: Option<EncodedData>,
}

impl ContentVideo {
    pub fn new(image: Arc<Image>, frame: Frame) -> Self {
        Self {
            image,
            frame,
            eyes: Eyes::Both,
            encoded: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentImageSubtitle {
    pub from: ContentTime,
    pub subtitle: ImageSubtitle,
}

#[derive(Debug, Clone)]
pub struct ContentTextSubtitle {
    pub from: ContentTime,
    pub subtitles: Vec<TextSubtitle>,
}

/// One unit of decoder output.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    Video(ContentVideo),
    /// Resampled audio for one of the content's streams.
    Audio { stream: usize, audio: ContentAudio },
    ImageSubtitleStart(ContentImageSubtitle),
    TextSubtitleStart(ContentTextSubtitle),
    /// The subtitle currently showing ends at this time.
    SubtitleStop(ContentTime),
}

/// Decodes one piece of content.
pub trait Decoder: Send {
    fn capabilities(&self) -> DecoderCapabilities;

    /// Decode a little more, appending output to `events`. Returns true when
    /// the content is exhausted.
    fn pass(&mut self, reason: PassReason, events: &mut Vec<DecoderEvent>) -> CadenceResult<bool>;

    /// Reposition; with `accurate` the next output starts at or before `time`.
    fn seek(&mut self, time: ContentTime, accurate: bool) -> CadenceResult<()>;

    /// Content time of the most recent output.
    fn position(&self) -> ContentTime;

    fn set_ignore_video(&mut self) {}

    fn set_ignore_subtitle(&mut self) {}
}

/// Creates decoders for content.
pub trait DecoderFactory: Send + Sync {
    /// `None` when this content cannot be decoded; the player then fills its
    /// span with black and silence.
    fn create(&self, content: &Arc<Content>) -> Option<Box<dyn Decoder>>;
}
