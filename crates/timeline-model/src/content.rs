//! Read-only description of the content placed on the output timeline.
//!
//! The host owns these values; the player only reads them, once per piece
//! rebuild and again per emission for the cosmetic properties (crop, fade,
//! gain, subtitle placement).

use crate::audio_mapping::AudioMapping;
use crate::frame_rate::FrameRateChange;
use crate::image::{Crop, Size};
use crate::time::{ContentTime, DcpTime, Frame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One item placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Display name, used in logs.
    pub name: String,

    /// Where the first untrimmed frame sits on the output timeline.
    pub position: DcpTime,

    /// Native duration, before trimming.
    pub length: ContentTime,

    /// Content time cut from the start.
    pub trim_start: ContentTime,

    /// Content time cut from the end.
    pub trim_end: ContentTime,

    /// Native video frame rate; audio-only content borrows the output rate.
    pub video_frame_rate: Option<f64>,

    pub video: Option<VideoContent>,
    pub audio: Option<AudioContent>,
    pub subtitle: Option<SubtitleContent>,
}

impl Content {
    /// Bare content of `length` at `position`, with no parts.
    pub fn new(name: impl Into<String>, position: DcpTime, length: ContentTime) -> Self {
        Self {
            name: name.into(),
            position,
            length,
            trim_start: ContentTime::zero(),
            trim_end: ContentTime::zero(),
            video_frame_rate: None,
            video: None,
            audio: None,
            subtitle: None,
        }
    }

    pub fn active_video_frame_rate(&self, output_rate: u32) -> f64 {
        self.video_frame_rate.unwrap_or(f64::from(output_rate))
    }

    pub fn frame_rate_change(&self, output_rate: u32) -> FrameRateChange {
        FrameRateChange::new(self.active_video_frame_rate(output_rate), output_rate)
    }

    /// Untrimmed length on the output timeline.
    pub fn full_length(&self, frc: &FrameRateChange) -> DcpTime {
        DcpTime::from_content(self.length, frc)
    }

    pub fn length_after_trim(&self, frc: &FrameRateChange) -> DcpTime {
        (self.full_length(frc) - DcpTime::from_content(self.trim_start + self.trim_end, frc))
            .clamp_non_negative()
    }

    /// First output time after this content.
    pub fn end(&self, frc: &FrameRateChange) -> DcpTime {
        self.position + self.length_after_trim(frc)
    }

    /// Fade level for native video frame `frame`, or `None` when fully visible.
    pub fn video_fade(&self, frame: Frame, output_rate: u32) -> Option<f64> {
        let video = self.video.as_ref()?;
        let rate = self.active_video_frame_rate(output_rate);
        let from_start = frame - self.trim_start.frames_round(rate);
        if video.fade_in > 0 && from_start < video.fade_in {
            return Some((from_start as f64 / video.fade_in as f64).max(0.0));
        }

        let fade_out_start =
            self.length.frames_round(rate) - self.trim_end.frames_round(rate) - video.fade_out;
        if video.fade_out > 0 && frame >= fade_out_start {
            let into = (frame - fade_out_start) as f64;
            return Some((1.0 - into / video.fade_out as f64).max(0.0));
        }
        None
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.streams.is_empty())
    }

    pub fn has_subtitle(&self) -> bool {
        self.subtitle.is_some()
    }
}

/// Which eye a frame is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eyes {
    #[default]
    Both,
    Left,
    Right,
}

impl Eyes {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Eyes::Both => 0,
            Eyes::Left => 1,
            Eyes::Right => 2,
        }
    }

    /// Whether a frame for these eyes completes an output frame.
    pub fn completes_frame(self) -> bool {
        matches!(self, Eyes::Both | Eyes::Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFrameType {
    #[default]
    TwoD,
    /// Decoder delivers alternating left/right frames.
    ThreeD,
}

/// How cropped video is sized into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoScale {
    /// Keep the aspect ratio, letterbox or pillarbox as needed.
    #[default]
    Fit,
    /// Fill the container.
    Stretch,
}

impl VideoScale {
    pub fn size(self, cropped: Size, container: Size) -> Size {
        match self {
            VideoScale::Fit => container.fit_ratio_within(cropped.ratio()),
            VideoScale::Stretch => container,
        }
    }
}

/// Colour conversion requested for the encoder; carried, not applied, here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourConversion {
    Srgb,
    Rec601,
    Rec709,
    Rec2020,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoContent {
    /// Native frame size.
    pub size: Size,
    pub crop: Crop,
    /// Frames of fade-in after the trimmed start.
    pub fade_in: Frame,
    /// Frames of fade-out before the trimmed end.
    pub fade_out: Frame,
    pub scale: VideoScale,
    pub colour_conversion: Option<ColourConversion>,
    pub frame_type: VideoFrameType,
}

impl VideoContent {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            crop: Crop::default(),
            fade_in: 0,
            fade_out: 0,
            scale: VideoScale::Fit,
            colour_conversion: Some(ColourConversion::Rec709),
            frame_type: VideoFrameType::TwoD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    /// Native sample rate.
    pub frame_rate: u32,
    pub channels: usize,
    pub mapping: AudioMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioContent {
    pub streams: Vec<AudioStream>,
    pub gain_db: f64,
}

impl AudioContent {
    /// The rate this content's audio is resampled to before mixing.
    ///
    /// Normally the output rate; when the video is sped up or slowed down the
    /// audio is resampled so that playing it at the output rate follows suit.
    pub fn resampled_frame_rate(&self, output_audio_rate: u32, frc: &FrameRateChange) -> u32 {
        let mut rate = f64::from(output_audio_rate);
        if frc.change_speed {
            rate /= frc.speed_up;
        }
        rate.round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubtitleContent {
    pub use_subtitles: bool,
    /// Composite onto the picture rather than deliver as a separate track.
    pub burn: bool,
    pub x_offset: f64,
    pub y_offset: f64,
    pub x_scale: f64,
    pub y_scale: f64,
}

impl Default for SubtitleContent {
    fn default() -> Self {
        Self {
            use_subtitles: true,
            burn: false,
            x_offset: 0.0,
            y_offset: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
        }
    }
}

/// Content properties a host can report as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentProperty {
    Position,
    Length,
    TrimStart,
    TrimEnd,
    VideoFrameRate,
    VideoFrameType,
    VideoCrop,
    VideoScale,
    VideoFade,
    ColourConversion,
    AudioStreams,
    AudioGain,
    SubtitleUse,
    SubtitleBurn,
    SubtitleOffset,
    SubtitleScale,
}

impl ContentProperty {
    /// Whether a change invalidates the player's pieces.
    pub fn requires_rebuild(self) -> bool {
        matches!(
            self,
            ContentProperty::Position
                | ContentProperty::Length
                | ContentProperty::TrimStart
                | ContentProperty::TrimEnd
                | ContentProperty::VideoFrameRate
                | ContentProperty::VideoFrameType
                | ContentProperty::AudioStreams
                | ContentProperty::SubtitleUse
        )
    }
}

/// All content on the timeline, in the order it was added.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    pub content: Vec<Arc<Content>>,
}

impl Playlist {
    pub fn new(content: Vec<Arc<Content>>) -> Self {
        Self { content }
    }

    /// End of the last content.
    pub fn length(&self, output_rate: u32) -> DcpTime {
        self.content
            .iter()
            .map(|c| c.end(&c.frame_rate_change(output_rate)))
            .max()
            .unwrap_or_default()
    }
}

/// Output format the timeline is rendered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub video_frame_rate: u32,
    pub audio_frame_rate: u32,
    pub audio_channels: usize,
    /// Size of the full output frame.
    pub frame_size: Size,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            video_frame_rate: 24,
            audio_frame_rate: 48_000,
            audio_channels: 6,
            frame_size: Size::new(1998, 1080),
        }
    }
}

impl OutputSettings {
    /// Playlist length rounded up to a whole video frame.
    pub fn length(&self, playlist: &Playlist) -> DcpTime {
        playlist
            .length(self.video_frame_rate)
            .ceil(f64::from(self.video_frame_rate))
    }

    pub fn one_video_frame(&self) -> DcpTime {
        DcpTime::from_frames(1, f64::from(self.video_frame_rate))
    }
}
