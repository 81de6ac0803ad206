//! Cadence Player
//!
//! Merges independently decoded content items into one time-ordered stream
//! of output video frames, mixed audio and subtitles.
//!
//! Content is placed on the output timeline by a [`Playlist`](cadence_model::Playlist);
//! a [`DecoderFactory`] supplies one [`Decoder`] per item. Repeated calls to
//! [`Player::pass`] then emit, through registered callbacks:
//!
//! - exactly one video frame per output frame instant, gap-filled with the
//!   last frame or black,
//! - contiguous audio at the output rate, silence where nothing plays,
//! - subtitles, burnt into the video or delivered separately.

pub mod active_subtitles;
pub mod decoder;
pub mod empty;
pub mod piece;
pub mod player;
pub mod player_video;

pub use decoder::{
    ContentImageSubtitle, ContentTextSubtitle, ContentVideo, Decoder, DecoderCapabilities,
    DecoderEvent, DecoderFactory, PassReason,
};
pub use player::{
    AudioCallback, ChangedCallback, Player, SubtitleCallback, SubtitleRenderer, VideoCallback,
};
pub use player_video::{EncodedData, PlayerVideo};
