//! Cadence Audio Core
//!
//! Everything audio between a decoder and the output mix:
//! - **Resampling:** [`Resampler`] seam and a streaming [`LinearResampler`]
//! - **Stream buffering:** [`AudioDecoderStream`] windows, seek reconciliation
//! - **Decoder helper:** [`AudioDecoder`] for decoder implementations
//! - **Mixing:** [`AudioMerger`], channel [`remap`], [`AudioProcessor`]
//!
//! Pure computation: no threads and no I/O.

pub mod decoder;
pub mod mapping;
pub mod merger;
pub mod processor;
pub mod resampler;
pub mod stream;

pub use decoder::AudioDecoder;
pub use mapping::remap;
pub use merger::AudioMerger;
pub use processor::{AudioProcessor, MidSideDecoder};
pub use resampler::{LinearResampler, Resampler};
pub use stream::{AudioDecoderStream, AudioSource, ContentAudio};
