//! Cadence Timeline Model
//!
//! The value types every other cadence crate speaks:
//! - **Time:** fixed-point [`ContentTime`] / [`DcpTime`] with explicit conversion
//! - **Frame rates:** [`FrameRateChange`] (skip, repeat, speed change)
//! - **Media:** [`AudioBuffers`], [`Image`], subtitle payloads
//! - **Content:** what sits where on the output timeline, and the output format
//!
//! Nothing in here decodes or encodes anything.

pub mod audio_buffers;
pub mod audio_mapping;
pub mod content;
pub mod frame_rate;
pub mod image;
pub mod subtitle;
pub mod time;

pub use audio_buffers::*;
pub use audio_mapping::*;
pub use content::*;
pub use frame_rate::*;
pub use image::*;
pub use subtitle::*;
pub use time::*;
