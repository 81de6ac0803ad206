//! Cadence Encoder
//!
//! Schedules compression of output frames across local threads and remote
//! encode servers:
//!
//! - a bounded job queue gives the producer backpressure,
//! - frames the writer already has, precompressed frames and repeats skip
//!   the queue,
//! - failing servers back off and their jobs go back to the head of the queue,
//! - the pool is rebuilt whenever the set of servers changes.

pub mod backoff;
pub mod encoder;
pub mod job;
pub mod server;
pub mod transcoder;
pub mod writer;

pub use backoff::{CancellationToken, RemoteBackoff};
pub use encoder::{EncoderState, J2kEncoder};
pub use job::DcpVideo;
pub use server::{EncodeServerDescription, ServerFinder, ServerList, ServersChanged, Subscription};
pub use transcoder::Transcoder;
pub use writer::{FrameEncoder, Writer};
