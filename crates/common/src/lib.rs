//! Cadence Common Utilities
//!
//! Shared infrastructure for all cadence crates:
//! - Error types and result aliases
//! - Event-rate history for progress reporting
//! - Tracing/logging initialization
//! - Configuration values

pub mod config;
pub mod error;
pub mod logging;
pub mod rate;

pub use config::*;
pub use error::*;
pub use rate::*;
