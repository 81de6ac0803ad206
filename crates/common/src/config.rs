//! Configuration values.
//!
//! Nothing here touches the filesystem: a host builds these values (or
//! deserializes them from wherever it keeps settings) and hands them to the
//! components that need them. Every struct is `#[serde(default)]` so a partial
//! document fills in the rest.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CadenceError, CadenceResult};

/// Everything a host may configure, grouped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    /// Frame-encoding scheduler settings.
    pub encoder: EncoderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Frame-encoding scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    /// Number of local encoding threads.
    pub master_encoding_threads: usize,

    /// When set, no local workers are started; only remote servers encode.
    pub only_servers_encode: bool,

    /// Backoff added after each consecutive failure of a remote server (ms).
    pub remote_backoff_step_ms: u64,

    /// Upper bound on the remote backoff (ms).
    pub remote_backoff_max_ms: u64,

    /// How many completion events feed the rate estimate.
    pub history_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "cadence_encoder=trace,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            master_encoding_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            only_servers_encode: false,
            remote_backoff_step_ms: 10_000,
            remote_backoff_max_ms: 60_000,
            history_size: 200,
        }
    }
}

impl EncoderConfig {
    pub fn remote_backoff_step(&self) -> Duration {
        Duration::from_millis(self.remote_backoff_step_ms)
    }

    pub fn remote_backoff_max(&self) -> Duration {
        Duration::from_millis(self.remote_backoff_max_ms)
    }

    /// Reject settings the scheduler cannot work with.
    pub fn validate(&self) -> CadenceResult<()> {
        if self.remote_backoff_step_ms == 0 {
            return Err(CadenceError::config("remote_backoff_step_ms must be positive"));
        }
        if self.remote_backoff_step_ms > self.remote_backoff_max_ms {
            return Err(CadenceError::config(format!(
                "remote_backoff_step_ms ({}) exceeds remote_backoff_max_ms ({})",
                self.remote_backoff_step_ms, self.remote_backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Number of local workers this configuration asks for.
    pub fn local_threads(&self) -> usize {
        if self.only_servers_encode {
            0
        } else {
            self.master_encoding_threads
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
