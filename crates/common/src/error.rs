//! Error types shared across cadence crates.

/// Top-level error type for cadence operations.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Remote encode on {host} failed: {message}")]
    RemoteEncode { host: String, message: String },

    #[error("Writer error: {message}")]
    Writer { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Worker thread error: {message}")]
    Thread { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CadenceError.
pub type CadenceResult<T> = Result<T, CadenceError>;

impl CadenceError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn remote_encode(host: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RemoteEncode {
            host: host.into(),
            message: msg.into(),
        }
    }

    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn thread(msg: impl Into<String>) -> Self {
        Self::Thread {
            message: msg.into(),
        }
    }
}
