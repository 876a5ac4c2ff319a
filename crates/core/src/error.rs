/// Result alias that carries the custom [`TrainerError`] type.
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    /// The requested audio device could not be acquired. This is the only
    /// failure a caller is expected to handle: it is surfaced from `start()`
    /// and never retried internally.
    #[error("audio {0} device unavailable")]
    DeviceUnavailable(&'static str),
    /// A backend stream failed to build or play. Fatal to the call that
    /// triggered it; the engine stays in its prior state.
    #[error("audio backend error: {0}")]
    Backend(String),
    /// Configuration values violate an engine invariant.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl TrainerError {
    /// Creates a backend error from any displayable stream failure.
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Creates a configuration error that wraps the provided message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
