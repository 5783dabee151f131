/// Result alias that carries the custom [`PulseError`] type.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// The spectrum input is missing or closed. Never fatal: the runtime
    /// degrades to silence.
    #[error("spectrum source unavailable: {0}")]
    SourceUnavailable(String),
    /// The terminal did not answer a color query in time.
    #[error("baseline query timed out for {0}")]
    BaselineQueryTimeout(String),
    /// Writing a frame of escape sequences to the output device failed.
    #[error("failed to write escape sequences: {0}")]
    EncodingWrite(#[source] std::io::Error),
    /// Invalid configuration, detected before any terminal mutation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The output device could not be opened at all.
    #[error("output device {path} unavailable: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl PulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a configuration error.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// Errors the process cannot recover from: startup configuration
    /// mistakes and an output device that cannot be opened.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DeviceUnavailable { .. })
    }
}

impl From<&str> for PulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
