/// Result alias that carries the custom [`SoundcheckError`] type.
pub type Result<T> = std::result::Result<T, SoundcheckError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SoundcheckError {
    /// Free-form error used where no richer variant applies.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Failure in the microphone capture backend.
    #[error("audio capture: {0}")]
    Capture(String),
    /// Failure in the playback engine or its audio output.
    #[error("playback: {0}")]
    Playback(String),
    /// Failure while fetching remote stream data.
    #[error("stream fetch: {0}")]
    Http(#[from] reqwest::Error),
    /// Malformed configuration file.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SoundcheckError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SoundcheckError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SoundcheckError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
