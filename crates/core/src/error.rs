/// Result alias that carries the custom [`TreeError`] type.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Input rejected before touching controller state: unknown effect names,
    /// malformed payloads, out-of-range values or timer operations that are
    /// not valid in the current timer phase.
    #[error("{0}")]
    Validation(String),
    /// The coordinate layout could not be loaded. Fatal at startup.
    #[error("invalid layout at line {line}: {message}")]
    Layout { line: usize, message: String },
    /// The render scheduler owning the controller has shut down.
    #[error("render engine has stopped")]
    EngineStopped,
    /// Publish or connect failure on the pub/sub surface.
    #[error("transport error: {0}")]
    Transport(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl TreeError {
    /// Creates a validation error that wraps the provided message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller sent something the controller refused, as opposed
    /// to the controller failing on its own.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Json(_))
    }
}
