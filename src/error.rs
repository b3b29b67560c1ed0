//! Error taxonomy shared by the sampler, the oracles and media I/O.

/// Convenience result type used across the crate.
pub type Sv4dResult<T> = Result<T, Sv4dError>;

#[derive(thiserror::Error, Debug)]
pub enum Sv4dError {
    /// Invalid user-provided configuration, angles or input frames.
    /// Always raised before any diffusion call is issued.
    #[error("validation error: {0}")]
    Validation(String),

    /// The grid was not in the state a pass expected (e.g. an empty
    /// conditioning slot).
    #[error("schedule error: {0}")]
    Schedule(String),

    /// Failure reported by a diffusion oracle.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Decoding or encoding images and videos.
    #[error("media error: {0}")]
    Media(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Sv4dError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    /// Whether the error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
