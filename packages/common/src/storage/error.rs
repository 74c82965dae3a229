use thiserror::Error;

/// Errors that can occur while moving objects to or from a mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// The key is empty or tries to escape the mirror's namespace.
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    /// The mirror could not be constructed from its configuration.
    #[error("mirror misconfigured: {0}")]
    Config(String),
    /// The remote store rejected or failed the request.
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("mirror IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Whether retrying the same request can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidKey(_) | Self::Config(_)
        )
    }
}
