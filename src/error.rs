//! Error types for the workload aggregate

/// Result type for aggregate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for aggregate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown kind token in a composite identifier
    #[error("failed to find type {0}")]
    NotFound(String),

    /// Failure surfaced verbatim from a backing collection or collaborator
    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    /// A per-kind watch subscription ended
    #[error("disconnect: {kind} watch ended")]
    Disconnect { kind: String },

    /// Image reference could not be parsed; only ever logged
    #[error("invalid image reference {image:?}: {reason}")]
    MalformedImageReference { image: String, reason: String },

    /// Create payload names more than one target kind
    #[error("payload sets more than one kind field: {}", .0.join(", "))]
    AmbiguousKind(Vec<String>),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Invalid construction input (binding table, fixtures)
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for unknown-kind errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
