use thiserror::Error;

/// Broad classification of a [`HaulerError`].
///
/// Callers branch on the kind rather than on individual variants when
/// deciding whether an operation is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No getter or file matched the requested source.
    SourceNotFound,
    /// Read, write or network failure. Retrying may succeed.
    Io,
    /// Malformed input: image list lines, references, URLs, digests.
    Parse,
    /// Content did not match its declared digest or size.
    FailedPrecondition,
    /// The operation is not supported by this implementation.
    Unsupported,
    /// Anything else (registry, cache, configuration).
    Other,
}

/// Hauler error types
#[derive(Error, Debug)]
pub enum HaulerError {
    /// Source does not exist
    #[error("Source not found: {source_ref}")]
    SourceNotFound { source_ref: String },

    /// No registered getter claims the source
    #[error("getter-type-unknown: no getter detected source '{source_ref}'")]
    UnknownGetter { source_ref: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path, reference or operation it concerns
    #[error("I/O error: {context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed input
    #[error("Parse error: {0}")]
    Parse(String),

    /// Image reference could not be parsed
    #[error("Invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    /// Digest string could not be parsed
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Committed content hashed to a different digest
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Committed content had a different length
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Layer cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation aborted through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl HaulerError {
    /// Attach context to an I/O error.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HaulerError::IoContext {
            context: context.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HaulerError::SourceNotFound { .. } | HaulerError::UnknownGetter { .. } => {
                ErrorKind::SourceNotFound
            }
            HaulerError::Io(_) | HaulerError::IoContext { .. } | HaulerError::Cancelled => {
                ErrorKind::Io
            }
            HaulerError::Parse(_)
            | HaulerError::InvalidReference { .. }
            | HaulerError::InvalidDigest(_) => ErrorKind::Parse,
            HaulerError::DigestMismatch { .. } | HaulerError::SizeMismatch { .. } => {
                ErrorKind::FailedPrecondition
            }
            HaulerError::Unsupported(_) => ErrorKind::Unsupported,
            HaulerError::Registry { .. }
            | HaulerError::Cache(_)
            | HaulerError::Serialization(_)
            | HaulerError::Config(_) => ErrorKind::Other,
        }
    }
}

impl From<serde_json::Error> for HaulerError {
    fn from(err: serde_json::Error) -> Self {
        HaulerError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HaulerError {
    fn from(err: serde_yaml::Error) -> Self {
        HaulerError::Serialization(err.to_string())
    }
}

/// Result type alias for hauler operations
pub type Result<T> = std::result::Result<T, HaulerError>;
