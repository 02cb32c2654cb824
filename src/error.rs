use thiserror::Error;

/// Main error type for degrees
#[derive(Error, Debug)]
pub enum DegreesError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph provider errors (network failure, rate limit, upstream 5xx)
    #[error("Graph provider error: {0}")]
    Provider(String),

    /// Task dispatcher errors (queue write or push submission failed)
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Unrecognized node kind (caller error, never retried)
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}

impl DegreesError {
    /// Whether redelivering the failed relaxation can succeed.
    ///
    /// Infrastructure failures (store, provider, dispatcher) are transient
    /// and the relaxation call is idempotent, so the dispatcher should
    /// redeliver. Caller and configuration errors will fail identically on
    /// every delivery.
    pub fn is_retryable(&self) -> bool {
        match self {
            DegreesError::Database(_)
            | DegreesError::Io(_)
            | DegreesError::Provider(_)
            | DegreesError::Dispatch(_) => true,
            DegreesError::Config(_) | DegreesError::InvalidNode(_) => false,
        }
    }
}

/// Convenient Result type using DegreesError
pub type Result<T> = std::result::Result<T, DegreesError>;
