use thiserror::Error;

/// Failure taxonomy for store operations. Handlers in tandem-api map each
/// variant onto an HTTP status, so messages here are written to be shown
/// to the caller as-is.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed input, or an operation the domain rules reject.
    #[error("{0}")]
    Invalid(String),

    /// The actor is known but not allowed to perform this action.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness rule was violated (duplicate email, duplicate request).
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::Invalid(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        StoreError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Conflict(msg.into())
    }
}
