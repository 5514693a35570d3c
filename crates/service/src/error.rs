use repository::RepositoryError;
use thiserror::Error;

/// The main error type for every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// The operation is not allowed from the entity's current state.
    #[error("{0}")]
    InvalidState(String),
    /// The operation is redundant or clashes with existing data.
    #[error("{0}")]
    Conflict(String),
    /// The caller may not act on this entity.
    #[error("{0}")]
    Forbidden(String),
    /// A product cannot cover the requested quantity.
    #[error("Insufficient stock for {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: String,
        available: i32,
        requested: i32,
    },
    /// Malformed input.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Bad credentials or missing caller identity.
    #[error("{0}")]
    Unauthorized(String),
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(RepositoryError),
    /// Some unexpected or unhandled error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            RepositoryError::NotFound => ServiceError::NotFound("record".into()),
            other => ServiceError::Db(other),
        }
    }
}

pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> ServiceError {
    ServiceError::NotFound(format!("{what} {id}"))
}

pub(crate) fn invalid(msg: impl Into<String>) -> ServiceError {
    ServiceError::InvalidState(msg.into())
}

pub(crate) fn conflict(msg: impl Into<String>) -> ServiceError {
    ServiceError::Conflict(msg.into())
}
