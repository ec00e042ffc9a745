use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

use super::record::DecodeError;
use super::store::StoreError;

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("fast store unavailable: {0}")]
    BackendUnavailable(#[source] StoreError),
    #[error("inconsistent input: {message}")]
    InconsistentInput { message: String },
    #[error("persistent store failure: {0}")]
    Persistence(#[source] RepoError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("`{operation}` exceeded its deadline")]
    Timeout { operation: &'static str },
}

impl EngineError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentInput {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => Self::Timeout {
                operation: "fast_store",
            },
            other => Self::BackendUnavailable(other),
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Timeout => Self::Timeout {
                operation: "persistent_store",
            },
            other => Self::Persistence(other),
        }
    }
}
