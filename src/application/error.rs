use thiserror::Error;

use crate::{cache::EngineError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::cache::StoreError;

    #[test]
    fn engine_errors_stay_transparent() {
        let error = AppError::from(EngineError::BackendUnavailable(StoreError::unavailable(
            "connection refused",
        )));

        assert!(matches!(error, AppError::Engine(_)));
        let inner = error.source().expect("store error source");
        assert!(inner.to_string().contains("connection refused"));
    }

    #[test]
    fn validation_message_is_prefixed() {
        let error = AppError::validation("bad cron");
        assert_eq!(error.to_string(), "validation failed: bad cron");
    }
}
