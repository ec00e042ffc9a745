use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed for `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("article content is {size} bytes, limit is {limit}")]
    ContentTooLarge { size: usize, limit: usize },
    #[error("id generator exhausted its time range")]
    IdsExhausted,
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
