//! Article and link input validation.

use crate::domain::error::DomainError;

pub const MAX_TITLE_CHARS: usize = 30;
pub const MAX_TAG_CHARS: usize = 20;
pub const MAX_DESCRIPTION_CHARS: usize = 200;
pub const MAX_LINK_NAME_CHARS: usize = 50;
/// Upper bound on stored article content, in bytes.
pub const MAX_CONTENT_BYTES: usize = 64 << 10;

/// Article fields as submitted by an author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub description: String,
    pub content: String,
    pub tag_name: String,
}

impl ArticleDraft {
    /// Trims text fields and checks them against the storage limits.
    pub fn validated(self) -> Result<Self, DomainError> {
        let draft = Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            content: self.content,
            tag_name: self.tag_name.trim().to_string(),
        };

        require_text("title", &draft.title, MAX_TITLE_CHARS)?;
        require_text("tag_name", &draft.tag_name, MAX_TAG_CHARS)?;
        if draft.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(DomainError::validation(
                "description",
                format!("must be at most {MAX_DESCRIPTION_CHARS} characters"),
            ));
        }
        if draft.content.len() > MAX_CONTENT_BYTES {
            return Err(DomainError::ContentTooLarge {
                size: draft.content.len(),
                limit: MAX_CONTENT_BYTES,
            });
        }
        Ok(draft)
    }
}

/// Link fields as submitted by an author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDraft {
    pub name: String,
    pub url: String,
}

impl LinkDraft {
    pub fn validated(self) -> Result<Self, DomainError> {
        let draft = Self {
            name: self.name.trim().to_string(),
            url: self.url.trim().to_string(),
        };
        require_text("name", &draft.name, MAX_LINK_NAME_CHARS)?;
        if !(draft.url.starts_with("http://") || draft.url.starts_with("https://")) {
            return Err(DomainError::validation(
                "url",
                "must be an absolute http(s) URL",
            ));
        }
        Ok(draft)
    }
}

/// Validates a tag name used by reclassification or tag lookups.
pub fn validate_tag_name(name: &str) -> Result<&str, DomainError> {
    let name = name.trim();
    require_text("tag_name", name, MAX_TAG_CHARS)?;
    Ok(name)
}

fn require_text(field: &'static str, value: &str, max_chars: usize) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::validation(field, "cannot be empty"));
    }
    if value.chars().count() > max_chars {
        return Err(DomainError::validation(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ArticleDraft {
        ArticleDraft {
            title: "  Hello  ".to_string(),
            description: "short".to_string(),
            content: "body".to_string(),
            tag_name: "rust".to_string(),
        }
    }

    #[test]
    fn draft_is_trimmed() {
        let validated = draft().validated().expect("valid draft");
        assert_eq!(validated.title, "Hello");
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut input = draft();
        input.title = "   ".to_string();
        assert!(matches!(
            input.validated(),
            Err(DomainError::Validation { field: "title", .. })
        ));
    }

    #[test]
    fn title_limit_counts_characters() {
        let mut input = draft();
        input.title = "é".repeat(MAX_TITLE_CHARS);
        assert!(input.validated().is_ok());
    }

    #[test]
    fn oversized_content_is_rejected() {
        let mut input = draft();
        input.content = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(matches!(
            input.validated(),
            Err(DomainError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn link_requires_http_url() {
        let link = LinkDraft {
            name: "docs".to_string(),
            url: "ftp://example.com".to_string(),
        };
        assert!(link.validated().is_err());
    }
}
