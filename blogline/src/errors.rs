use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by blogline operations.
#[derive(Debug, Error)]
pub enum BlogError {
    /// A required field was empty or malformed. Raised before any network call.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The action needs a signed-in user and there is no session.
    #[error("you must be signed in to {action}")]
    Unauthenticated { action: &'static str },

    /// The client-side ownership check rejected the action.
    #[error("not allowed to {action}")]
    Forbidden { action: &'static str },

    /// A lookup matched no record.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The backend rejected the call.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Anything that does not match the backend's expected error shape.
    #[error("unexpected error: {message}")]
    Unexpected { message: Cow<'static, str> },
}

impl BlogError {
    pub fn backend(operation: &'static str, source: BackendError) -> Self {
        Self::Backend { operation, source }
    }

    pub fn unexpected(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Message suitable for showing to the person who triggered the operation.
    ///
    /// Unexpected errors are logged here and replaced with a generic message.
    pub fn user_message(&self) -> String {
        match self {
            BlogError::Validation(err) => {
                let mut messages: Vec<&str> = err.issues.iter().map(|issue| issue.message.as_str()).collect();
                messages.dedup();
                messages.join(" ")
            }
            BlogError::Backend { source, .. } => source.message.clone(),
            BlogError::Unexpected { message } => {
                log::error!("unexpected error: {message}");
                "An unexpected error occurred. Please try again.".to_string()
            }
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BlogError::Validation(_))
    }
}

/// A call the backend refused or could not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP-style status, when the backend reported one.
    pub status: Option<u16>,
    /// Backend-specific error code (e.g. `23503`, `invalid_credentials`).
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Some(401), message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(Some(403), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Some(409), message)
    }

    /// The request never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// Collection of validation issues found while preparing a request.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

/// Detailed validation failure for a single field.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn required(field: &str, message: impl Into<String>) -> Self {
        Self::new(field, "validation.required", message)
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects `required` issues for every blank value.
pub(crate) fn require_non_blank(fields: &[(&str, &str, &str)]) -> ValidationResult<()> {
    let issues: Vec<ValidationIssue> = fields
        .iter()
        .filter(|(_, value, _)| value.trim().is_empty())
        .map(|(field, _, message)| ValidationIssue::required(field, *message))
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues))
    }
}
