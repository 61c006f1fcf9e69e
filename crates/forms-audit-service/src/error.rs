//! Error types for the audit service.

use forms_audit_core::PaginationError;
use forms_audit_store::StoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer into the message body, `(root)` for the body itself.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() {
                "(root)".to_string()
            } else {
                path
            },
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every violation found in one message body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<Violation>);

impl ValidationErrors {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![Violation::new(path, message)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", joined.join("; "))
    }
}

/// Whether an error is the caller's fault or the service's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

/// Errors that can occur in the audit service.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The message body does not match the audit message schema.
    #[error("invalid audit message: {0}")]
    Validation(ValidationErrors),

    /// The queue envelope lacks a required field.
    #[error("unexpected missing Message.{0}")]
    MissingField(&'static str),

    /// A record for the message ID already exists.
    #[error("audit record for message {message_id} already exists")]
    Conflict { message_id: String },

    /// A store operation failed and may succeed on retry.
    #[error("store error: {0}")]
    TransientStore(StoreError),

    /// A cache operation failed. Never surfaced to callers.
    #[error("cache error: {0}")]
    Cache(String),

    /// Malformed page request.
    #[error(transparent)]
    Pagination(#[from] PaginationError),

    /// The embedded message schema failed to compile.
    #[error("invalid message schema: {0}")]
    Schema(String),
}

impl AuditError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::MissingField(_) | Self::Pagination(_) => ErrorClass::Client,
            Self::Conflict { .. } => ErrorClass::Client,
            Self::TransientStore(_) | Self::Cache(_) | Self::Schema(_) => ErrorClass::Server,
        }
    }

    /// Whether redelivering the same message can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::MissingField(_) | Self::Conflict { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn cache(err: StoreError) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<StoreError> for AuditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { message_id } => Self::Conflict { message_id },
            other => Self::TransientStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: AuditError = StoreError::Conflict {
            message_id: "m1".to_string(),
        }
        .into();

        assert!(err.is_conflict());
        assert!(err.is_permanent());
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[test]
    fn test_other_store_errors_are_transient() {
        let err: AuditError = StoreError::LockError.into();
        assert!(matches!(err, AuditError::TransientStore(_)));
        assert!(!err.is_permanent());
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn test_missing_field_message() {
        let err = AuditError::MissingField("MessageId");
        assert_eq!(err.to_string(), "unexpected missing Message.MessageId");
    }

    #[test]
    fn test_validation_errors_display() {
        let errors = ValidationErrors(vec![
            Violation::new("", "\"entityId\" is a required property"),
            Violation::new("/category", "\"FOO\" is not one of [\"FORM\",\"ENTITLEMENT\"]"),
        ]);
        let text = errors.to_string();
        assert!(text.starts_with("(root): "));
        assert!(text.contains("; /category: "));
    }
}
