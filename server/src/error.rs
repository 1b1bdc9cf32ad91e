//! Shared error types for the GateHub server.
//!
//! Each pipeline stage owns its failure enum next to its code
//! ([`ExtractError`](crate::extract::ExtractError) in `extract`,
//! [`PersistenceError`](crate::storage::PersistenceError) in `storage`,
//! [`AttachmentError`](crate::attachments::AttachmentError) in
//! `attachments`, `ConfigError` in `config`). This module holds the pieces
//! that cross module boundaries: the validation failure produced by the
//! normalizer and the JSON error body the HTTP layer returns.

use serde::Serialize;
use thiserror::Error;

/// One invalid or missing field reported by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `AccessControllerEvent.majorEventType`.
    pub field: String,

    /// Why the field was rejected.
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validation failure enumerating every offending field, not just the first.
///
/// A payload is never partially accepted: one `ValidationError` means no
/// canonical event was produced and nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("event validation failed for {} field(s)", fields.len())]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub fn new(fields: Vec<FieldError>) -> Self {
        Self { fields }
    }

    /// Returns `true` if the given field path is among the reported errors.
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            fields: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.fields = Some(fields);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_counts_fields() {
        let err = ValidationError::new(vec![
            FieldError::new("dateTime", "missing"),
            FieldError::new("deviceID", "missing"),
        ]);
        assert_eq!(err.to_string(), "event validation failed for 2 field(s)");
    }

    #[test]
    fn validation_error_mentions_reported_fields() {
        let err = ValidationError::new(vec![FieldError::new("dateTime", "missing")]);
        assert!(err.mentions("dateTime"));
        assert!(!err.mentions("deviceID"));
    }

    #[test]
    fn error_response_serializes_without_optional_parts() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert!(json.contains("boom"));
        assert!(!json.contains("code"));
        assert!(!json.contains("fields"));
    }

    #[test]
    fn error_response_serializes_code_and_fields() {
        let response = ErrorResponse::new("invalid")
            .with_code("validation_failed")
            .with_fields(vec![FieldError::new("dateTime", "missing")]);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("validation_failed"));
        assert!(json.contains("dateTime"));
    }
}
