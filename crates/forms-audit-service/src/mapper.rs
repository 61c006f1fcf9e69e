//! Queue message mapping and validation.
//!
//! Turns a raw queue envelope into an [`AuditRecordInput`]. The body is
//! checked against the embedded audit message JSON schema, collecting every
//! violation rather than stopping at the first, then deserialized into the
//! typed message, which drops unknown fields.

use chrono::{DateTime, Utc};
use forms_audit_core::{AuditMessage, AuditRecordInput};
use forms_audit_store::QueueMessage;
use jsonschema::Validator;
use serde_json::Value;

use crate::error::{AuditError, ValidationErrors, Violation};

/// JSON schema for audit message bodies.
pub const MESSAGE_SCHEMA: &str = include_str!("../schemas/audit-message.schema.json");

/// Validates queue message bodies and maps them to audit records.
pub struct MessageMapper {
    validator: Validator,
}

impl MessageMapper {
    /// Compile the embedded message schema.
    pub fn new() -> Result<Self, AuditError> {
        let schema: Value =
            serde_json::from_str(MESSAGE_SCHEMA).map_err(|e| AuditError::Schema(e.to_string()))?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| AuditError::Schema(e.to_string()))?;

        Ok(Self { validator })
    }

    /// Check a body against the schema, returning every violation.
    pub fn validate(&self, body: &Value) -> Result<(), ValidationErrors> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(body)
            .map(|error| Violation::new(error.instance_path().to_string(), error.to_string()))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(violations))
        }
    }

    /// Parse, unwrap, validate and deserialize a message body.
    pub fn parse_body(&self, body: &str) -> Result<AuditMessage, AuditError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            AuditError::Validation(ValidationErrors::single(
                "",
                format!("body is not valid JSON: {e}"),
            ))
        })?;
        let value = unwrap_notification(value)?;

        self.validate(&value).map_err(AuditError::Validation)?;

        serde_json::from_value(value)
            .map_err(|e| AuditError::Validation(ValidationErrors::single("", e.to_string())))
    }

    /// Map a queue message, stamping it with the current time.
    pub fn map(&self, message: &QueueMessage) -> Result<AuditRecordInput, AuditError> {
        self.map_at(message, Utc::now())
    }

    /// Map a queue message, stamping it with `received_at`.
    pub fn map_at(
        &self,
        message: &QueueMessage,
        received_at: DateTime<Utc>,
    ) -> Result<AuditRecordInput, AuditError> {
        let message_id = message
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuditError::MissingField("MessageId"))?;

        let body = message
            .body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .ok_or(AuditError::MissingField("Body"))?;

        let parsed = self.parse_body(body)?;
        Ok(AuditRecordInput::new(message_id, parsed, received_at))
    }
}

/// Bodies delivered through a notification topic without raw delivery arrive
/// as `{"Type": "Notification", "Message": "<json>"}`.
fn unwrap_notification(value: Value) -> Result<Value, AuditError> {
    let inner = value
        .get("Message")
        .and_then(Value::as_str)
        .filter(|_| value.get("entityId").is_none())
        .map(str::to_owned);

    match inner {
        Some(inner) => serde_json::from_str(&inner).map_err(|e| {
            AuditError::Validation(ValidationErrors::single(
                "/Message",
                format!("notification message is not valid JSON: {e}"),
            ))
        }),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use forms_audit_core::{AuditEventCategory, AuditEventType};
    use serde_json::json;

    fn title_updated() -> Value {
        json!({
            "entityId": "689b7ab1d0eeac9711a7fb33",
            "category": "FORM",
            "type": "FORM_TITLE_UPDATED",
            "schemaVersion": 1,
            "source": "FORMS_MANAGER",
            "createdAt": "2025-07-23T10:00:00.000Z",
            "createdBy": {
                "id": "83f09a7d-c80c-4e15-bcf3-641559c7b8a7",
                "displayName": "Enrique Chase"
            },
            "data": {
                "formId": "689b7ab1d0eeac9711a7fb33",
                "slug": "audit-form",
                "changes": {
                    "previous": { "title": "Old title" },
                    "new": { "title": "New title" }
                }
            },
            "messageCreatedAt": "2025-07-23T10:00:01.000Z"
        })
    }

    fn envelope(body: &Value) -> QueueMessage {
        QueueMessage::new("31cb6fff-8317-412e-8488-308d099034c4", body.to_string(), "receipt")
    }

    #[test]
    fn test_maps_valid_message() {
        let mapper = MessageMapper::new().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 7, 23, 10, 0, 5).unwrap();

        let record = mapper.map_at(&envelope(&title_updated()), now).unwrap();

        assert_eq!(record.message_id, "31cb6fff-8317-412e-8488-308d099034c4");
        assert_eq!(record.entity_id(), "689b7ab1d0eeac9711a7fb33");
        assert_eq!(record.message.category, AuditEventCategory::Form);
        assert_eq!(record.message.event_type, AuditEventType::FormTitleUpdated);
        assert_eq!(record.message.created_by.display_name, "Enrique Chase");
        assert_eq!(record.record_created_at, now);
    }

    #[test]
    fn test_mapping_is_deterministic_apart_from_receive_time() {
        let mapper = MessageMapper::new().unwrap();
        let message = envelope(&title_updated());
        let first = Utc.with_ymd_and_hms(2025, 7, 23, 10, 0, 5).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 7, 23, 11, 0, 0).unwrap();

        let a = mapper.map_at(&message, first).unwrap();
        let mut b = mapper.map_at(&message, second).unwrap();

        assert_ne!(a, b);
        b.record_created_at = first;
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_fields_are_stripped() {
        let mapper = MessageMapper::new().unwrap();
        let mut body = title_updated();
        body["unexpected"] = json!("value");

        let record = mapper.map(&envelope(&body)).unwrap();
        let serialized = serde_json::to_value(&record).unwrap();
        assert!(serialized.get("unexpected").is_none());
    }

    #[test]
    fn test_collects_every_violation() {
        let mapper = MessageMapper::new().unwrap();
        let mut body = title_updated();
        body.as_object_mut().unwrap().remove("entityId");
        body["category"] = json!("NOT_A_CATEGORY");
        body["createdAt"] = json!("yesterday");

        let err = mapper.map(&envelope(&body)).unwrap_err();
        let AuditError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.len() >= 3, "got {errors}");
        assert!(errors.iter().any(|v| v.path == "/category"));
        assert!(errors.iter().any(|v| v.path == "/createdAt"));
        assert!(errors.iter().any(|v| v.path == "(root)"));
    }

    #[test]
    fn test_change_events_require_changes_payload() {
        let mapper = MessageMapper::new().unwrap();
        let mut body = title_updated();
        body.as_object_mut().unwrap().remove("data");

        let err = mapper.map(&envelope(&body)).unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
    }

    #[test]
    fn test_missing_id_and_empty_body() {
        let mapper = MessageMapper::new().unwrap();

        let no_id = QueueMessage {
            id: None,
            body: Some(title_updated().to_string()),
            receipt_handle: Some("receipt".to_string()),
        };
        assert!(matches!(
            mapper.map(&no_id).unwrap_err(),
            AuditError::MissingField("MessageId")
        ));

        let empty_body = QueueMessage::new("id", "", "receipt");
        assert!(matches!(
            mapper.map(&empty_body).unwrap_err(),
            AuditError::MissingField("Body")
        ));
    }

    #[test]
    fn test_invalid_json_body_is_validation_error() {
        let mapper = MessageMapper::new().unwrap();
        let message = QueueMessage::new("id", "hello world", "receipt");

        let err = mapper.map(&message).unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_unwraps_notification_envelope() {
        let mapper = MessageMapper::new().unwrap();
        let notification = json!({
            "Type": "Notification",
            "MessageId": "b1f1c1d0",
            "Message": title_updated().to_string()
        });

        let record = mapper.map(&envelope(&notification)).unwrap();
        assert_eq!(record.message.event_type, AuditEventType::FormTitleUpdated);
    }
}
