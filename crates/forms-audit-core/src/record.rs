//! Audit record types.
//!
//! An audit record describes one event raised against a tracked entity
//! (usually a form). Records are append-only: once persisted they are never
//! mutated, and every derived view (consolidated timelines, cache rows) can
//! be rebuilt from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventCategory {
    /// Events raised against a form.
    Form,
    /// Events raised against a user's entitlements.
    Entitlement,
}

impl AuditEventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "FORM",
            Self::Entitlement => "ENTITLEMENT",
        }
    }
}

impl std::fmt::Display for AuditEventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System that emitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventSource {
    FormsManager,
    Entitlement,
}

/// Kind of audit event.
///
/// The set is closed: messages carrying any other type fail validation.
/// Not every kind is known to the comparator registry; kinds that are not
/// registered pass the no-op filter untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    // ===== Lifecycle =====
    FormCreated,
    /// A draft definition was replaced. The only kind that consolidates.
    FormUpdated,
    FormLiveCreatedFromDraft,
    FormDraftCreatedFromLive,
    FormDraftDeleted,
    FormMigrated,
    FormJsonUploaded,
    FormJsonDownloaded,

    // ===== Metadata field changes =====
    FormTitleUpdated,
    FormOrganisationUpdated,
    FormTeamNameUpdated,
    FormTeamEmailUpdated,
    FormNotificationEmailUpdated,
    FormPrivacyNoticeUpdated,
    FormSubmissionGuidanceUpdated,
    FormWhatHappensNextUpdated,
    FormSlugUpdated,
    FormTermsAndConditionsAgreed,
    FormSupportContactUpdated,

    // ===== Reporting =====
    FormSubmissionExcelRequested,
    FormCsatExcelRequested,
    FormsBackupRequested,
}

impl AuditEventType {
    /// Every event kind, in declaration order.
    pub const ALL: [AuditEventType; 22] = [
        Self::FormCreated,
        Self::FormUpdated,
        Self::FormLiveCreatedFromDraft,
        Self::FormDraftCreatedFromLive,
        Self::FormDraftDeleted,
        Self::FormMigrated,
        Self::FormJsonUploaded,
        Self::FormJsonDownloaded,
        Self::FormTitleUpdated,
        Self::FormOrganisationUpdated,
        Self::FormTeamNameUpdated,
        Self::FormTeamEmailUpdated,
        Self::FormNotificationEmailUpdated,
        Self::FormPrivacyNoticeUpdated,
        Self::FormSubmissionGuidanceUpdated,
        Self::FormWhatHappensNextUpdated,
        Self::FormSlugUpdated,
        Self::FormTermsAndConditionsAgreed,
        Self::FormSupportContactUpdated,
        Self::FormSubmissionExcelRequested,
        Self::FormCsatExcelRequested,
        Self::FormsBackupRequested,
    ];

    /// Wire name of the event kind (e.g. `FORM_UPDATED`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormCreated => "FORM_CREATED",
            Self::FormUpdated => "FORM_UPDATED",
            Self::FormLiveCreatedFromDraft => "FORM_LIVE_CREATED_FROM_DRAFT",
            Self::FormDraftCreatedFromLive => "FORM_DRAFT_CREATED_FROM_LIVE",
            Self::FormDraftDeleted => "FORM_DRAFT_DELETED",
            Self::FormMigrated => "FORM_MIGRATED",
            Self::FormJsonUploaded => "FORM_JSON_UPLOADED",
            Self::FormJsonDownloaded => "FORM_JSON_DOWNLOADED",
            Self::FormTitleUpdated => "FORM_TITLE_UPDATED",
            Self::FormOrganisationUpdated => "FORM_ORGANISATION_UPDATED",
            Self::FormTeamNameUpdated => "FORM_TEAM_NAME_UPDATED",
            Self::FormTeamEmailUpdated => "FORM_TEAM_EMAIL_UPDATED",
            Self::FormNotificationEmailUpdated => "FORM_NOTIFICATION_EMAIL_UPDATED",
            Self::FormPrivacyNoticeUpdated => "FORM_PRIVACY_NOTICE_UPDATED",
            Self::FormSubmissionGuidanceUpdated => "FORM_SUBMISSION_GUIDANCE_UPDATED",
            Self::FormWhatHappensNextUpdated => "FORM_WHAT_HAPPENS_NEXT_UPDATED",
            Self::FormSlugUpdated => "FORM_SLUG_UPDATED",
            Self::FormTermsAndConditionsAgreed => "FORM_TERMS_AND_CONDITIONS_AGREED",
            Self::FormSupportContactUpdated => "FORM_SUPPORT_CONTACT_UPDATED",
            Self::FormSubmissionExcelRequested => "FORM_SUBMISSION_EXCEL_REQUESTED",
            Self::FormCsatExcelRequested => "FORM_CSAT_EXCEL_REQUESTED",
            Self::FormsBackupRequested => "FORMS_BACKUP_REQUESTED",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of an audited change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUser {
    pub id: String,
    pub display_name: String,
}

impl AuditUser {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Validated body of an audit queue message.
///
/// Unknown fields are dropped on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMessage {
    pub category: AuditEventCategory,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub schema_version: u32,
    pub source: AuditEventSource,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: AuditUser,
    /// Type-dependent payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message_created_at: DateTime<Utc>,
}

/// An audit record ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecordInput {
    /// Queue message ID, the deduplication key.
    pub message_id: String,
    #[serde(flatten)]
    pub message: AuditMessage,
    /// When this service received the message.
    pub record_created_at: DateTime<Utc>,
}

impl AuditRecordInput {
    pub fn new(
        message_id: impl Into<String>,
        message: AuditMessage,
        record_created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            message,
            record_created_at,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.message.entity_id
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned identifier.
    pub id: String,
    #[serde(flatten)]
    pub input: AuditRecordInput,
}

impl AuditRecord {
    pub fn new(id: impl Into<String>, input: AuditRecordInput) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.input.message_id
    }

    pub fn entity_id(&self) -> &str {
        &self.input.message.entity_id
    }

    pub fn event_type(&self) -> AuditEventType {
        self.input.message.event_type
    }

    pub fn category(&self) -> AuditEventCategory {
        self.input.message.category
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.input.message.created_at
    }

    pub fn created_by(&self) -> &AuditUser {
        &self.input.message.created_by
    }

    /// Payload, treating an explicit JSON `null` the same as an absent one.
    pub fn data(&self) -> Option<&Value> {
        self.input.message.data.as_ref().filter(|v| !v.is_null())
    }
}

/// Span covered by a run of merged records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consolidation {
    pub consolidated_count: usize,
    /// Oldest `createdAt` in the run.
    pub consolidated_from: DateTime<Utc>,
    /// Newest `createdAt` in the run.
    pub consolidated_to: DateTime<Utc>,
}

/// An entry of the consolidated timeline.
///
/// Serializes exactly like an [`AuditRecord`] unless more than one record
/// was merged into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAuditRecord {
    #[serde(flatten)]
    pub record: AuditRecord,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub consolidation: Option<Consolidation>,
}

impl ConsolidatedAuditRecord {
    /// Wraps a representative record; the span is kept only for real merges.
    pub fn new(record: AuditRecord, consolidation: Consolidation) -> Self {
        let consolidation = (consolidation.consolidated_count > 1).then_some(consolidation);
        Self {
            record,
            consolidation,
        }
    }

    pub fn single(record: AuditRecord) -> Self {
        Self {
            record,
            consolidation: None,
        }
    }

    pub fn consolidated_count(&self) -> usize {
        self.consolidation
            .map(|c| c.consolidated_count)
            .unwrap_or(1)
    }
}
