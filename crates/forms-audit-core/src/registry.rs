//! Event-type comparator registry.
//!
//! Maps each event kind to the rule that decides whether a record of that
//! kind reflects an observable change. Kinds missing from the registry are
//! treated as changes, so new event kinds show up in timelines before the
//! registry learns about them.

use crate::record::AuditEventType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A pair of dotted paths into a record's `data` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPair {
    /// Path of the value before the change (e.g. `changes.previous.title`).
    pub previous: String,
    /// Path of the value after the change (e.g. `changes.new.title`).
    pub new: String,
}

impl FieldPair {
    pub fn new(previous: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            previous: previous.into(),
            new: new.into(),
        }
    }

    /// Pair for `changes.previous.<field>` / `changes.new.<field>`.
    pub fn change(field: &str) -> Self {
        Self::new(
            format!("changes.previous.{field}"),
            format!("changes.new.{field}"),
        )
    }

    /// Resolve both sides against a payload. Missing values resolve to `None`.
    pub fn resolve<'a>(&self, data: &'a Value) -> (Option<&'a Value>, Option<&'a Value>) {
        (lookup_path(data, &self.previous), lookup_path(data, &self.new))
    }
}

/// Rule deciding whether a record is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Comparator {
    /// The event always represents a change.
    NoComparisonNeeded,
    /// The event is a change when the two values differ.
    FieldPath(FieldPair),
    /// The event is a change when any field has a new non-empty value that
    /// differs from its previous one.
    MultiField { fields: Vec<FieldPair> },
}

/// Registry of comparators keyed by event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparatorRegistry {
    comparators: HashMap<AuditEventType, Comparator>,
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::forms_default()
    }
}

impl ComparatorRegistry {
    /// A registry without entries; every record passes the no-op filter.
    pub fn empty() -> Self {
        Self {
            comparators: HashMap::new(),
        }
    }

    /// The forms platform's registry.
    pub fn forms_default() -> Self {
        use AuditEventType::*;

        let mut registry = Self::empty();

        for event_type in [
            FormCreated,
            FormUpdated,
            FormLiveCreatedFromDraft,
            FormDraftCreatedFromLive,
            FormDraftDeleted,
            FormMigrated,
            FormJsonUploaded,
            FormJsonDownloaded,
        ] {
            registry.insert(event_type, Comparator::NoComparisonNeeded);
        }

        for (event_type, field) in [
            (FormTitleUpdated, "title"),
            (FormOrganisationUpdated, "organisation"),
            (FormTeamNameUpdated, "teamName"),
            (FormTeamEmailUpdated, "teamEmail"),
            (FormNotificationEmailUpdated, "notificationEmail"),
            (FormPrivacyNoticeUpdated, "privacyNoticeUrl"),
            (FormSubmissionGuidanceUpdated, "submissionGuidance"),
            (FormWhatHappensNextUpdated, "whatHappensNext"),
            (FormSlugUpdated, "slug"),
        ] {
            registry.insert(event_type, Comparator::FieldPath(FieldPair::change(field)));
        }

        registry.insert(
            FormSupportContactUpdated,
            Comparator::MultiField {
                fields: [
                    "contact.phone",
                    "contact.email.address",
                    "contact.email.responseTime",
                    "contact.online.url",
                    "contact.online.text",
                ]
                .into_iter()
                .map(FieldPair::change)
                .collect(),
            },
        );

        registry
    }

    /// Add or replace the comparator for an event kind.
    pub fn insert(&mut self, event_type: AuditEventType, comparator: Comparator) {
        self.comparators.insert(event_type, comparator);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, event_type: AuditEventType, comparator: Comparator) -> Self {
        self.insert(event_type, comparator);
        self
    }

    /// Look up the comparator for an event kind.
    pub fn resolve(&self, event_type: AuditEventType) -> Option<&Comparator> {
        self.comparators.get(&event_type)
    }

    pub fn len(&self) -> usize {
        self.comparators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }
}

/// Resolve a dotted path (`a.b.c`) inside a JSON value.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
