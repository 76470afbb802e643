use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tessera_core::{Error, EventKind, Facility, FacilityContext};

use crate::error::{StoreError, StoreResult};

/// One recorded scan attempt, granted or denied.
///
/// Maps to the `access_events` table. Rows are append-only: events are never
/// updated or individually deleted, only purged in bulk by retention jobs or
/// removed by student-delete cascade.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: i64,

    /// Resolved student, or `None` when the tag matched nobody
    pub student_id: Option<i64>,

    /// The identifier exactly as scanned, kept even for unresolved tags
    pub tag_id: String,

    /// Facility name, see [`Facility::as_str`]
    pub facility: String,

    /// Facility instance (hostel id), where one exists
    pub instance: Option<String>,

    /// "entry" or "exit"
    pub kind: String,

    pub granted: bool,

    /// Denial reason; `None` for granted events
    pub deny_reason: Option<String>,

    /// Server-assigned at insert; the authoritative ordering key
    pub created_at: DateTime<Utc>,
}

impl AccessEvent {
    /// Parse the stored kind column.
    ///
    /// # Errors
    /// Returns `CorruptRow` if the column holds an unknown value, which can
    /// only happen if the schema CHECK constraint was bypassed.
    pub fn kind(&self) -> StoreResult<EventKind> {
        self.kind
            .parse()
            .map_err(|e: Error| StoreError::CorruptRow(e.to_string()))
    }

    /// Parse the stored facility column.
    pub fn facility(&self) -> StoreResult<Facility> {
        self.facility
            .parse()
            .map_err(|e: Error| StoreError::CorruptRow(e.to_string()))
    }

    /// Whether this event belongs to the given facility context.
    ///
    /// Both facility and instance must match; a campus event never matches a
    /// hostel context and an event at hostel BH-2 never matches BH-3.
    #[must_use]
    pub fn matches_context(&self, context: &FacilityContext) -> bool {
        self.facility == context.facility.as_str() && self.instance == context.instance
    }
}

/// Fields for inserting a new access event.
///
/// `id` and `created_at` are server-assigned on insert, so inserts take this
/// struct rather than a placeholder-filled [`AccessEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessEvent {
    pub student_id: Option<i64>,
    pub tag_id: String,
    pub facility: String,
    pub instance: Option<String>,
    pub kind: String,
    pub granted: bool,
    pub deny_reason: Option<String>,
}

impl NewAccessEvent {
    /// Event fields for a scan evaluated against the given context.
    #[must_use]
    pub fn new(
        student_id: Option<i64>,
        tag_id: impl Into<String>,
        context: &FacilityContext,
        kind: EventKind,
        granted: bool,
        deny_reason: Option<String>,
    ) -> Self {
        Self {
            student_id,
            tag_id: tag_id.into(),
            facility: context.facility.as_str().to_string(),
            instance: context.instance.clone(),
            kind: kind.as_str().to_string(),
            granted,
            deny_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(facility: &str, instance: Option<&str>) -> AccessEvent {
        AccessEvent {
            id: 1,
            student_id: Some(7),
            tag_id: "04AB12CD".to_string(),
            facility: facility.to_string(),
            instance: instance.map(str::to_string),
            kind: "entry".to_string(),
            granted: true,
            deny_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_parses() {
        let event = event_at("campus", None);
        assert_eq!(event.kind().unwrap(), EventKind::Entry);
    }

    #[test]
    fn test_corrupt_kind_is_error() {
        let mut event = event_at("campus", None);
        event.kind = "sideways".to_string();
        assert!(matches!(event.kind(), Err(StoreError::CorruptRow(_))));
    }

    #[test]
    fn test_matches_context_facility_and_instance() {
        let campus = event_at("campus", None);
        assert!(campus.matches_context(&FacilityContext::campus()));
        assert!(!campus.matches_context(&FacilityContext::library()));

        let hostel = event_at("hostel", Some("BH-2"));
        assert!(hostel.matches_context(&FacilityContext::hostel("BH-2")));
        assert!(!hostel.matches_context(&FacilityContext::hostel("BH-3")));
        assert!(!hostel.matches_context(&FacilityContext::campus()));
    }

    #[test]
    fn test_new_event_from_context() {
        let event = NewAccessEvent::new(
            Some(7),
            "04AB12CD",
            &FacilityContext::hostel("BH-2"),
            EventKind::Exit,
            true,
            None,
        );

        assert_eq!(event.facility, "hostel");
        assert_eq!(event.instance.as_deref(), Some("BH-2"));
        assert_eq!(event.kind, "exit");
        assert!(event.granted);
    }
}
