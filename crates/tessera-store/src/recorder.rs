//! Event recording.
//!
//! The recorder is the single write path into the access event log. Every
//! evaluated scan is recorded, granted or denied, resolved or not; the
//! durable write completes before the caller sees the event, and live
//! subscribers are notified only after that write.

use tracing::info;

use tessera_core::{Decision, FacilityContext};

use crate::error::{StoreError, StoreResult};
use crate::models::{AccessEvent, NewAccessEvent};
use crate::repositories::{AccessEventRepository, SqliteAccessEventRepository};
use crate::resolver::Resolution;
use crate::subscriptions::{EventQuery, EventSubscription, SubscriptionManager};

/// Append-only writer and query surface for the access event log.
pub struct EventRecorder {
    events: SqliteAccessEventRepository,
    subscriptions: SubscriptionManager,
}

impl EventRecorder {
    /// Create a recorder over the given pool with its own subscription hub.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self::with_subscriptions(pool, SubscriptionManager::new())
    }

    /// Create a recorder sharing an existing subscription hub.
    pub fn with_subscriptions(pool: sqlx::SqlitePool, subscriptions: SubscriptionManager) -> Self {
        Self {
            events: SqliteAccessEventRepository::new(pool),
            subscriptions,
        }
    }

    /// Record one evaluated scan.
    ///
    /// Returns the stored event, including the server-assigned id and
    /// timestamp, only after the write is durable. Subscribers are notified
    /// after the write; a caller reporting "granted" on return is therefore
    /// never ahead of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or the read-back fails. On error
    /// nothing is published.
    pub async fn record(
        &self,
        resolution: &Resolution,
        context: &FacilityContext,
        decision: &Decision,
    ) -> StoreResult<AccessEvent> {
        let new_event = NewAccessEvent::new(
            resolution.student.as_ref().map(|s| s.id),
            &resolution.tag_id,
            context,
            decision.kind,
            decision.is_granted(),
            decision.reason.clone(),
        );

        let id = self.events.create(&new_event).await?;
        let stored = self
            .events
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "access_event".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })?;

        info!(
            event_id = stored.id,
            tag_id = %stored.tag_id,
            context = %context,
            granted = stored.granted,
            "Recorded access event"
        );
        self.subscriptions.publish(&stored);

        Ok(stored)
    }

    /// Recent events for a student, newest first, optionally narrowed to one
    /// facility context.
    pub async fn recent_events_for(
        &self,
        student_id: i64,
        context: Option<&FacilityContext>,
        limit: i64,
    ) -> StoreResult<Vec<AccessEvent>> {
        self.events
            .find_recent_for_student(student_id, context, limit)
            .await
    }

    /// Recent denied events across all facilities, newest first.
    pub async fn recent_denied(&self, limit: i64) -> StoreResult<Vec<AccessEvent>> {
        self.events.find_recent_denied(limit).await
    }

    /// Open a live subscription on the event log.
    pub fn subscribe(&self, query: EventQuery) -> EventSubscription {
        self.subscriptions.subscribe(query)
    }

    /// The underlying subscription hub.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }
}
