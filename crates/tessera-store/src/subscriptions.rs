//! Live event subscriptions.
//!
//! Readers that want to follow the event log as it grows (station result
//! screens, monitoring views) subscribe here rather than polling. The
//! manager keeps exactly one broadcast channel per distinct query; repeated
//! subscriptions to the same query share it, and the channel is torn down
//! when its last subscription is dropped.
//!
//! Delivery is best-effort fan-out after the durable write. A slow reader
//! that overruns the channel capacity loses the oldest buffered events and
//! is told how many it missed; it never stalls the writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use tessera_core::FacilityContext;

use crate::models::AccessEvent;

/// Default per-channel buffer, in events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A logical event-log query to follow.
///
/// `None` fields are wildcards; a query with both fields `None` follows the
/// whole log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventQuery {
    /// Only events for this student
    pub student_id: Option<i64>,

    /// Only events in this exact facility context
    pub context: Option<FacilityContext>,
}

impl EventQuery {
    /// Follow everything.
    #[must_use]
    pub fn all() -> Self {
        Self { student_id: None, context: None }
    }

    /// Follow one student across all facilities.
    #[must_use]
    pub fn for_student(student_id: i64) -> Self {
        Self {
            student_id: Some(student_id),
            context: None,
        }
    }

    /// Follow one student in one facility context.
    #[must_use]
    pub fn for_student_in(student_id: i64, context: FacilityContext) -> Self {
        Self {
            student_id: Some(student_id),
            context: Some(context),
        }
    }

    /// Whether an event falls within this query.
    #[must_use]
    pub fn matches(&self, event: &AccessEvent) -> bool {
        if let Some(student_id) = self.student_id
            && event.student_id != Some(student_id)
        {
            return false;
        }

        if let Some(context) = &self.context
            && !event.matches_context(context)
        {
            return false;
        }

        true
    }
}

type ChannelMap = Arc<Mutex<HashMap<EventQuery, broadcast::Sender<AccessEvent>>>>;

/// Fan-out hub for recorded events.
///
/// Cheap to clone; all clones share the channel table.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    channels: ChannelMap,
    capacity: usize,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Create a manager with the default per-channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a manager with an explicit per-channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to a query, reusing the channel if one is already open.
    ///
    /// The returned handle is the disposer: dropping it detaches the
    /// subscription, and the channel itself is removed when the last
    /// subscription on the query is dropped.
    pub fn subscribe(&self, query: EventQuery) -> EventSubscription {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        let sender = channels
            .entry(query.clone())
            .or_insert_with(|| {
                debug!(?query, "Opening event subscription channel");
                broadcast::channel(self.capacity).0
            });

        EventSubscription {
            receiver: sender.subscribe(),
            query,
            channels: Arc::clone(&self.channels),
        }
    }

    /// Deliver a recorded event to every matching subscription.
    pub fn publish(&self, event: &AccessEvent) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        for (query, sender) in channels.iter() {
            if query.matches(event) {
                // Send only fails when every receiver is gone, which the
                // disposer cleans up on its own
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Number of distinct queries with an open channel.
    #[must_use]
    pub fn active_queries(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// A live subscription handle; dropping it unsubscribes.
pub struct EventSubscription {
    receiver: broadcast::Receiver<AccessEvent>,
    query: EventQuery,
    channels: ChannelMap,
}

impl EventSubscription {
    /// The query this subscription follows.
    #[must_use]
    pub fn query(&self) -> &EventQuery {
        &self.query
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the channel is closed. Lagged gaps are logged and
    /// skipped; the stream resumes at the oldest retained event.
    pub async fn recv(&mut self) -> Option<AccessEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(query = ?self.query, missed, "Subscription lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        // This receiver is still counted until drop completes
        if let Some(sender) = channels.get(&self.query)
            && sender.receiver_count() <= 1
        {
            debug!(query = ?self.query, "Closing event subscription channel");
            channels.remove(&self.query);
        }
    }
}
