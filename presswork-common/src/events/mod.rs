//! Event types for the Presswork notification system
//!
//! Provides the workflow event definitions and the NotificationBus that fans
//! them out to every connected department session.

mod kinds;

pub use kinds::{EventKind, NotificationCategory};

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::Department;

/// Minimal identifying data carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprint_id: Option<Uuid>,
}

/// Workflow event emitted after a successful state mutation
///
/// Transient: never persisted, exists only for the duration of delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub kind: EventKind,
    /// Departments that should act on this event
    pub target_departments: BTreeSet<Department>,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        kind: EventKind,
        targets: impl IntoIterator<Item = Department>,
        payload: EventPayload,
    ) -> Self {
        Self {
            kind,
            target_departments: targets.into_iter().collect(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn category(&self) -> NotificationCategory {
        self.kind.category()
    }

    /// Whether a session of `department` should act on this event
    pub fn is_targeted_at(&self, department: Department) -> bool {
        self.target_departments.contains(&department)
    }
}

/// Push channel message as sent to sessions
///
/// Serialized as `{"type":"event","kind",...}`. The category is resolved
/// server-side so thin clients need no mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushMessage {
    Event {
        kind: EventKind,
        category: NotificationCategory,
        #[serde(rename = "targetDepartments")]
        target_departments: BTreeSet<Department>,
        payload: EventPayload,
        timestamp: DateTime<Utc>,
    },
}

impl PushMessage {
    /// SSE `event:` field for this message
    pub fn event_type(&self) -> &'static str {
        match self {
            PushMessage::Event { .. } => "WorkflowEvent",
        }
    }

    pub fn into_event(self) -> NotificationEvent {
        match self {
            PushMessage::Event {
                kind,
                target_departments,
                payload,
                timestamp,
                ..
            } => NotificationEvent {
                kind,
                target_departments,
                payload,
                timestamp,
            },
        }
    }
}

impl From<NotificationEvent> for PushMessage {
    fn from(event: NotificationEvent) -> Self {
        PushMessage::Event {
            kind: event.kind,
            category: event.kind.category(),
            target_departments: event.target_departments,
            payload: event.payload,
            timestamp: event.timestamp,
        }
    }
}

// ========================================
// NotificationBus Implementation
// ========================================

/// Identity of a connected department session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub department: Department,
}

impl SessionHandle {
    pub fn new(department: Department) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            department,
        }
    }
}

struct SessionEntry {
    department: Department,
    generation: u64,
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<Uuid, SessionEntry>,
    next_generation: u64,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Registry holds plain data; a panicked holder cannot leave it half-updated.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out bus for workflow events
///
/// Each session gets its own unbounded channel, giving:
/// - Non-blocking publish (the caller never waits on a slow session)
/// - FIFO delivery per session
/// - No replay: a session only sees events published while it is subscribed
/// - Isolation: a dead session is logged and dropped, the others still receive
///
/// The bus does not filter by department. Sessions check
/// [`NotificationEvent::is_targeted_at`] before acting.
///
/// # Examples
///
/// ```
/// use presswork_common::events::{EventKind, EventPayload, NotificationBus, NotificationEvent, SessionHandle};
/// use presswork_common::Department;
///
/// let bus = NotificationBus::new();
/// let mut subscription = bus.subscribe(SessionHandle::new(Department::Printing));
///
/// bus.publish(NotificationEvent::new(
///     EventKind::ReprintCreated,
///     [Department::Printing],
///     EventPayload { activity_id: "A002".to_string(), reprint_id: None },
/// ));
///
/// let received = subscription.try_recv().expect("event delivered");
/// assert_eq!(received.kind, EventKind::ReprintCreated);
/// ```
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: SharedRegistry,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its live event stream
    ///
    /// Re-subscribing with an existing session id replaces the old
    /// registration; the previous stream ends.
    pub fn subscribe(&self, session: SessionHandle) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let generation = {
            let mut registry = lock_registry(&self.registry);
            registry.next_generation += 1;
            let generation = registry.next_generation;
            let replaced = registry.sessions.insert(
                session.session_id,
                SessionEntry {
                    department: session.department,
                    generation,
                    tx,
                },
            );
            if replaced.is_some() {
                debug!(session_id = %session.session_id, "Session re-subscribed, replacing stream");
            }
            generation
        };

        info!(
            session_id = %session.session_id,
            department = %session.department,
            sessions = self.subscriber_count(),
            "Session subscribed to notifications"
        );

        Subscription {
            session,
            generation,
            stream: UnboundedReceiverStream::new(rx),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every connected session
    ///
    /// Fire-and-forget. Returns the number of sessions the event was handed
    /// to; sessions whose receiver is gone are logged and unregistered.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        let mut registry = lock_registry(&self.registry);
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        for (session_id, entry) in registry.sessions.iter() {
            match entry.tx.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        session_id = %session_id,
                        department = %entry.department,
                        kind = %event.kind,
                        "Push delivery failed, session disconnected"
                    );
                    disconnected.push(*session_id);
                }
            }
        }

        for session_id in disconnected {
            registry.sessions.remove(&session_id);
        }

        debug!(
            kind = %event.kind,
            activity_id = %event.payload.activity_id,
            delivered,
            "Published workflow event"
        );
        delivered
    }

    /// Number of currently registered sessions
    pub fn subscriber_count(&self) -> usize {
        lock_registry(&self.registry).sessions.len()
    }
}

/// A session's live event stream
///
/// Dropping it unregisters the session from the bus.
pub struct Subscription {
    session: SessionHandle,
    generation: u64,
    stream: UnboundedReceiverStream<NotificationEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn session(&self) -> SessionHandle {
        self.session
    }

    /// Wait for the next event; `None` once the session was replaced or the bus is gone
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.stream.next().await
    }

    /// Take an already-delivered event without waiting
    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        self.stream.as_mut().try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = NotificationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock_registry(&registry);
        let owned = registry
            .sessions
            .get(&self.session.session_id)
            .is_some_and(|entry| entry.generation == self.generation);
        if owned {
            registry.sessions.remove(&self.session.session_id);
            debug!(session_id = %self.session.session_id, "Session unsubscribed");
        }
    }
}
