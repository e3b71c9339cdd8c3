//! Department terminal view and the reconciliation entry point
//!
//! Push and poll feed the same [`TerminalView::apply`]:
//! - `Update::Snapshot` replaces the pending list wholesale (idempotent)
//! - `Update::Event` fires a cue once per distinct event and marks the view
//!   stale, which asks the poller for an immediate authoritative refetch
//!
//! Events never edit the list directly. Only snapshots carry truth.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use presswork_common::events::{EventKind, EventPayload, NotificationCategory, NotificationEvent};
use presswork_common::models::{Department, ReprintRequest};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::cues::CueDispatcher;

/// Recently applied events remembered for de-duplication
const SEEN_EVENTS_CAPACITY: usize = 128;

/// One input to the view, from either delivery path
#[derive(Debug, Clone)]
pub enum Update {
    /// Authoritative list of pending requests routed to this department
    Snapshot(Vec<ReprintRequest>),
    /// Live workflow event from the push channel
    Event(NotificationEvent),
}

/// What an update did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Snapshot replaced the list; `changed` is false when it was identical
    Replaced { changed: bool },
    /// Event not targeted at this department
    Ignored,
    /// Event already applied once
    Duplicate,
    /// Event accepted: cue fired, refetch requested
    Invalidated(NotificationCategory),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EventKey {
    kind: EventKind,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
}

impl From<&NotificationEvent> for EventKey {
    fn from(event: &NotificationEvent) -> Self {
        Self {
            kind: event.kind,
            payload: event.payload.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// Local view of one department's pending reprint requests
pub struct TerminalView {
    department: Department,
    pending: Vec<ReprintRequest>,
    stale: bool,
    seen: VecDeque<EventKey>,
    cues: Arc<dyn CueDispatcher>,
}

impl TerminalView {
    pub fn new(department: Department, cues: Arc<dyn CueDispatcher>) -> Self {
        Self {
            department,
            pending: Vec::new(),
            // Nothing fetched yet
            stale: true,
            seen: VecDeque::with_capacity(SEEN_EVENTS_CAPACITY),
            cues,
        }
    }

    /// Pending requests, oldest first
    pub fn pending(&self) -> &[ReprintRequest] {
        &self.pending
    }

    /// Whether an event arrived since the last snapshot
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn apply(&mut self, update: Update) -> Applied {
        match update {
            Update::Snapshot(mut requests) => {
                requests.retain(|r| r.is_pending() && r.to_department == self.department);
                requests.sort_by(|a, b| {
                    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
                });

                let changed = requests != self.pending;
                if changed {
                    info!(
                        department = %self.department,
                        pending = requests.len(),
                        "Pending reprint requests updated"
                    );
                }
                self.pending = requests;
                self.stale = false;
                Applied::Replaced { changed }
            }
            Update::Event(event) => {
                if !event.is_targeted_at(self.department) {
                    debug!(kind = %event.kind, department = %self.department, "Event not for this department");
                    return Applied::Ignored;
                }

                let key = EventKey::from(&event);
                if self.seen.contains(&key) {
                    debug!(kind = %event.kind, "Duplicate event ignored");
                    return Applied::Duplicate;
                }
                if self.seen.len() == SEEN_EVENTS_CAPACITY {
                    self.seen.pop_front();
                }
                self.seen.push_back(key);

                let category = event.category();
                self.cues.dispatch(category);
                self.stale = true;
                Applied::Invalidated(category)
            }
        }
    }
}

/// Shared handle used by both delivery paths
#[derive(Clone)]
pub struct Reconciler {
    view: Arc<Mutex<TerminalView>>,
    refresh: Arc<Notify>,
}

impl Reconciler {
    pub fn new(view: TerminalView) -> Self {
        Self {
            view: Arc::new(Mutex::new(view)),
            refresh: Arc::new(Notify::new()),
        }
    }

    pub async fn apply(&self, update: Update) -> Applied {
        let applied = self.view.lock().await.apply(update);
        if matches!(applied, Applied::Invalidated(_)) {
            self.request_refresh();
        }
        applied
    }

    /// Ask the poller to refetch now instead of waiting for its interval
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Resolves when a refetch has been requested
    pub async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }

    pub async fn pending(&self) -> Vec<ReprintRequest> {
        self.view.lock().await.pending().to_vec()
    }

    pub async fn is_stale(&self) -> bool {
        self.view.lock().await.is_stale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presswork_common::models::ReprintStatus;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordedCues(StdMutex<Vec<NotificationCategory>>);

    impl CueDispatcher for RecordedCues {
        fn dispatch(&self, category: NotificationCategory) {
            self.0.lock().unwrap().push(category);
        }
    }

    fn request(activity_id: &str, to: Department) -> ReprintRequest {
        ReprintRequest {
            id: Uuid::new_v4(),
            activity_id: activity_id.to_string(),
            requested_by: "Maria".to_string(),
            reason: "smudged ink".to_string(),
            details: None,
            quantity: 3,
            status: ReprintStatus::Pending,
            from_department: Department::Finishing,
            to_department: to,
            created_at: Utc::now(),
            processed_by: None,
            processed_at: None,
        }
    }

    fn event(kind: EventKind, targets: &[Department]) -> NotificationEvent {
        NotificationEvent::new(
            kind,
            targets.iter().copied(),
            EventPayload {
                activity_id: "A002".to_string(),
                reprint_id: None,
            },
        )
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let cues = Arc::new(RecordedCues::default());
        let mut view = TerminalView::new(Department::Printing, cues.clone());
        let snapshot = vec![request("A001", Department::Printing), request("A002", Department::Printing)];

        assert_eq!(
            view.apply(Update::Snapshot(snapshot.clone())),
            Applied::Replaced { changed: true }
        );
        let first = view.pending().to_vec();

        assert_eq!(
            view.apply(Update::Snapshot(snapshot)),
            Applied::Replaced { changed: false }
        );
        assert_eq!(view.pending(), first.as_slice());
        assert!(!view.is_stale());
        assert!(cues.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_drops_foreign_and_resolved_rows() {
        let mut view = TerminalView::new(Department::Printing, Arc::new(RecordedCues::default()));
        let mut resolved = request("A003", Department::Printing);
        resolved.status = ReprintStatus::Concluded;

        view.apply(Update::Snapshot(vec![
            request("A001", Department::Printing),
            request("A002", Department::Finishing),
            resolved,
        ]));

        assert_eq!(view.pending().len(), 1);
        assert_eq!(view.pending()[0].activity_id, "A001");
    }

    #[test]
    fn test_untargeted_event_is_ignored() {
        let cues = Arc::new(RecordedCues::default());
        let mut view = TerminalView::new(Department::Finishing, cues.clone());
        view.apply(Update::Snapshot(Vec::new()));

        let applied = view.apply(Update::Event(event(EventKind::ReprintCreated, &[Department::Printing])));

        assert_eq!(applied, Applied::Ignored);
        assert!(!view.is_stale());
        assert!(cues.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_targeted_event_cues_once() {
        let cues = Arc::new(RecordedCues::default());
        let mut view = TerminalView::new(Department::Printing, cues.clone());
        view.apply(Update::Snapshot(Vec::new()));

        let created = event(EventKind::ReprintCreated, &[Department::Printing]);
        assert_eq!(
            view.apply(Update::Event(created.clone())),
            Applied::Invalidated(NotificationCategory::NewActivity)
        );
        assert!(view.is_stale());
        assert_eq!(view.apply(Update::Event(created)), Applied::Duplicate);

        assert_eq!(*cues.0.lock().unwrap(), vec![NotificationCategory::NewActivity]);
    }

    #[tokio::test]
    async fn test_reconciler_requests_refresh_on_event() {
        let reconciler = Reconciler::new(TerminalView::new(
            Department::Printing,
            Arc::new(RecordedCues::default()),
        ));

        reconciler
            .apply(Update::Event(event(EventKind::ActivityReturned, &[Department::Printing])))
            .await;

        tokio::time::timeout(std::time::Duration::from_secs(1), reconciler.refresh_requested())
            .await
            .expect("refresh requested");
    }
}
