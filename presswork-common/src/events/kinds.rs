//! Event kind and notification category definitions
//!
//! Supporting types for the notification protocol.

use serde::{Deserialize, Serialize};

/// Domain event kinds produced by the workflow core
///
/// Closed set: adding a variant forces every `match` (most importantly
/// [`EventKind::category`]) to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A department completed its work on an activity
    ActivityCompleted,
    /// An activity was sent back to the previous department
    ActivityReturned,
    /// A reprint request was opened
    ReprintCreated,
    /// A reprint request was concluded or rejected
    ReprintResolved,
    /// Any other change worth a refresh (registration, hand-off)
    GenericUpdate,
}

impl EventKind {
    /// All kinds, for exhaustiveness checks
    pub const ALL: [EventKind; 5] = [
        EventKind::ActivityCompleted,
        EventKind::ActivityReturned,
        EventKind::ReprintCreated,
        EventKind::ReprintResolved,
        EventKind::GenericUpdate,
    ];

    /// Notification category the presentation layer turns into a cue
    pub fn category(self) -> NotificationCategory {
        match self {
            EventKind::ActivityCompleted => NotificationCategory::NewActivity,
            EventKind::ActivityReturned => NotificationCategory::ReturnAlert,
            EventKind::ReprintCreated => NotificationCategory::NewActivity,
            EventKind::ReprintResolved => NotificationCategory::Success,
            EventKind::GenericUpdate => NotificationCategory::Update,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ActivityCompleted => "activity-completed",
            EventKind::ActivityReturned => "activity-returned",
            EventKind::ReprintCreated => "reprint-created",
            EventKind::ReprintResolved => "reprint-resolved",
            EventKind::GenericUpdate => "generic-update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing classification of an event, used to pick a sound/visual cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    NewActivity,
    ReturnAlert,
    Update,
    Success,
}

impl NotificationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::NewActivity => "new-activity",
            NotificationCategory::ReturnAlert => "return-alert",
            NotificationCategory::Update => "update",
            NotificationCategory::Success => "success",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
