//! Activity state machine and department routing
//!
//! **Transitions:**
//! - `complete`: pending → completed, department unchanged
//! - `return`: any status → pending, one department back
//! - `advance`: completed → pending, one department forward
//!
//! Every transition is a compare-and-set on the activity version. A writer
//! that loses re-reads the activity and re-plans, so the rules are always
//! evaluated against committed state.

use std::sync::Arc;

use chrono::Utc;
use presswork_common::events::{EventKind, EventPayload, NotificationBus, NotificationEvent};
use presswork_common::models::{
    Activity, ActivityFilter, ActivityStatus, Department, HistoryEntry, NewActivity,
    TransitionAction,
};
use presswork_common::{Error, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{ActivityStore, ActivityTransition, CompareAndSet};

/// Compare-and-set attempts before a transition gives up with `Conflict`
pub const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Outcome of applying an action to an activity's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from_department: Department,
    pub to_department: Department,
    pub status: ActivityStatus,
    pub event_kind: EventKind,
    pub targets: Vec<Department>,
}

/// Decide what `action` does to `activity`, or why it is not allowed
pub fn plan_transition(activity: &Activity, action: TransitionAction) -> Result<TransitionPlan> {
    let current = activity.current_department;

    match action {
        TransitionAction::Complete => {
            if activity.status != ActivityStatus::Pending {
                return Err(Error::InvalidTransition(format!(
                    "Activity {} is {}, only pending activities can be completed",
                    activity.id, activity.status
                )));
            }
            let mut targets = vec![current];
            targets.extend(current.next());
            Ok(TransitionPlan {
                from_department: current,
                to_department: current,
                status: ActivityStatus::Completed,
                event_kind: EventKind::ActivityCompleted,
                targets,
            })
        }
        TransitionAction::Return => {
            let previous = current.previous().ok_or_else(|| {
                Error::InvalidTransition(format!(
                    "Activity {} is at {}, which has no previous department",
                    activity.id, current
                ))
            })?;
            Ok(TransitionPlan {
                from_department: current,
                to_department: previous,
                status: ActivityStatus::Pending,
                event_kind: EventKind::ActivityReturned,
                targets: vec![current, previous],
            })
        }
        TransitionAction::Advance => {
            if activity.status != ActivityStatus::Completed {
                return Err(Error::InvalidTransition(format!(
                    "Activity {} is {}, only completed activities can be advanced",
                    activity.id, activity.status
                )));
            }
            let next = current.next().ok_or_else(|| {
                Error::InvalidTransition(format!(
                    "Activity {} is at {}, the end of the line",
                    activity.id, current
                ))
            })?;
            Ok(TransitionPlan {
                from_department: current,
                to_department: next,
                status: ActivityStatus::Pending,
                event_kind: EventKind::GenericUpdate,
                targets: vec![current, next],
            })
        }
    }
}

/// Trimmed, non-blank value of a required text field
pub(crate) fn require_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Optional free text, blank treated as absent
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Sole writer of activities
pub struct WorkflowEngine {
    activities: Arc<dyn ActivityStore>,
    bus: NotificationBus,
}

impl WorkflowEngine {
    pub fn new(activities: Arc<dyn ActivityStore>, bus: NotificationBus) -> Self {
        Self { activities, bus }
    }

    /// Create an activity on behalf of intake
    pub async fn register(&self, new: NewActivity) -> Result<Activity> {
        let title = require_text(&new.title, "title")?;
        let id = optional_text(new.id).unwrap_or_else(|| Uuid::new_v4().to_string());
        let department = new.department.unwrap_or_else(Department::first);
        let now = Utc::now();

        let activity = Activity {
            id,
            title,
            description: optional_text(new.description).unwrap_or_default(),
            current_department: department,
            status: ActivityStatus::Pending,
            history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.activities.insert_activity(&activity).await?;

        info!(activity_id = %activity.id, department = %department, "Activity registered");
        self.bus.publish(NotificationEvent::new(
            EventKind::GenericUpdate,
            [department],
            EventPayload {
                activity_id: activity.id.clone(),
                reprint_id: None,
            },
        ));

        Ok(activity)
    }

    /// Mark the current department's work as done
    pub async fn complete(
        &self,
        activity_id: &str,
        completed_by: &str,
        notes: Option<String>,
    ) -> Result<Activity> {
        let actor = require_text(completed_by, "completedBy")?;
        self.transition(activity_id, TransitionAction::Complete, actor, notes)
            .await
    }

    /// Send the activity back to the previous department
    pub async fn return_activity(
        &self,
        activity_id: &str,
        returned_by: &str,
        notes: Option<String>,
    ) -> Result<Activity> {
        let actor = require_text(returned_by, "returnedBy")?;
        self.transition(activity_id, TransitionAction::Return, actor, notes)
            .await
    }

    /// Hand a completed activity to the next department
    pub async fn advance(
        &self,
        activity_id: &str,
        advanced_by: &str,
        notes: Option<String>,
    ) -> Result<Activity> {
        let actor = require_text(advanced_by, "advancedBy")?;
        self.transition(activity_id, TransitionAction::Advance, actor, notes)
            .await
    }

    pub async fn get(&self, activity_id: &str) -> Result<Activity> {
        self.activities
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Activity {} not found", activity_id)))
    }

    pub async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        self.activities.list_activities(filter).await
    }

    async fn transition(
        &self,
        activity_id: &str,
        action: TransitionAction,
        actor: String,
        notes: Option<String>,
    ) -> Result<Activity> {
        let notes = optional_text(notes);

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let activity = self.get(activity_id).await?;
            let plan = plan_transition(&activity, action)?;

            let transition = ActivityTransition {
                expected_version: activity.version,
                status: plan.status,
                department: plan.to_department,
                entry: HistoryEntry {
                    from_department: plan.from_department,
                    to_department: plan.to_department,
                    action,
                    actor: actor.clone(),
                    timestamp: Utc::now(),
                    notes: notes.clone(),
                },
            };

            match self
                .activities
                .commit_transition(activity_id, &transition)
                .await?
            {
                CompareAndSet::Applied(updated) => {
                    info!(
                        activity_id,
                        action = %action,
                        actor = %actor,
                        from = %plan.from_department,
                        to = %plan.to_department,
                        "Activity transition committed"
                    );
                    self.bus.publish(NotificationEvent::new(
                        plan.event_kind,
                        plan.targets,
                        EventPayload {
                            activity_id: updated.id.clone(),
                            reprint_id: None,
                        },
                    ));
                    return Ok(updated);
                }
                CompareAndSet::Lost => {
                    debug!(activity_id, action = %action, attempt, "Lost version race, re-reading");
                }
            }
        }

        warn!(
            activity_id,
            action = %action,
            attempts = MAX_TRANSITION_ATTEMPTS,
            "Activity kept changing underneath transition"
        );
        Err(Error::Conflict(format!(
            "Activity {} was modified concurrently, refresh and try again",
            activity_id
        )))
    }
}
