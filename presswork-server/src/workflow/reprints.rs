//! Reprint request sub-workflow
//!
//! At most one pending request per activity; resolution happens exactly once.
//! Both rules are enforced by the store at write time, so concurrent callers
//! cannot slip past a stale read.

use std::sync::Arc;

use chrono::Utc;
use presswork_common::events::{EventKind, EventPayload, NotificationBus, NotificationEvent};
use presswork_common::models::{
    Department, NewReprintRequest, ReprintFilter, ReprintRequest, ReprintStatus, Resolution,
};
use presswork_common::{Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::{optional_text, require_text};
use crate::store::{ActivityStore, CompareAndSet, ReprintRequestStore, ReprintResolution};

/// Sole writer of reprint requests
pub struct ReprintRequestManager {
    reprints: Arc<dyn ReprintRequestStore>,
    activities: Arc<dyn ActivityStore>,
    bus: NotificationBus,
}

impl ReprintRequestManager {
    pub fn new(
        reprints: Arc<dyn ReprintRequestStore>,
        activities: Arc<dyn ActivityStore>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            reprints,
            activities,
            bus,
        }
    }

    /// Open a pending reprint request for an activity
    ///
    /// Routing defaults: `fromDepartment` is the activity's current
    /// department, `toDepartment` is printing.
    pub async fn create(&self, new: NewReprintRequest) -> Result<ReprintRequest> {
        let activity_id = require_text(&new.activity_id, "activityId")?;
        let requested_by = require_text(&new.requested_by, "requestedBy")?;
        let reason = require_text(&new.reason, "reason")?;
        if new.quantity < 1 {
            return Err(Error::Validation(format!(
                "quantity must be at least 1, got {}",
                new.quantity
            )));
        }
        let quantity = u32::try_from(new.quantity)
            .map_err(|_| Error::Validation(format!("quantity {} is too large", new.quantity)))?;

        let activity = self
            .activities
            .get_activity(&activity_id)
            .await?
            .ok_or_else(|| unknown_activity(&activity_id))?;

        let request = ReprintRequest {
            id: Uuid::new_v4(),
            activity_id,
            requested_by,
            reason,
            details: optional_text(new.details),
            quantity,
            status: ReprintStatus::Pending,
            from_department: new.from_department.unwrap_or(activity.current_department),
            to_department: new.to_department.unwrap_or_else(Department::reprint_default),
            created_at: Utc::now(),
            processed_by: None,
            processed_at: None,
        };

        match self.reprints.insert_pending(&request).await {
            Ok(()) => {}
            // Activity removed between lookup and insert
            Err(Error::NotFound(_)) => return Err(unknown_activity(&request.activity_id)),
            Err(err) => return Err(err),
        }

        info!(
            reprint_id = %request.id,
            activity_id = %request.activity_id,
            from = %request.from_department,
            to = %request.to_department,
            quantity = request.quantity,
            "Reprint request created"
        );
        self.bus.publish(NotificationEvent::new(
            EventKind::ReprintCreated,
            [request.to_department],
            EventPayload {
                activity_id: request.activity_id.clone(),
                reprint_id: Some(request.id),
            },
        ));

        Ok(request)
    }

    /// Resolve a pending request; the loser of a race gets `Conflict`
    pub async fn process(
        &self,
        request_id: Uuid,
        processed_by: &str,
        resolution: Resolution,
    ) -> Result<ReprintRequest> {
        let processed_by = require_text(processed_by, "processedBy")?;

        let outcome = self
            .reprints
            .resolve(
                request_id,
                &ReprintResolution {
                    resolution,
                    processed_by: processed_by.clone(),
                    processed_at: Utc::now(),
                },
            )
            .await?;

        match outcome {
            CompareAndSet::Applied(request) => {
                info!(
                    reprint_id = %request.id,
                    status = %request.status,
                    processed_by = %processed_by,
                    "Reprint request resolved"
                );
                self.bus.publish(NotificationEvent::new(
                    EventKind::ReprintResolved,
                    [request.from_department, request.to_department],
                    EventPayload {
                        activity_id: request.activity_id.clone(),
                        reprint_id: Some(request.id),
                    },
                ));
                Ok(request)
            }
            CompareAndSet::Lost => {
                warn!(reprint_id = %request_id, processed_by = %processed_by, "Reprint request already resolved");
                Err(Error::Conflict(format!(
                    "Reprint request {} was already processed by someone else",
                    request_id
                )))
            }
        }
    }

    pub async fn get(&self, request_id: Uuid) -> Result<ReprintRequest> {
        self.reprints
            .get_reprint(request_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Reprint request {} not found", request_id)))
    }

    /// Requests matching `filter`, oldest first
    pub async fn list(&self, filter: &ReprintFilter) -> Result<Vec<ReprintRequest>> {
        self.reprints.list_reprints(filter).await
    }
}

fn unknown_activity(activity_id: &str) -> Error {
    Error::Validation(format!("activityId {} does not match any activity", activity_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflow::WorkflowEngine;
    use presswork_common::events::SessionHandle;
    use presswork_common::models::NewActivity;

    struct Fixture {
        engine: WorkflowEngine,
        reprints: ReprintRequestManager,
        bus: NotificationBus,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = NotificationBus::new();
        let engine = WorkflowEngine::new(store.clone(), bus.clone());
        let reprints = ReprintRequestManager::new(store.clone(), store, bus.clone());

        engine
            .register(NewActivity {
                id: Some("A002".to_string()),
                title: "Brochures".to_string(),
                description: None,
                department: Some(Department::Finishing),
            })
            .await
            .unwrap();

        Fixture {
            engine,
            reprints,
            bus,
        }
    }

    fn smudged(quantity: i64) -> NewReprintRequest {
        NewReprintRequest {
            activity_id: "A002".to_string(),
            requested_by: "Maria".to_string(),
            reason: "smudged ink".to_string(),
            quantity,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_second_pending_request_conflicts() {
        let f = fixture().await;

        let r1 = f.reprints.create(smudged(3)).await.unwrap();
        assert_eq!(r1.status, ReprintStatus::Pending);
        assert_eq!(r1.from_department, Department::Finishing);
        assert_eq!(r1.to_department, Department::Printing);

        let err = f.reprints.create(smudged(1)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let all = f.reprints.list(&ReprintFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = fixture().await;

        assert!(matches!(
            f.reprints.create(smudged(0)).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.reprints
                .create(NewReprintRequest {
                    reason: "  ".to_string(),
                    ..smudged(1)
                })
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.reprints
                .create(NewReprintRequest {
                    activity_id: "nope".to_string(),
                    ..smudged(1)
                })
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_created_event_targets_destination_only() {
        let f = fixture().await;
        let mut printing = f.bus.subscribe(SessionHandle::new(Department::Printing));

        let request = f.reprints.create(smudged(3)).await.unwrap();

        let event = printing.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::ReprintCreated);
        assert_eq!(event.payload.reprint_id, Some(request.id));
        assert!(event.is_targeted_at(Department::Printing));
        assert!(!event.is_targeted_at(Department::Finishing));
    }

    #[tokio::test]
    async fn test_process_once() {
        let f = fixture().await;
        let request = f.reprints.create(smudged(3)).await.unwrap();

        let resolved = f
            .reprints
            .process(request.id, "Joao", Resolution::Concluded)
            .await
            .unwrap();
        assert_eq!(resolved.status, ReprintStatus::Concluded);
        assert_eq!(resolved.processed_by.as_deref(), Some("Joao"));
        assert!(resolved.processed_at.is_some());

        let err = f
            .reprints
            .process(request.id, "Ana", Resolution::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let stored = f.reprints.get(request.id).await.unwrap();
        assert_eq!(stored.status, ReprintStatus::Concluded);
        assert_eq!(stored.processed_by.as_deref(), Some("Joao"));
    }

    #[tokio::test]
    async fn test_process_unknown_and_blank() {
        let f = fixture().await;

        assert!(matches!(
            f.reprints
                .process(Uuid::new_v4(), "Joao", Resolution::Concluded)
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            f.reprints
                .process(Uuid::new_v4(), "", Resolution::Concluded)
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_routing_defaults_follow_current_department() {
        let f = fixture().await;
        f.engine.return_activity("A002", "Ana", None).await.unwrap();

        let request = f.reprints.create(smudged(1)).await.unwrap();
        assert_eq!(request.from_department, Department::Printing);
    }
}
