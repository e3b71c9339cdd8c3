//! Races between concurrent writers, and event targeting as seen by sessions

use std::sync::Arc;

use presswork_common::events::{
    EventKind, EventPayload, NotificationBus, NotificationEvent, SessionHandle,
};
use presswork_common::models::{
    ActivityStatus, Department, NewActivity, NewReprintRequest, ReprintStatus, Resolution,
};
use presswork_common::Error;
use presswork_server::store::Storage;
use presswork_server::workflow::{ReprintRequestManager, WorkflowEngine};
use tempfile::TempDir;

struct Shop {
    engine: Arc<WorkflowEngine>,
    reprints: Arc<ReprintRequestManager>,
    _dir: Option<TempDir>,
}

async fn shop(storage: Storage, dir: Option<TempDir>) -> Shop {
    let bus = NotificationBus::new();
    let engine = Arc::new(WorkflowEngine::new(storage.activities.clone(), bus.clone()));
    let reprints = Arc::new(ReprintRequestManager::new(
        storage.reprints,
        storage.activities,
        bus,
    ));

    engine
        .register(NewActivity {
            id: Some("A002".to_string()),
            title: "Brochures".to_string(),
            description: None,
            department: Some(Department::Finishing),
        })
        .await
        .unwrap();

    Shop {
        engine,
        reprints,
        _dir: dir,
    }
}

async fn memory_shop() -> Shop {
    shop(Storage::memory(), None).await
}

async fn sqlite_shop() -> Shop {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::sqlite(&dir.path().join("shop.db")).await.unwrap();
    shop(storage, Some(dir)).await
}

fn smudged() -> NewReprintRequest {
    NewReprintRequest {
        activity_id: "A002".to_string(),
        requested_by: "Maria".to_string(),
        reason: "smudged ink".to_string(),
        quantity: 3,
        ..Default::default()
    }
}

async fn concurrent_process_has_one_winner(shop: Shop) {
    let request = shop.reprints.create(smudged()).await.unwrap();

    let joao = {
        let reprints = shop.reprints.clone();
        tokio::spawn(async move { reprints.process(request.id, "Joao", Resolution::Concluded).await })
    };
    let ana = {
        let reprints = shop.reprints.clone();
        tokio::spawn(async move { reprints.process(request.id, "Ana", Resolution::Rejected).await })
    };

    let results = [joao.await.unwrap(), ana.await.unwrap()];
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::Conflict(_))))
        .count();
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);

    let stored = shop.reprints.get(request.id).await.unwrap();
    assert_eq!(stored.status, winners[0].status);
    assert!(matches!(
        stored.status,
        ReprintStatus::Concluded | ReprintStatus::Rejected
    ));
    assert_eq!(stored.processed_by, winners[0].processed_by);
}

async fn concurrent_create_keeps_one_pending(shop: Shop) {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reprints = shop.reprints.clone();
            tokio::spawn(async move { reprints.create(smudged()).await })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 3);

    let pending = shop
        .reprints
        .list(&presswork_common::models::ReprintFilter::pending_for(
            Department::Printing,
        ))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

async fn concurrent_complete_applies_once(shop: Shop) {
    let handles: Vec<_> = ["Joao", "Ana", "Rui"]
        .into_iter()
        .map(|actor| {
            let engine = shop.engine.clone();
            tokio::spawn(async move { engine.complete("A002", actor, None).await })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => completed += 1,
            Err(Error::InvalidTransition(_)) | Err(Error::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(completed, 1);

    let activity = shop.engine.get("A002").await.unwrap();
    assert_eq!(activity.status, ActivityStatus::Completed);
    assert_eq!(activity.history.len(), 1);
    assert_eq!(activity.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_process_memory() {
    concurrent_process_has_one_winner(memory_shop().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_process_sqlite() {
    concurrent_process_has_one_winner(sqlite_shop().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_memory() {
    concurrent_create_keeps_one_pending(memory_shop().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_sqlite() {
    concurrent_create_keeps_one_pending(sqlite_shop().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_complete_memory() {
    concurrent_complete_applies_once(memory_shop().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_complete_sqlite() {
    concurrent_complete_applies_once(sqlite_shop().await).await;
}

#[tokio::test]
async fn test_untargeted_session_receives_but_does_not_act() {
    let bus = NotificationBus::new();
    let mut finishing = bus.subscribe(SessionHandle::new(Department::Finishing));

    bus.publish(NotificationEvent::new(
        EventKind::ReprintCreated,
        [Department::Printing],
        EventPayload {
            activity_id: "A002".to_string(),
            reprint_id: None,
        },
    ));

    let event = finishing.recv().await.expect("event delivered");
    assert_eq!(event.kind, EventKind::ReprintCreated);
    assert!(!event.is_targeted_at(finishing.session().department));
}
