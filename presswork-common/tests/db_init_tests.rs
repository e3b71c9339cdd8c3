//! Database initialization tests
//!
//! Covers first-run creation, idempotent re-open and the schema-level
//! guarantees the stores rely on (one pending reprint per activity, append-only
//! history, immutable resolved reprints).

use presswork_common::db::init::{init_database, CURRENT_SCHEMA_VERSION};
use sqlx::SqlitePool;

async fn fresh_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = init_database(&dir.path().join("presswork.db"))
        .await
        .expect("database should initialize");
    (dir, pool)
}

async fn insert_activity(pool: &SqlitePool, id: &str) {
    sqlx::query(
        "INSERT INTO activities (id, title, current_department, status, created_at, updated_at)
         VALUES (?, 'Flyers', 'intake', 'pending', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("insert activity");
}

async fn insert_reprint(pool: &SqlitePool, id: &str, activity_id: &str, status: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO reprint_requests
            (id, activity_id, requested_by, reason, quantity, status,
             from_department, to_department, created_at)
         VALUES (?, ?, 'Maria', 'smudged ink', 3, ?, 'finishing', 'printing', '2026-01-01T00:00:00Z')",
    )
    .bind(id)
    .bind(activity_id)
    .bind(status)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("presswork.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("presswork.db");

    let first = init_database(&db_path).await.expect("first open");
    insert_activity(&first, "A001").await;
    first.close().await;

    let second = init_database(&db_path).await.expect("second open");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(count, 1, "existing rows must survive re-initialization");

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_one_pending_reprint_per_activity() {
    let (_dir, pool) = fresh_pool().await;
    insert_activity(&pool, "A002").await;

    insert_reprint(&pool, "R1", "A002", "pending").await.expect("first pending");
    let second = insert_reprint(&pool, "R2", "A002", "pending").await;
    let err = second.expect_err("second pending request must be rejected");
    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());

    // Resolved requests do not count against the limit
    insert_reprint(&pool, "R3", "A002", "concluded").await.expect("resolved row");
}

#[tokio::test]
async fn test_reprint_requires_existing_activity() {
    let (_dir, pool) = fresh_pool().await;
    let result = insert_reprint(&pool, "R1", "missing", "pending").await;
    let err = result.expect_err("foreign key must be enforced");
    assert!(err.as_database_error().unwrap().is_foreign_key_violation());
}

#[tokio::test]
async fn test_history_is_append_only() {
    let (_dir, pool) = fresh_pool().await;
    insert_activity(&pool, "A001").await;

    sqlx::query(
        "INSERT INTO activity_history
            (activity_id, seq, from_department, to_department, action, actor, recorded_at)
         VALUES ('A001', 0, 'intake', 'intake', 'complete', 'Maria', '2026-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let update = sqlx::query("UPDATE activity_history SET actor = 'Mallory' WHERE activity_id = 'A001'")
        .execute(&pool)
        .await;
    assert!(update.is_err(), "history rows must not be editable");
}

#[tokio::test]
async fn test_resolved_reprint_is_immutable() {
    let (_dir, pool) = fresh_pool().await;
    insert_activity(&pool, "A003").await;
    insert_reprint(&pool, "R1", "A003", "rejected").await.unwrap();

    let update = sqlx::query("UPDATE reprint_requests SET status = 'concluded' WHERE id = 'R1'")
        .execute(&pool)
        .await;
    assert!(update.is_err(), "resolved request must not change");
}
