//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and applies the schema.
//! Every statement is idempotent, so this is safe on every startup.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::Result;

/// Current schema version
///
/// **IMPORTANT:** Increment this when changing the schema below
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite busy timeout; lock waits beyond this surface as errors that
/// `retry_on_lock` then retries with backoff
const BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema_version_table(&pool).await?;
    create_activities_table(&pool).await?;
    create_activity_history_table(&pool).await?;
    create_reprint_requests_table(&pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(CURRENT_SCHEMA_VERSION)
        .execute(&pool)
        .await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_activities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            current_department TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'returned')),
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_queue ON activities(current_department, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_activity_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_history (
            activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            from_department TEXT NOT NULL,
            to_department TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            notes TEXT,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (activity_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // History rows are written once and never edited
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_activity_history_append_only
        BEFORE UPDATE ON activity_history
        BEGIN
            SELECT RAISE(ABORT, 'activity history is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_reprint_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reprint_requests (
            id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL REFERENCES activities(id),
            requested_by TEXT NOT NULL,
            reason TEXT NOT NULL,
            details TEXT,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            status TEXT NOT NULL CHECK (status IN ('pending', 'concluded', 'rejected')),
            from_department TEXT NOT NULL,
            to_department TEXT NOT NULL,
            created_at TEXT NOT NULL,
            processed_by TEXT,
            processed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one open request per activity
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_reprint_one_pending
        ON reprint_requests(activity_id)
        WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reprint_routing ON reprint_requests(to_department, status)",
    )
    .execute(pool)
    .await?;

    // Resolved requests are immutable
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_reprint_resolved_immutable
        BEFORE UPDATE ON reprint_requests
        WHEN OLD.status <> 'pending'
        BEGIN
            SELECT RAISE(ABORT, 'resolved reprint requests are immutable');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
