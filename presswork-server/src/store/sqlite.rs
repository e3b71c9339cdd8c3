//! SQLite-backed store
//!
//! Per-entity serialization comes from the database itself:
//! - activities: `UPDATE ... WHERE version = ?` inside a transaction
//! - reprint requests: `UPDATE ... WHERE status = 'pending'` plus the partial
//!   unique index on `(activity_id) WHERE status = 'pending'`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use presswork_common::db::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use presswork_common::models::{
    Activity, ActivityFilter, HistoryEntry, ReprintFilter, ReprintRequest, ReprintStatus,
};
use presswork_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    ActivityStore, ActivityTransition, CompareAndSet, ReprintRequestStore, ReprintResolution,
};

/// Store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }
}

/// Fixed-width UTC timestamps so text ordering equals time ordering
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} in database: {}", column, e)))
}

fn parse_column<T: std::str::FromStr>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|_| Error::Internal(format!("Invalid {} in database: {}", column, raw)))
}

/// Translate constraint violations into the workflow error taxonomy
fn map_constraint_error(
    err: sqlx::Error,
    on_unique: impl FnOnce() -> Error,
    on_foreign_key: impl FnOnce() -> Error,
) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return on_unique();
        }
        if db_err.is_foreign_key_violation() {
            return on_foreign_key();
        }
    }
    Error::Database(err)
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
    let recorded_at: String = row.try_get("recorded_at")?;
    Ok(HistoryEntry {
        from_department: parse_column(row, "from_department")?,
        to_department: parse_column(row, "to_department")?,
        action: parse_column(row, "action")?,
        actor: row.try_get("actor")?,
        timestamp: parse_time(&recorded_at, "recorded_at")?,
        notes: row.try_get("notes")?,
    })
}

fn reprint_from_row(row: &SqliteRow) -> Result<ReprintRequest> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let processed_at: Option<String> = row.try_get("processed_at")?;
    let quantity: i64 = row.try_get("quantity")?;

    Ok(ReprintRequest {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid reprint id in database: {}", e)))?,
        activity_id: row.try_get("activity_id")?,
        requested_by: row.try_get("requested_by")?,
        reason: row.try_get("reason")?,
        details: row.try_get("details")?,
        quantity: u32::try_from(quantity)
            .map_err(|_| Error::Internal(format!("Invalid quantity in database: {}", quantity)))?,
        status: parse_column(row, "status")?,
        from_department: parse_column(row, "from_department")?,
        to_department: parse_column(row, "to_department")?,
        created_at: parse_time(&created_at, "created_at")?,
        processed_by: row.try_get("processed_by")?,
        processed_at: processed_at
            .map(|s| parse_time(&s, "processed_at"))
            .transpose()?,
    })
}

async fn load_history(pool: &SqlitePool, activity_id: &str) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT from_department, to_department, action, actor, notes, recorded_at
        FROM activity_history
        WHERE activity_id = ?
        ORDER BY seq
        "#,
    )
    .bind(activity_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(history_from_row).collect()
}

async fn activity_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Activity> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let history = load_history(pool, &id).await?;

    Ok(Activity {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        current_department: parse_column(row, "current_department")?,
        status: parse_column(row, "status")?,
        history,
        version: row.try_get("version")?,
        created_at: parse_time(&created_at, "created_at")?,
        updated_at: parse_time(&updated_at, "updated_at")?,
        id,
    })
}

const ACTIVITY_COLUMNS: &str =
    "id, title, description, current_department, status, version, created_at, updated_at";

const REPRINT_COLUMNS: &str = "id, activity_id, requested_by, reason, details, quantity, status, \
     from_department, to_department, created_at, processed_by, processed_at";

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        let pool = &self.pool;
        let created_at = format_time(&activity.created_at);
        let updated_at = format_time(&activity.updated_at);
        let (created_at, updated_at) = (&created_at, &updated_at);

        retry_on_lock("insert_activity", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO activities (
                    id, title, description, current_department, status,
                    version, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&activity.id)
            .bind(&activity.title)
            .bind(&activity.description)
            .bind(activity.current_department.as_str())
            .bind(activity.status.as_str())
            .bind(activity.version)
            .bind(created_at)
            .bind(updated_at)
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                map_constraint_error(
                    e,
                    || Error::Conflict(format!("Activity {} already exists", activity.id)),
                    || Error::Internal("Unexpected foreign key on activities".to_string()),
                )
            })
        })
        .await
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        let sql = format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(activity_from_row(&self.pool, &row).await?)),
            None => Ok(None),
        }
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM activities
            WHERE (?1 IS NULL OR current_department = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at, id
            "#,
            ACTIVITY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.department.map(|d| d.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        let mut activities = Vec::with_capacity(rows.len());
        for row in &rows {
            activities.push(activity_from_row(&self.pool, row).await?);
        }
        Ok(activities)
    }

    async fn commit_transition(
        &self,
        id: &str,
        transition: &ActivityTransition,
    ) -> Result<CompareAndSet<Activity>> {
        let pool = &self.pool;
        let recorded_at = format_time(&transition.entry.timestamp);
        let recorded_at = &recorded_at;

        let applied = retry_on_lock("commit_transition", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let updated = sqlx::query(
                r#"
                UPDATE activities
                SET current_department = ?, status = ?, version = version + 1, updated_at = ?
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(transition.department.as_str())
            .bind(transition.status.as_str())
            .bind(recorded_at)
            .bind(id)
            .bind(transition.expected_version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities WHERE id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
                tx.rollback().await?;
                return if exists == 0 {
                    Err(Error::NotFound(format!("Activity {} not found", id)))
                } else {
                    Ok(false)
                };
            }

            let seq: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM activity_history WHERE activity_id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;

            let entry = &transition.entry;
            sqlx::query(
                r#"
                INSERT INTO activity_history (
                    activity_id, seq, from_department, to_department,
                    action, actor, notes, recorded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(seq)
            .bind(entry.from_department.as_str())
            .bind(entry.to_department.as_str())
            .bind(entry.action.as_str())
            .bind(&entry.actor)
            .bind(&entry.notes)
            .bind(recorded_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        })
        .await?;

        if !applied {
            return Ok(CompareAndSet::Lost);
        }

        self.get_activity(id)
            .await?
            .map(CompareAndSet::Applied)
            .ok_or_else(|| Error::Internal(format!("Activity {} vanished after commit", id)))
    }
}

#[async_trait]
impl ReprintRequestStore for SqliteStore {
    async fn insert_pending(&self, request: &ReprintRequest) -> Result<()> {
        let pool = &self.pool;
        let id = request.id.to_string();
        let created_at = format_time(&request.created_at);
        let (id, created_at) = (&id, &created_at);

        retry_on_lock("insert_reprint", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO reprint_requests (
                    id, activity_id, requested_by, reason, details, quantity, status,
                    from_department, to_department, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&request.activity_id)
            .bind(&request.requested_by)
            .bind(&request.reason)
            .bind(&request.details)
            .bind(i64::from(request.quantity))
            .bind(ReprintStatus::Pending.as_str())
            .bind(request.from_department.as_str())
            .bind(request.to_department.as_str())
            .bind(created_at)
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                map_constraint_error(
                    e,
                    || {
                        Error::Conflict(format!(
                            "Activity {} already has a pending reprint request",
                            request.activity_id
                        ))
                    },
                    || Error::NotFound(format!("Activity {} not found", request.activity_id)),
                )
            })
        })
        .await
    }

    async fn get_reprint(&self, id: Uuid) -> Result<Option<ReprintRequest>> {
        let sql = format!("SELECT {} FROM reprint_requests WHERE id = ?", REPRINT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reprint_from_row).transpose()
    }

    async fn list_reprints(&self, filter: &ReprintFilter) -> Result<Vec<ReprintRequest>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM reprint_requests
            WHERE (?1 IS NULL OR to_department = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at, id
            "#,
            REPRINT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.to_department.map(|d| d.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(reprint_from_row).collect()
    }

    async fn resolve(
        &self,
        id: Uuid,
        resolution: &ReprintResolution,
    ) -> Result<CompareAndSet<ReprintRequest>> {
        let pool = &self.pool;
        let id_text = id.to_string();
        let processed_at = format_time(&resolution.processed_at);
        let status = ReprintStatus::from(resolution.resolution);
        let (id_text, processed_at) = (&id_text, &processed_at);

        let updated = retry_on_lock("resolve_reprint", self.max_lock_wait_ms, || async move {
            let result = sqlx::query(
                r#"
                UPDATE reprint_requests
                SET status = ?, processed_by = ?, processed_at = ?
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(status.as_str())
            .bind(&resolution.processed_by)
            .bind(processed_at)
            .bind(id_text)
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        let current = self.get_reprint(id).await?;
        match (updated, current) {
            (_, None) => Err(Error::NotFound(format!("Reprint request {} not found", id))),
            (0, Some(_)) => Ok(CompareAndSet::Lost),
            (_, Some(request)) => Ok(CompareAndSet::Applied(request)),
        }
    }
}
