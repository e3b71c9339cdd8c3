//! Storage interface for activities and reprint requests
//!
//! Two interchangeable backends selected by configuration:
//! - [`SqliteStore`]: durable, constraints enforced by the schema
//! - [`MemoryStore`]: ephemeral, same constraints enforced under a lock
//!
//! Stores only persist and enforce data-level constraints (uniqueness,
//! compare-and-set). Business rules live in the workflow layer, which is the
//! only writer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use presswork_common::config::{ServerConfig, StorageBackend};
use presswork_common::models::{
    Activity, ActivityFilter, ActivityStatus, Department, HistoryEntry, ReprintFilter,
    ReprintRequest, Resolution,
};
use presswork_common::Result;
use tracing::info;
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Outcome of a compare-and-set write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareAndSet<T> {
    /// Precondition held; the write is committed
    Applied(T),
    /// Another writer changed the entity first; nothing was written
    Lost,
}

/// A transition committed only if the activity is still at `expected_version`
#[derive(Debug, Clone)]
pub struct ActivityTransition {
    pub expected_version: i64,
    pub status: ActivityStatus,
    pub department: Department,
    pub entry: HistoryEntry,
}

/// Final state written when a pending reprint request is resolved
#[derive(Debug, Clone)]
pub struct ReprintResolution {
    pub resolution: Resolution,
    pub processed_by: String,
    pub processed_at: DateTime<Utc>,
}

/// Durable record of activities and their history
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert a new activity (`Conflict` if the id is taken)
    async fn insert_activity(&self, activity: &Activity) -> Result<()>;

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>>;

    /// Activities matching `filter`, oldest first
    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>>;

    /// Apply a transition and append its history entry atomically
    ///
    /// Returns [`CompareAndSet::Lost`] when the stored version no longer
    /// matches, and `NotFound` when the activity does not exist.
    async fn commit_transition(
        &self,
        id: &str,
        transition: &ActivityTransition,
    ) -> Result<CompareAndSet<Activity>>;
}

/// Durable record of reprint requests
#[async_trait]
pub trait ReprintRequestStore: Send + Sync {
    /// Persist a new pending request
    ///
    /// `Conflict` if the activity already has a pending request,
    /// `NotFound` if the activity does not exist.
    async fn insert_pending(&self, request: &ReprintRequest) -> Result<()>;

    async fn get_reprint(&self, id: Uuid) -> Result<Option<ReprintRequest>>;

    /// Requests matching `filter`, oldest first
    async fn list_reprints(&self, filter: &ReprintFilter) -> Result<Vec<ReprintRequest>>;

    /// Resolve a request only if it is still pending at write time
    ///
    /// Returns [`CompareAndSet::Lost`] when the request was already resolved,
    /// and `NotFound` when it does not exist.
    async fn resolve(
        &self,
        id: Uuid,
        resolution: &ReprintResolution,
    ) -> Result<CompareAndSet<ReprintRequest>>;
}

/// The pair of stores the workflow layer writes through
#[derive(Clone)]
pub struct Storage {
    pub backend: StorageBackend,
    pub activities: Arc<dyn ActivityStore>,
    pub reprints: Arc<dyn ReprintRequestStore>,
}

impl Storage {
    /// Ephemeral in-process storage
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            backend: StorageBackend::Memory,
            activities: store.clone(),
            reprints: store,
        }
    }

    /// Durable SQLite storage at `db_path`
    pub async fn sqlite(db_path: &Path) -> Result<Self> {
        let pool = presswork_common::db::init_database(db_path).await?;
        let store = Arc::new(SqliteStore::new(pool));
        Ok(Self {
            backend: StorageBackend::Sqlite,
            activities: store.clone(),
            reprints: store,
        })
    }

    /// Open the backend named in the resolved configuration
    pub async fn open(config: &ServerConfig) -> Result<Self> {
        match config.storage_backend {
            StorageBackend::Sqlite => {
                info!(path = %config.database_path.display(), "Using SQLite storage");
                Self::sqlite(&config.database_path).await
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage (data is lost on restart)");
                Ok(Self::memory())
            }
        }
    }
}
