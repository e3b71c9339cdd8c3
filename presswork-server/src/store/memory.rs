//! In-process store
//!
//! Same contract as the SQLite store. A single `RwLock` guards both maps so
//! every check-then-write is atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use presswork_common::models::{Activity, ActivityFilter, ReprintFilter, ReprintRequest};
use presswork_common::{Error, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ActivityStore, ActivityTransition, CompareAndSet, ReprintRequestStore, ReprintResolution,
};

#[derive(Default)]
struct MemoryState {
    activities: HashMap<String, Activity>,
    reprints: HashMap<Uuid, ReprintRequest>,
}

/// Ephemeral store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        let mut state = self.state.write().await;
        if state.activities.contains_key(&activity.id) {
            return Err(Error::Conflict(format!(
                "Activity {} already exists",
                activity.id
            )));
        }
        state
            .activities
            .insert(activity.id.clone(), activity.clone());
        Ok(())
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        Ok(self.state.read().await.activities.get(id).cloned())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        let state = self.state.read().await;
        let mut activities: Vec<Activity> = state
            .activities
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        activities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(activities)
    }

    async fn commit_transition(
        &self,
        id: &str,
        transition: &ActivityTransition,
    ) -> Result<CompareAndSet<Activity>> {
        let mut state = self.state.write().await;
        let activity = state
            .activities
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Activity {} not found", id)))?;

        if activity.version != transition.expected_version {
            return Ok(CompareAndSet::Lost);
        }

        activity.current_department = transition.department;
        activity.status = transition.status;
        activity.version += 1;
        activity.updated_at = transition.entry.timestamp;
        activity.history.push(transition.entry.clone());

        Ok(CompareAndSet::Applied(activity.clone()))
    }
}

#[async_trait]
impl ReprintRequestStore for MemoryStore {
    async fn insert_pending(&self, request: &ReprintRequest) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.activities.contains_key(&request.activity_id) {
            return Err(Error::NotFound(format!(
                "Activity {} not found",
                request.activity_id
            )));
        }

        let already_pending = state
            .reprints
            .values()
            .any(|r| r.activity_id == request.activity_id && r.is_pending());
        if already_pending {
            return Err(Error::Conflict(format!(
                "Activity {} already has a pending reprint request",
                request.activity_id
            )));
        }

        state.reprints.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_reprint(&self, id: Uuid) -> Result<Option<ReprintRequest>> {
        Ok(self.state.read().await.reprints.get(&id).cloned())
    }

    async fn list_reprints(&self, filter: &ReprintFilter) -> Result<Vec<ReprintRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<ReprintRequest> = state
            .reprints
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn resolve(
        &self,
        id: Uuid,
        resolution: &ReprintResolution,
    ) -> Result<CompareAndSet<ReprintRequest>> {
        let mut state = self.state.write().await;
        let request = state
            .reprints
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Reprint request {} not found", id)))?;

        if !request.is_pending() {
            return Ok(CompareAndSet::Lost);
        }

        request.status = resolution.resolution.into();
        request.processed_by = Some(resolution.processed_by.clone());
        request.processed_at = Some(resolution.processed_at);

        Ok(CompareAndSet::Applied(request.clone()))
    }
}
