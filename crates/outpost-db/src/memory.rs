//! In-process task store.
//!
//! Mirrors the PostgreSQL claim semantics: a claimed id is held in a lock set
//! until the claim commits or is dropped, and other callers skip it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use outpost_core::models::{TaskPayload, TaskRecord, TaskState};

use crate::availability::Availability;
use crate::store::{fill_state_counts, ClaimOutcome, ClaimedTask, TaskStore};

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, TaskRecord>,
    claimed: HashSet<Uuid>,
}

#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer-side insert of a fresh record.
    pub fn enqueue(&self, payload: TaskPayload, now: DateTime<Utc>) -> TaskRecord {
        let record = TaskRecord::new(payload, now);
        self.insert(record.clone());
        record
    }

    /// Insert or replace a record as-is.
    pub fn insert(&self, record: TaskRecord) {
        lock(&self.inner).records.insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        lock(&self.inner).records.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<TaskRecord> {
        lock(&self.inner).records.values().cloned().collect()
    }

    /// Withdraws an enqueued, unclaimed record. Returns whether it was deleted.
    pub fn delete(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let mut inner = lock(&self.inner);
        if inner.claimed.contains(&id) {
            return false;
        }
        match inner.records.get_mut(&id) {
            Some(record) => record.mark_deleted(now).is_ok(),
            None => false,
        }
    }

    pub fn is_claimed(&self, id: Uuid) -> bool {
        lock(&self.inner).claimed.contains(&id)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn claim_one(&self, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let availability = Availability::at(now);
        let mut inner = lock(&self.inner);

        let candidate = inner
            .records
            .values()
            .filter(|r| availability.admits(r) && !inner.claimed.contains(&r.id))
            .min_by_key(|r| r.visible_after)
            .cloned();

        match candidate {
            Some(record) => {
                inner.claimed.insert(record.id);
                tracing::trace!(task_id = %record.id, "Task claimed");
                Ok(ClaimOutcome::Found(Box::new(MemoryClaim {
                    inner: Arc::clone(&self.inner),
                    record,
                    staged: None,
                    released: false,
                })))
            }
            None => Ok(ClaimOutcome::NotFound),
        }
    }

    async fn count_by_state(&self) -> Result<Vec<(TaskState, i64)>> {
        let inner = lock(&self.inner);
        let counts: Vec<(TaskState, i64)> = inner
            .records
            .values()
            .map(|record| (record.state, 1))
            .collect();
        Ok(fill_state_counts(&counts))
    }
}

struct MemoryClaim {
    inner: Arc<Mutex<Inner>>,
    record: TaskRecord,
    staged: Option<TaskRecord>,
    released: bool,
}

impl MemoryClaim {
    fn release(&mut self, apply: bool) {
        if self.released {
            return;
        }
        let mut inner = lock(&self.inner);
        if apply {
            if let Some(staged) = self.staged.take() {
                inner.records.insert(staged.id, staged);
            }
        }
        inner.claimed.remove(&self.record.id);
        self.released = true;
    }
}

#[async_trait]
impl ClaimedTask for MemoryClaim {
    fn record(&self) -> &TaskRecord {
        &self.record
    }

    async fn save(&mut self, record: &TaskRecord) -> Result<()> {
        if record.id != self.record.id {
            return Err(anyhow!(
                "Cannot save task {} through the claim on task {}",
                record.id,
                self.record.id
            ));
        }
        self.staged = Some(record.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.release(true);
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        // Uncommitted claims roll back.
        self.release(false);
    }
}
