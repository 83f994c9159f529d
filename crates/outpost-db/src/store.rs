//! Task store abstraction
//!
//! A claim is an open unit of work: the claimed row stays exclusively locked
//! until [`ClaimedTask::commit`] is called. Dropping a claim without committing
//! discards every saved change and releases the lock.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use outpost_core::models::{TaskRecord, TaskState};

/// Result of asking the store for work. An empty queue is not an error.
pub enum ClaimOutcome {
    Found(Box<dyn ClaimedTask>),
    NotFound,
}

impl ClaimOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ClaimOutcome::Found(_))
    }
}

impl fmt::Debug for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimOutcome::Found(claim) => f
                .debug_tuple("Found")
                .field(&claim.record().id)
                .finish(),
            ClaimOutcome::NotFound => f.write_str("NotFound"),
        }
    }
}

/// An exclusively held task record.
#[async_trait]
pub trait ClaimedTask: Send {
    /// The record as it was when claimed.
    fn record(&self) -> &TaskRecord;

    /// Persist every mutable field of `record` within the claim.
    /// `record.id` must match the claimed record.
    async fn save(&mut self, record: &TaskRecord) -> Result<()>;

    /// Make saved changes durable and release the claim.
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Claim exactly one record that is available at `now`.
    async fn claim_one(&self, now: DateTime<Utc>) -> Result<ClaimOutcome>;

    /// Number of records per state, one entry for every [`TaskState`].
    async fn count_by_state(&self) -> Result<Vec<(TaskState, i64)>>;
}

/// Expands partial counts so every state is reported, zero when absent.
pub(crate) fn fill_state_counts(counts: &[(TaskState, i64)]) -> Vec<(TaskState, i64)> {
    TaskState::ALL
        .iter()
        .map(|state| {
            let count = counts
                .iter()
                .filter(|(s, _)| s == state)
                .map(|(_, n)| *n)
                .sum();
            (*state, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_state_counts_reports_missing_states_as_zero() {
        let filled = fill_state_counts(&[(TaskState::Failed, 2), (TaskState::Enqueued, 5)]);
        assert_eq!(
            filled,
            vec![
                (TaskState::Enqueued, 5),
                (TaskState::Succeeded, 0),
                (TaskState::Failed, 2),
                (TaskState::Deleted, 0),
            ]
        );
    }
}
