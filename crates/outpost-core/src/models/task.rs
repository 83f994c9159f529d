use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::OutpostError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "task_state", rename_all = "lowercase")
)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Enqueued,
    Succeeded,
    Failed,
    Deleted,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Enqueued,
        TaskState::Succeeded,
        TaskState::Failed,
        TaskState::Deleted,
    ];

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Enqueued => "enqueued",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Deleted => "deleted",
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(TaskState::Enqueued),
            "succeeded" => Ok(TaskState::Succeeded),
            "failed" => Ok(TaskState::Failed),
            "deleted" => Ok(TaskState::Deleted),
            _ => Err(anyhow::anyhow!("Invalid task state: {}", s)),
        }
    }
}

/// What gets delivered: a backend destination (topic ARN, queue URL, task
/// name) and an opaque JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub destination: String,
    pub body: serde_json::Value,
}

impl TaskPayload {
    pub fn new(destination: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            destination: destination.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub state: TaskState,
    pub payload: TaskPayload,
    pub number_of_attempts: i32,
    pub visible_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub succeeded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub stacktrace: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for TaskRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(TaskRecord {
            id: row.try_get("id")?,
            state: row.try_get("state")?,
            payload: TaskPayload {
                destination: row.try_get("destination")?,
                body: row.try_get("body")?,
            },
            number_of_attempts: row.try_get("number_of_attempts")?,
            visible_after: row.try_get("visible_after")?,
            created_at: row.try_get("created_at")?,
            succeeded_at: row.try_get("succeeded_at")?,
            failed_at: row.try_get("failed_at")?,
            error_message: row.try_get("error_message")?,
            stacktrace: row.try_get("stacktrace")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TaskRecord {
    /// A fresh record as a producer would insert it: enqueued, zero attempts,
    /// visible immediately.
    pub fn new(payload: TaskPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TaskState::Enqueued,
            payload,
            number_of_attempts: 0,
            visible_after: now,
            created_at: now,
            succeeded_at: None,
            failed_at: None,
            error_message: None,
            stacktrace: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn ensure_enqueued(&self, to: TaskState) -> Result<(), OutpostError> {
        if self.state == TaskState::Enqueued {
            Ok(())
        } else {
            Err(OutpostError::InvalidTransition {
                task_id: self.id,
                from: self.state,
                to,
            })
        }
    }

    /// Counts one publish attempt. Returns the new attempt number.
    pub fn begin_attempt(&mut self) -> Result<i32, OutpostError> {
        self.ensure_enqueued(TaskState::Enqueued)?;
        self.number_of_attempts += 1;
        Ok(self.number_of_attempts)
    }

    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) -> Result<(), OutpostError> {
        self.ensure_enqueued(TaskState::Succeeded)?;
        self.state = TaskState::Succeeded;
        self.succeeded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Keeps the record enqueued but hides it until `now + backoff`.
    pub fn schedule_retry(
        &mut self,
        now: DateTime<Utc>,
        backoff: Duration,
    ) -> Result<DateTime<Utc>, OutpostError> {
        self.ensure_enqueued(TaskState::Enqueued)?;
        self.visible_after = now
            .checked_add_signed(backoff)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.updated_at = now;
        Ok(self.visible_after)
    }

    pub fn mark_failed(
        &mut self,
        now: DateTime<Utc>,
        error_message: impl Into<String>,
        stacktrace: impl Into<String>,
    ) -> Result<(), OutpostError> {
        self.ensure_enqueued(TaskState::Failed)?;
        self.state = TaskState::Failed;
        self.failed_at = Some(now);
        self.error_message = Some(error_message.into());
        self.stacktrace = Some(stacktrace.into());
        self.updated_at = now;
        Ok(())
    }

    /// External deletion; only pending work can be withdrawn.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> Result<(), OutpostError> {
        self.ensure_enqueued(TaskState::Deleted)?;
        self.state = TaskState::Deleted;
        self.updated_at = now;
        Ok(())
    }

    /// Time between creation and successful delivery.
    pub fn turnaround(&self) -> Option<Duration> {
        self.succeeded_at.map(|at| at - self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskPayload::new("arn:aws:sns:eu-west-1:123:orders", json!({"id": 1})),
            Utc::now(),
        )
    }

    #[test]
    fn new_record_is_enqueued_and_visible() {
        let r = record();
        assert_eq!(r.state, TaskState::Enqueued);
        assert_eq!(r.number_of_attempts, 0);
        assert_eq!(r.visible_after, r.created_at);
        assert!(r.succeeded_at.is_none() && r.failed_at.is_none());
    }

    #[test]
    fn success_sets_timestamp_once() {
        let mut r = record();
        r.begin_attempt().unwrap();
        let now = r.created_at + Duration::seconds(1);
        r.mark_succeeded(now).unwrap();

        assert_eq!(r.state, TaskState::Succeeded);
        assert_eq!(r.succeeded_at, Some(now));
        assert_eq!(r.turnaround(), Some(Duration::seconds(1)));
        assert!(r.mark_succeeded(now).is_err());
    }

    #[test]
    fn terminal_records_reject_every_transition() {
        let mut r = record();
        r.begin_attempt().unwrap();
        r.mark_failed(Utc::now(), "boom", "boom\n  at publish").unwrap();

        assert!(r.begin_attempt().is_err());
        assert!(r.mark_succeeded(Utc::now()).is_err());
        assert!(r.schedule_retry(Utc::now(), Duration::seconds(2)).is_err());
        assert!(r.mark_deleted(Utc::now()).is_err());
        assert_eq!(r.number_of_attempts, 1);
    }

    #[test]
    fn retry_moves_visibility_forward() {
        let mut r = record();
        let now = r.created_at;
        let visible = r.schedule_retry(now, Duration::seconds(4)).unwrap();
        assert_eq!(visible, now + Duration::seconds(4));
        assert_eq!(r.state, TaskState::Enqueued);
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in TaskState::ALL {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert!("running".parse::<TaskState>().is_err());
    }
}
