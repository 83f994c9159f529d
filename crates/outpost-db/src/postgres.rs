//! PostgreSQL task store.
//!
//! A claim is a live transaction holding a `FOR UPDATE SKIP LOCKED` row lock:
//! concurrent consumers skip the row instead of waiting on it, and the row is
//! only released when the claim commits or is dropped (rolled back).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use outpost_core::models::{TaskPayload, TaskRecord, TaskState};

use crate::availability::AVAILABLE_PREDICATE;
use crate::store::{fill_state_counts, ClaimOutcome, ClaimedTask, TaskStore};

const TASK_COLUMNS: &str = r#"
    id,
    state,
    destination,
    body,
    number_of_attempts,
    visible_after,
    created_at,
    succeeded_at,
    failed_at,
    error_message,
    stacktrace,
    updated_at
"#;

#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and apply pending migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        tracing::info!(max_connections, "Database connected successfully");

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Producer-side insert of a fresh, immediately visible record.
    #[tracing::instrument(skip(self, payload), fields(destination = %payload.destination))]
    pub async fn enqueue(&self, payload: TaskPayload, now: DateTime<Utc>) -> Result<TaskRecord> {
        self.insert(&TaskRecord::new(payload, now)).await
    }

    /// Inserts a record as-is, e.g. one with a delayed `visible_after`.
    #[tracing::instrument(skip(self, record), fields(task_id = %record.id))]
    pub async fn insert(&self, record: &TaskRecord) -> Result<TaskRecord> {
        let sql = format!(
            r#"
            INSERT INTO outpost_tasks (
                id, state, destination, body, number_of_attempts,
                visible_after, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<Postgres, TaskRecord>(&sql)
            .bind(record.id)
            .bind(record.state)
            .bind(&record.payload.destination)
            .bind(&record.payload.body)
            .bind(record.number_of_attempts)
            .bind(record.visible_after)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert task")?;

        tracing::info!(task_id = %inserted.id, "Task enqueued");
        Ok(inserted)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM outpost_tasks WHERE id = $1");
        sqlx::query_as::<Postgres, TaskRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")
    }

    /// Withdraws an enqueued record. Returns whether a row was deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outpost_tasks
            SET state = 'deleted',
                updated_at = $2
            WHERE id = $1 AND state = 'enqueued'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to delete task")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[tracing::instrument(skip(self))]
    async fn claim_one(&self, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM outpost_tasks
            WHERE {AVAILABLE_PREDICATE}
            ORDER BY visible_after ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        );

        let record: Option<TaskRecord> = sqlx::query_as::<Postgres, TaskRecord>(&sql)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch next task")?;

        match record {
            Some(record) => {
                tracing::debug!(
                    task_id = %record.id,
                    attempts = record.number_of_attempts,
                    "Task claimed"
                );
                Ok(ClaimOutcome::Found(Box::new(PgClaim { tx, record })))
            }
            None => {
                tx.rollback().await.ok();
                Ok(ClaimOutcome::NotFound)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn count_by_state(&self) -> Result<Vec<(TaskState, i64)>> {
        let counts: Vec<(TaskState, i64)> = sqlx::query_as(
            r#"
            SELECT state, COUNT(*)
            FROM outpost_tasks
            GROUP BY state
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to count tasks by state")?;

        Ok(fill_state_counts(&counts))
    }
}

struct PgClaim {
    tx: Transaction<'static, Postgres>,
    record: TaskRecord,
}

#[async_trait]
impl ClaimedTask for PgClaim {
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

        let result = sqlx::query(
            r#"
            UPDATE outpost_tasks
            SET state = $2,
                number_of_attempts = $3,
                visible_after = $4,
                succeeded_at = $5,
                failed_at = $6,
                error_message = $7,
                stacktrace = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.state)
        .bind(record.number_of_attempts)
        .bind(record.visible_after)
        .bind(record.succeeded_at)
        .bind(record.failed_at)
        .bind(record.error_message.as_deref())
        .bind(record.stacktrace.as_deref())
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to save task")?;

        if result.rows_affected() != 1 {
            return Err(anyhow!("Task {} disappeared while claimed", record.id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let task_id = self.record.id;
        self.tx
            .commit()
            .await
            .with_context(|| format!("Failed to commit task {}", task_id))
    }
}
