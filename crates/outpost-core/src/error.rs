//! Error types module
//!
//! `OutpostError` is the typed error raised by the task record state machine
//! and by configuration loading. Operation-level code wraps it in
//! `anyhow::Error` with context, the same way the repositories do.

use uuid::Uuid;

use crate::models::TaskState;

#[derive(Debug, thiserror::Error)]
pub enum OutpostError {
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskState,
        to: TaskState,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}
