pub mod task;

pub use task::{TaskPayload, TaskRecord, TaskState};
