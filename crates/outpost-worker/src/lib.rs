//! Outpost Worker – the consumer side of the task-dispatch system.
//!
//! Producers insert enqueued records into the task store; each [`Consumer`]
//! claims one eligible record at a time, hands it to the configured
//! [`Publisher`](outpost_publishers::Publisher) and records success, a
//! backed-off retry or a terminal failure. The [`Supervisor`] runs several
//! loops plus the queue-depth reporter until a [`ShutdownFlag`] is raised.

pub mod consumer;
pub mod metrics;
pub mod retry;
pub mod shutdown;
pub mod supervisor;

pub use consumer::{Consumer, CycleOutcome};
pub use metrics::{DepthReporter, TaskMetrics};
pub use retry::RetryPolicy;
pub use shutdown::{install_signal_handlers, ShutdownFlag};
pub use supervisor::Supervisor;
