//! Outpost Core – shared types for the reliable task-dispatch consumer.
//!
//! This crate holds the [`TaskRecord`](models::TaskRecord) state machine, the
//! environment-driven [`Config`], the [`OutpostError`] type and the [`Clock`]
//! abstraction used by stores and the consumer loop.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PublisherConfig, PublisherKind, WorkerConfig};
pub use error::OutpostError;
