//! Outpost DB – task record storage.
//!
//! The [`TaskStore`] trait is the only shared mutable resource in the system:
//! consumers claim one eligible record at a time under an exclusive lock, apply
//! their state transition, save it and commit. [`PgTaskStore`] backs this with
//! a PostgreSQL transaction and `FOR UPDATE SKIP LOCKED`; [`MemoryTaskStore`]
//! provides the same semantics in-process.

pub mod availability;
pub mod memory;
pub mod postgres;
pub mod store;

pub use availability::Availability;
pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;
pub use store::{ClaimOutcome, ClaimedTask, TaskStore};
