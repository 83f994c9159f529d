//! Outpost Publishers
//!
//! This crate provides the [`Publisher`] trait and its adapters: SNS topics,
//! SQS queues, an HTTP task runner and a logging dry-run adapter. Each network
//! adapter sits behind its own cargo feature; [`create_publisher`] resolves the
//! configured [`PublisherKind`] to an adapter once at startup.
//!
//! Adapters perform exactly one delivery per `publish` call and never retry;
//! the consumer loop owns the retry policy.

#[cfg(any(feature = "publisher-sns", feature = "publisher-sqs"))]
pub(crate) mod aws;
pub mod factory;
#[cfg(feature = "publisher-http")]
pub mod http;
pub mod log;
#[cfg(feature = "publisher-sns")]
pub mod sns;
#[cfg(feature = "publisher-sqs")]
pub mod sqs;
pub mod traits;

// Re-export commonly used types
pub use factory::create_publisher;
#[cfg(feature = "publisher-http")]
pub use http::HttpPublisher;
pub use log::LogPublisher;
pub use outpost_core::PublisherKind;
#[cfg(feature = "publisher-sns")]
pub use sns::SnsPublisher;
#[cfg(feature = "publisher-sqs")]
pub use sqs::SqsPublisher;
pub use traits::{Publisher, PublisherError, PublisherResult};
