//! # rowbridge Steps
//!
//! The two pipeline steps bridging rows and an MQTT broker:
//!
//! - [`Publisher`]: per-row encode-and-publish onto a static or
//!   row-supplied topic
//! - [`Subscriber`]: subscribe, decode arriving payloads, and emit
//!   `(Topic, Message)` rows
//!
//! The pipeline driver calls each step's per-row entry point from a
//! single worker task per step instance; broker callbacks never
//! re-enter pipeline code directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod publisher;
pub mod subscriber;
pub mod topic;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{BridgeConfig, PublishSettings, SubscribeSettings};
pub use publisher::{Publisher, PublisherError, RowOutcome};
pub use subscriber::{Subscriber, SubscriberConfig, SubscriberError};
pub use topic::{TopicBinding, TopicSpec};
