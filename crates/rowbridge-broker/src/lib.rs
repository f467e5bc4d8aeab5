//! # rowbridge Broker
//!
//! MQTT connection lifecycle for rowbridge.
//!
//! This crate provides:
//! - [`BrokerEndpoint`]: the immutable description of one broker connection
//! - [`SecureTransport`]: the collaborator seam producing TLS transports
//! - [`BrokerClient`]: the client trait, with the rumqttc implementation
//! - [`ConnectionManager`]: the connect/reconnect/disconnect state machine
//!
//! The manager serializes every state transition behind one lock; the
//! asynchronous connection-loss notification is delivered over a channel
//! and handled through the same lock, never on the broker client's own
//! delivery task.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod subscription;
pub mod transport;

pub use client::{BrokerClient, BrokerEvent, InboundMessage, RumqttBroker};
pub use endpoint::{BrokerAddress, BrokerEndpoint, Credentials, TlsMaterial, TransportScheme};
pub use error::{ConnectError, PublishError};
pub use manager::{ConnectionManager, ConnectionState};
pub use subscription::{QosLevel, SubscriptionSet};
pub use transport::{PemTransportFactory, SecureTransport};
