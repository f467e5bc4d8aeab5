//! Startup configuration errors.
//!
//! Every variant here is fatal at step initialization, raised before
//! the first row is processed.

/// Errors in the step configuration surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Broker URL missing or blank
    #[error("no broker URL configured")]
    MissingBrokerUrl,
    /// Client identifier missing or blank
    #[error("no client identifier configured")]
    MissingClientId,
    /// Connection timeout is not an integer
    #[error("invalid connection timeout: {0:?}")]
    InvalidTimeout(String),
    /// Keep-alive interval is not an integer
    #[error("invalid keep-alive interval: {0:?}")]
    InvalidKeepAlive(String),
    /// QoS is not an integer in 0..=2
    #[error("invalid QoS value: {0:?} (expected 0, 1 or 2)")]
    InvalidQos(String),
    /// Run duration is not an integer
    #[error("invalid run duration: {0:?}")]
    InvalidDuration(String),
    /// The configured message field is absent from the row schema
    #[error("input stream does not contain the field {0:?}")]
    MissingField(String),
    /// The configured topic field is absent from the row schema
    #[error("input stream does not contain the topic field {0:?}")]
    TopicFieldMissing(String),
    /// The configured topic field is not of text type
    #[error("topic field {0:?} must be of text type")]
    TopicFieldNotText(String),
    /// No publish topic configured
    #[error("no topic configured")]
    MissingTopic,
    /// No subscribe topics configured
    #[error("no topic(s) to subscribe to provided")]
    NoTopics,
    /// Unrecognized semantic type name
    #[error("unknown semantic type: {0:?}")]
    UnknownSemanticType(String),
    /// Declared message type is `OpaqueObject` but object messages are
    /// not allowed
    #[error("message type is opaque_object but object messages are not enabled")]
    ObjectMessagesNotAllowed,
    /// A boolean flag is neither true/false nor 1/0
    #[error("invalid boolean flag {name}: {value:?}")]
    InvalidFlag {
        /// Flag name
        name: String,
        /// Offending value
        value: String,
    },
}
