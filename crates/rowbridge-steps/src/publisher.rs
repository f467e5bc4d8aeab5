//! Per-row encode-and-publish step.

use rowbridge_broker::{
    BrokerClient, ConnectError, ConnectionManager, PublishError, QosLevel,
};
use rowbridge_core::{CodecError, ConfigError, FieldValue, Row, RowSchema, ValueCodec};

use crate::topic::{TopicBinding, TopicSpec};

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row's value was published
    Published,
    /// The row was skipped (null/empty value or null/blank topic)
    Skipped,
}

/// Publishes one row at a time onto the broker.
///
/// All configuration is validated up front; [`Publisher::new`] fails
/// before the first row ever reaches [`Publisher::process_row`].
pub struct Publisher<C> {
    manager: ConnectionManager<C>,
    codec: ValueCodec,
    message_index: usize,
    topic: TopicBinding,
    qos: QosLevel,
    error_handling: bool,
}

impl<C: BrokerClient> Publisher<C> {
    /// Validate the step configuration against the input schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the message field is absent, the
    /// topic binding is invalid, or the QoS string is not 0, 1 or 2.
    pub fn new(
        manager: ConnectionManager<C>,
        schema: &RowSchema,
        message_field: &str,
        topic: &TopicSpec,
        qos: &str,
        error_handling: bool,
    ) -> Result<Self, ConfigError> {
        let message_index = schema
            .index_of(message_field)
            .ok_or_else(|| ConfigError::MissingField(message_field.to_string()))?;
        let semantic_type = schema
            .field(message_index)
            .expect("index came from the schema")
            .semantic_type;
        let topic = topic.bind(schema)?;
        let qos = QosLevel::parse(qos)?;

        Ok(Self {
            manager,
            codec: ValueCodec::new(semantic_type),
            message_index,
            topic,
            qos,
            error_handling,
        })
    }

    /// Whether step-level error handling is enabled; when it is, a
    /// failed row is diverted and processing continues, otherwise the
    /// first failure stops the pipeline.
    #[must_use]
    pub fn error_handling(&self) -> bool {
        self.error_handling
    }

    /// Open the broker connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] from the connect sequence.
    pub async fn start(&self) -> Result<(), ConnectError> {
        // The publish-only event channel is dropped here; connection
        // loss surfaces as a publish failure on the next row.
        self.manager.connect().await.map(drop)
    }

    /// Encode and publish one row.
    ///
    /// A null or empty message value, or a null/blank field-sourced
    /// topic, skips the row without error.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError`] for codec, schema, or publish
    /// failures; the caller applies the per-row error policy.
    pub async fn process_row(&self, row: &Row) -> Result<RowOutcome, PublisherError> {
        let value = row.get(self.message_index).unwrap_or(&FieldValue::Null);
        let Some(payload) = self.codec.encode(value)? else {
            tracing::debug!("incoming message value is null/empty - skipping");
            return Ok(RowOutcome::Skipped);
        };

        let Some(topic) = self.topic.resolve(row)? else {
            tracing::debug!("incoming topic value is null/empty - skipping message");
            return Ok(RowOutcome::Skipped);
        };

        tracing::debug!(topic = %topic, qos = self.qos.as_u8(), payload_len = payload.len(), "publishing row");
        self.manager.publish(&topic, self.qos, payload).await?;
        Ok(RowOutcome::Published)
    }

    /// Tear down the broker connection. Idempotent.
    pub async fn stop(&self) {
        self.manager.disconnect().await;
    }
}

/// Errors processing one row.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublisherError {
    /// The row value could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The broker rejected or failed the publish
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// The row does not match the schema the step was bound against
    #[error("row does not match the bound schema: {0}")]
    SchemaViolation(String),
}
