//! Subscribe-and-emit step.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use rowbridge_broker::{BrokerClient, BrokerEvent, ConnectError, ConnectionManager};
use rowbridge_core::{
    CodecError, ConfigError, FieldValue, Row, RowSchema, RowSink, SemanticType, SinkError,
    ValueCodec,
};

/// Subscriber step configuration, validated at construction.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Declared semantic type of arriving message payloads
    pub message_type: SemanticType,
    /// Whether `OpaqueObject` messages may be deserialized
    pub allow_object_messages: bool,
    /// Wall-clock bound on the run; zero runs until stopped
    pub run_duration: Duration,
}

/// Turns arriving broker messages into `(Topic, Message)` rows.
///
/// The broker client's delivery task enqueues raw messages onto a
/// channel; this step decodes and emits them from the pipeline's own
/// worker task, one call to [`Subscriber::next_row`] at a time.
pub struct Subscriber<C> {
    manager: ConnectionManager<C>,
    codec: ValueCodec,
    output_schema: RowSchema,
    run_duration: Duration,
    events: Option<mpsc::Receiver<BrokerEvent>>,
    started_at: Option<Instant>,
    reconnect_failed: Option<String>,
}

impl<C: BrokerClient> Subscriber<C> {
    /// Validate the step configuration.
    ///
    /// Declaring `OpaqueObject` messages without the explicit
    /// allow-object flag fails initialization; refusing to deserialize
    /// arbitrary object graphs is the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ObjectMessagesNotAllowed`] for the gate
    /// above, or [`ConfigError::NoTopics`] when the manager carries no
    /// subscriptions.
    pub fn new(manager: ConnectionManager<C>, config: &SubscriberConfig) -> Result<Self, ConfigError> {
        if config.message_type == SemanticType::OpaqueObject && !config.allow_object_messages {
            return Err(ConfigError::ObjectMessagesNotAllowed);
        }
        if manager.subscriptions().is_empty() {
            return Err(ConfigError::NoTopics);
        }

        Ok(Self {
            manager,
            codec: ValueCodec::new(config.message_type)
                .with_allow_opaque(config.allow_object_messages),
            output_schema: RowSchema::subscriber_output(config.message_type),
            run_duration: config.run_duration,
            events: None,
            started_at: None,
            reconnect_failed: None,
        })
    }

    /// The schema of emitted rows: `(Topic: Text, Message: <declared>)`.
    #[must_use]
    pub fn output_schema(&self) -> &RowSchema {
        &self.output_schema
    }

    /// Open the connection; subscriptions are applied by the manager.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] from the connect sequence.
    pub async fn start(&mut self) -> Result<(), ConnectError> {
        let events = self.manager.connect().await?;
        self.events = Some(events);
        Ok(())
    }

    /// Produce the next row, or `None` when the step is done.
    ///
    /// The first call starts the run-duration clock. `None` is
    /// returned when the duration has elapsed (regardless of queued
    /// arrivals), or when the connection was deliberately torn down.
    /// A lost connection triggers one reconnect attempt through the
    /// manager; if that fails, this call and every later one report
    /// [`SubscriberError::ReconnectFailed`] instead of claiming more
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriberError::Codec`] (fatal for the step) when a
    /// payload cannot be decoded, or
    /// [`SubscriberError::ReconnectFailed`] after a failed reconnect.
    pub async fn next_row(&mut self) -> Result<Option<Row>, SubscriberError> {
        loop {
            if let Some(reason) = &self.reconnect_failed {
                return Err(SubscriberError::ReconnectFailed(reason.clone()));
            }

            let started = *self.started_at.get_or_insert_with(Instant::now);
            let deadline = if self.run_duration.is_zero() {
                None
            } else {
                Some(started + self.run_duration)
            };

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::info!("run duration elapsed, stopping");
                    return Ok(None);
                }
            }

            let events = self.events.as_mut().ok_or(SubscriberError::NotStarted)?;

            let event = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        tracing::info!("run duration elapsed, stopping");
                        return Ok(None);
                    }
                },
                None => events.recv().await,
            };

            match event {
                Some(BrokerEvent::Message(message)) => {
                    let value = self.codec.decode(&message.payload)?;
                    return Ok(Some(Row::new(vec![
                        FieldValue::Text(message.topic),
                        value,
                    ])));
                }
                Some(BrokerEvent::ConnectionLost(reason)) => {
                    tracing::warn!(reason = %reason, "lost connection to broker, attempting to reconnect");
                    match self.manager.reconnect().await {
                        Ok(Some(events)) => {
                            self.events = Some(events);
                        }
                        // Torn down while the loss event was in flight.
                        Ok(None) => return Ok(None),
                        Err(e) => {
                            self.reconnect_failed = Some(e.to_string());
                        }
                    }
                }
                // The client's delivery task ended without a loss
                // event: deliberate disconnect.
                None => return Ok(None),
            }
        }
    }

    /// Drain rows into the given sink until the step finishes.
    ///
    /// # Errors
    ///
    /// Propagates [`SubscriberError`] from [`Subscriber::next_row`] or
    /// the sink.
    pub async fn run(&mut self, sink: &mut impl RowSink) -> Result<(), SubscriberError> {
        while let Some(row) = self.next_row().await? {
            sink.put_row(row)?;
        }
        Ok(())
    }

    /// Tear down the connection, interrupting a pending reconnect if
    /// one is mid-flight. Idempotent.
    pub async fn stop(&mut self) {
        self.manager.disconnect().await;
        self.events = None;
    }
}

/// Errors from the subscriber step.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriberError {
    /// `next_row` called before `start`
    #[error("subscriber not started")]
    NotStarted,
    /// The single reconnect attempt failed; the step must stop
    #[error("reconnect to MQTT broker failed: {0}")]
    ReconnectFailed(String),
    /// An arriving payload could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The downstream sink is gone
    #[error(transparent)]
    Sink(#[from] SinkError),
}
