//! Broker client seam and the rumqttc implementation.

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, SubscribeFilter,
    Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rowbridge_core::ConfigError;

use crate::endpoint::{parse_broker_url, BrokerEndpoint, TransportScheme};
use crate::error::{ConnectError, PublishError};
use crate::subscription::{QosLevel, SubscriptionSet};
use crate::transport::{PemTransportFactory, SecureTransport};

/// Capacity of the broker event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// One message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Events surfaced by a broker client over its event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A message arrived on a subscribed topic
    Message(InboundMessage),
    /// The connection was lost; exactly one such event is sent before
    /// the client goes quiet
    ConnectionLost(String),
}

/// The seam between the connection manager and a concrete MQTT client.
///
/// `connect` hands back the receiving end of the client's event
/// channel; message delivery and the asynchronous connection-loss
/// notification both arrive there, so callers consume them from their
/// own task instead of being re-entered from the client's I/O thread.
#[allow(async_fn_in_trait)]
pub trait BrokerClient: Send {
    /// Run the connect sequence against the given endpoint.
    ///
    /// Each call builds a fresh underlying client handle; handles are
    /// never reused across connects.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] with a distinct variant for each step
    /// of the sequence that can fail.
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
    ) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError>;

    /// Apply the full subscription set in a single subscribe call.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Subscribe`] if the broker rejects the
    /// call or no connection is live.
    async fn subscribe(&mut self, subscriptions: &SubscriptionSet) -> Result<(), ConnectError>;

    /// Publish one payload.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if no connection is live or the client
    /// rejects the publish.
    async fn publish(
        &mut self,
        topic: &str,
        qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), PublishError>;

    /// Tear down the live connection, if any. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] only for unexpected teardown failures.
    async fn disconnect(&mut self) -> Result<(), ConnectError>;
}

struct ActiveClient {
    client: AsyncClient,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// [`BrokerClient`] backed by rumqttc.
pub struct RumqttBroker<T: SecureTransport = PemTransportFactory> {
    transport_factory: T,
    active: Option<ActiveClient>,
}

impl RumqttBroker<PemTransportFactory> {
    /// Create a client using the default PEM file transport factory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(PemTransportFactory)
    }
}

impl Default for RumqttBroker<PemTransportFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SecureTransport> RumqttBroker<T> {
    /// Create a client with a custom secure-transport collaborator.
    #[must_use]
    pub fn with_transport(transport_factory: T) -> Self {
        Self {
            transport_factory,
            active: None,
        }
    }

    fn build_options(&self, endpoint: &BrokerEndpoint) -> Result<MqttOptions, ConnectError> {
        if endpoint.broker_url.trim().is_empty() {
            return Err(ConfigError::MissingBrokerUrl.into());
        }
        if endpoint.client_id.trim().is_empty() {
            return Err(ConfigError::MissingClientId.into());
        }

        let address = parse_broker_url(&endpoint.broker_url)?;

        // rumqttc expects the full URL as the broker address for
        // websocket transports.
        let host = match address.scheme {
            TransportScheme::Ws | TransportScheme::Wss => endpoint.broker_url.clone(),
            TransportScheme::Tcp | TransportScheme::Tls => address.host.clone(),
        };

        let mut options = MqttOptions::new(endpoint.client_id.clone(), host, address.port);

        if address.scheme.is_secured() {
            let material = endpoint.tls.as_ref().ok_or_else(|| {
                ConnectError::Tls(format!(
                    "broker URL {} requires TLS material but none is configured",
                    endpoint.broker_url
                ))
            })?;
            let tls = self.transport_factory.transport(material)?;
            let transport = match address.scheme {
                TransportScheme::Wss => Transport::Wss(tls),
                _ => Transport::Tls(tls),
            };
            options.set_transport(transport);
            tracing::info!(host = %address.host, "TLS transport enabled");
        } else if address.scheme == TransportScheme::Ws {
            options.set_transport(Transport::Ws);
        }

        if let Some(credentials) = &endpoint.credentials {
            options.set_credentials(credentials.username.clone(), credentials.password.clone());
        }

        // Prior session state held by the broker for this client id is
        // always discarded.
        options.set_clean_session(true);

        if let Some(keep_alive) = &endpoint.keep_alive_secs {
            let secs: u64 = keep_alive
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidKeepAlive(keep_alive.clone()))?;
            // rumqttc requires keep-alives of at least 5 seconds; 0
            // keeps the library default.
            match secs {
                0 => {}
                1..=4 => return Err(ConfigError::InvalidKeepAlive(keep_alive.clone()).into()),
                _ => {
                    options.set_keep_alive(Duration::from_secs(secs));
                }
            }
        }

        Ok(options)
    }
}

impl<T: SecureTransport> BrokerClient for RumqttBroker<T> {
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
    ) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError> {
        if self.active.is_some() {
            return Err(ConnectError::Connection(
                "a client handle is already live; disconnect first".to_string(),
            ));
        }

        let options = self.build_options(endpoint)?;
        let timeout_secs: u64 = endpoint
            .connect_timeout_secs
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimeout(endpoint.connect_timeout_secs.clone()))?;

        tracing::info!(
            broker = %endpoint.broker_url,
            client_id = %endpoint.client_id,
            "connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

        // Drive the event loop until the broker acknowledges the
        // connection. A timeout of 0 waits indefinitely.
        let connack = wait_for_connack(&mut eventloop);
        let result = if timeout_secs == 0 {
            connack.await
        } else {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), connack).await {
                Ok(result) => result,
                Err(_) => return Err(ConnectError::Timeout(timeout_secs)),
            }
        };
        result?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(drive_eventloop(eventloop, tx, closing.clone()));

        self.active = Some(ActiveClient {
            client,
            closing,
            task,
        });

        Ok(rx)
    }

    async fn subscribe(&mut self, subscriptions: &SubscriptionSet) -> Result<(), ConnectError> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| ConnectError::Subscribe("client not connected".to_string()))?;

        let filters: Vec<SubscribeFilter> = subscriptions
            .pairs()
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), (*qos).into()))
            .collect();

        tracing::info!(count = filters.len(), "subscribing to topics");

        active
            .client
            .subscribe_many(filters)
            .await
            .map_err(|e| ConnectError::Subscribe(e.to_string()))
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let active = self.active.as_ref().ok_or(PublishError::NotConnected)?;

        active
            .client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        if let Some(active) = self.active.take() {
            active.closing.store(true, Ordering::Relaxed);
            if let Err(e) = active.client.disconnect().await {
                tracing::debug!(error = %e, "disconnect while tearing down client");
            }
            active.task.abort();
        }
        Ok(())
    }
}

/// Poll until the broker acknowledges the connection.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                if connack.code == ConnectReturnCode::Success {
                    tracing::info!("connected to MQTT broker");
                    return Ok(());
                }
                return Err(ConnectError::Refused(format!("{:?}", connack.code)));
            }
            Ok(_) => {}
            Err(e) => return Err(ConnectError::Connection(e.to_string())),
        }
    }
}

/// Forward broker traffic into the event channel.
///
/// Sending a message may block when the consumer applies backpressure;
/// that is deliberate — delivery runs on this task, not inside the
/// pipeline worker, and rumqttc keeps servicing the connection
/// meanwhile. On a poll error the task emits exactly one
/// `ConnectionLost` event and exits; the dead handle is discarded and
/// any reconnect builds a fresh client.
async fn drive_eventloop(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<BrokerEvent>,
    closing: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if tx.send(BrokerEvent::Message(message)).await.is_err() {
                    tracing::debug!(topic = %publish.topic, "no event consumer, dropping message");
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::info!("subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                if closing.load(Ordering::Relaxed) {
                    break;
                }
                tracing::error!(error = %e, "lost connection to MQTT broker");
                let _ = tx.send(BrokerEvent::ConnectionLost(e.to_string())).await;
                break;
            }
        }
    }
}
