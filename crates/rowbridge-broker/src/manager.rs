//! Connection lifecycle state machine.

use tokio::sync::{mpsc, Mutex};

use crate::client::{BrokerClient, BrokerEvent};
use crate::endpoint::BrokerEndpoint;
use crate::error::{ConnectError, PublishError};
use crate::subscription::{QosLevel, SubscriptionSet};

/// Lifecycle state of one broker connection.
///
/// Owned exclusively by [`ConnectionManager`]; no other component
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the only state `connect` accepts
    Disconnected,
    /// Connect sequence in flight
    Connecting,
    /// Live connection with subscriptions applied
    Connected,
    /// Connection loss observed, single reconnect attempt in flight
    ReconnectPending,
    /// Connect or reconnect failed; terminal for this step instance
    Failed,
}

struct Inner<C> {
    client: C,
    state: ConnectionState,
}

/// Owns the broker client handle and serializes every lifecycle
/// transition.
///
/// `connect`, `reconnect`, `disconnect` and `publish` all go through
/// one async lock, so the reconnect triggered by an asynchronous
/// connection-loss event can never race an explicit teardown or the
/// publish path. The subscription set is re-applied in full after
/// every successful connect.
pub struct ConnectionManager<C> {
    endpoint: BrokerEndpoint,
    subscriptions: SubscriptionSet,
    inner: Mutex<Inner<C>>,
}

impl<C: BrokerClient> ConnectionManager<C> {
    /// Create a manager for the given endpoint and subscription set.
    ///
    /// An empty subscription set makes this a publish-only connection.
    #[must_use]
    pub fn new(client: C, endpoint: BrokerEndpoint, subscriptions: SubscriptionSet) -> Self {
        Self {
            endpoint,
            subscriptions,
            inner: Mutex::new(Inner {
                client,
                state: ConnectionState::Disconnected,
            }),
        }
    }

    /// The endpoint this manager connects to.
    #[must_use]
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// The subscription set applied after every successful connect.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Establish the connection and apply the subscription set.
    ///
    /// Valid only from `Disconnected`. On success the state is
    /// `Connected` and the client's event channel is returned; on
    /// failure the state is `Failed` and the error is surfaced
    /// synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] from any step of the connect sequence.
    pub async fn connect(&self) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Disconnected {
            return Err(ConnectError::InvalidState {
                state: inner.state,
                operation: "connect",
            });
        }
        inner.state = ConnectionState::Connecting;
        self.establish(&mut inner).await
    }

    /// Handle an asynchronous connection loss with a single reconnect
    /// attempt.
    ///
    /// Valid from `Connected`. The dead handle is discarded and the
    /// same connect sequence runs once more, subscriptions included.
    /// On failure the state is `Failed` and stays there; no further
    /// attempts are made. Called after the connection was already torn
    /// down (`Disconnected`), this returns `Ok(None)` — teardown
    /// interrupting a pending reconnect is valid, not an error.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectError`] of the failed attempt, or
    /// [`ConnectError::InvalidState`] once the connection is `Failed`.
    pub async fn reconnect(&self) -> Result<Option<mpsc::Receiver<BrokerEvent>>, ConnectError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::Connected => {}
            ConnectionState::Disconnected => return Ok(None),
            state => {
                return Err(ConnectError::InvalidState {
                    state,
                    operation: "reconnect",
                });
            }
        }
        inner.state = ConnectionState::ReconnectPending;

        // A client handle is never reused across connects.
        if let Err(e) = inner.client.disconnect().await {
            tracing::debug!(error = %e, "discarding dead client handle");
        }

        tracing::info!(broker = %self.endpoint.broker_url, "attempting to reconnect");
        self.establish(&mut inner).await.map(Some)
    }

    /// Publish one payload on the established connection.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::InvalidState`] unless the connection is
    /// `Connected`, or [`PublishError::Rejected`] from the client.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(PublishError::InvalidState(inner.state));
        }
        inner.client.publish(topic, qos, payload).await
    }

    /// Tear the connection down.
    ///
    /// Valid from any state, idempotent, and safe to call at teardown
    /// even if the connection was never established. Always lands in
    /// `Disconnected`.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.client.disconnect().await {
            tracing::warn!(error = %e, "error closing broker client");
        }
        if inner.state == ConnectionState::Connected {
            tracing::info!("disconnected from MQTT broker");
        }
        inner.state = ConnectionState::Disconnected;
    }

    /// Shared tail of `connect` and `reconnect`: network connect, then
    /// the full subscription set in one subscribe call.
    async fn establish(
        &self,
        inner: &mut Inner<C>,
    ) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError> {
        match inner.client.connect(&self.endpoint).await {
            Ok(events) => {
                if !self.subscriptions.is_empty() {
                    if let Err(e) = inner.client.subscribe(&self.subscriptions).await {
                        inner.state = ConnectionState::Failed;
                        if let Err(teardown) = inner.client.disconnect().await {
                            tracing::debug!(error = %teardown, "teardown after failed subscribe");
                        }
                        return Err(e);
                    }
                }
                inner.state = ConnectionState::Connected;
                Ok(events)
            }
            Err(e) => {
                inner.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect,
        Subscribe(Vec<(String, u8)>),
        Publish { topic: String, payload: Vec<u8> },
        Disconnect,
    }

    /// Scripted in-memory client; connect failures are consumed in
    /// order, an empty script means success.
    #[derive(Default)]
    struct MockClient {
        calls: Arc<StdMutex<Vec<Call>>>,
        connect_failures: Arc<StdMutex<VecDeque<ConnectError>>>,
        subscribe_failures: Arc<StdMutex<VecDeque<ConnectError>>>,
        // Keeps event channels open for the lifetime of the test.
        senders: Arc<StdMutex<Vec<mpsc::Sender<BrokerEvent>>>>,
    }

    impl MockClient {
        fn recorded(&self) -> Arc<StdMutex<Vec<Call>>> {
            self.calls.clone()
        }

        fn fail_next_connect(&self, error: ConnectError) {
            self.connect_failures.lock().unwrap().push_back(error);
        }
    }

    impl BrokerClient for MockClient {
        async fn connect(
            &mut self,
            _endpoint: &BrokerEndpoint,
        ) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError> {
            self.calls.lock().unwrap().push(Call::Connect);
            if let Some(error) = self.connect_failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            let (tx, rx) = mpsc::channel(8);
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }

        async fn subscribe(
            &mut self,
            subscriptions: &SubscriptionSet,
        ) -> Result<(), ConnectError> {
            let pairs = subscriptions
                .pairs()
                .iter()
                .map(|(t, q)| (t.clone(), q.as_u8()))
                .collect();
            self.calls.lock().unwrap().push(Call::Subscribe(pairs));
            if let Some(error) = self.subscribe_failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            Ok(())
        }

        async fn publish(
            &mut self,
            topic: &str,
            _qos: QosLevel,
            payload: Vec<u8>,
        ) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(Call::Publish {
                topic: topic.to_string(),
                payload,
            });
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ConnectError> {
            self.calls.lock().unwrap().push(Call::Disconnect);
            Ok(())
        }
    }

    fn subscriber_manager(client: MockClient) -> ConnectionManager<MockClient> {
        ConnectionManager::new(
            client,
            BrokerEndpoint::default(),
            SubscriptionSet::uniform(
                vec!["sensors/#".to_string(), "devices/+".to_string()],
                QosLevel::AtLeastOnce,
            ),
        )
    }

    fn connect_count(calls: &StdMutex<Vec<Call>>) -> usize {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::Connect)
            .count()
    }

    fn subscribe_calls(calls: &StdMutex<Vec<Call>>) -> Vec<Vec<(String, u8)>> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(pairs) => Some(pairs.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn connect_applies_full_subscription_set() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = subscriber_manager(client);

        manager.connect().await.unwrap();

        assert_eq!(manager.state().await, ConnectionState::Connected);
        let subs = subscribe_calls(&calls);
        assert_eq!(subs.len(), 1);
        assert_eq!(
            subs[0],
            vec![("sensors/#".to_string(), 1), ("devices/+".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn publish_only_connection_skips_subscribe() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = ConnectionManager::new(
            client,
            BrokerEndpoint::default(),
            SubscriptionSet::empty(),
        );

        manager.connect().await.unwrap();

        assert!(subscribe_calls(&calls).is_empty());
    }

    #[tokio::test]
    async fn connect_failure_is_failed_state() {
        let client = MockClient::default();
        client.fail_next_connect(ConnectError::Connection("refused".to_string()));
        let manager = subscriber_manager(client);

        assert!(manager.connect().await.is_err());
        assert_eq!(manager.state().await, ConnectionState::Failed);
    }

    #[tokio::test]
    async fn connect_from_connected_is_invalid() {
        let manager = subscriber_manager(MockClient::default());
        manager.connect().await.unwrap();

        assert!(matches!(
            manager.connect().await,
            Err(ConnectError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn reconnect_reapplies_subscriptions() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = subscriber_manager(client);

        manager.connect().await.unwrap();
        let events = manager.reconnect().await.unwrap();

        assert!(events.is_some());
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert_eq!(connect_count(&calls), 2);

        let subs = subscribe_calls(&calls);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0], subs[1]);
    }

    #[tokio::test]
    async fn reconnect_attempts_exactly_once_then_fails_terminally() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = subscriber_manager(client);

        manager.connect().await.unwrap();

        // Script the single reconnect attempt to fail.
        {
            let inner = manager.inner.lock().await;
            inner
                .client
                .fail_next_connect(ConnectError::Connection("gone".to_string()));
        }

        assert!(manager.reconnect().await.is_err());
        assert_eq!(manager.state().await, ConnectionState::Failed);
        assert_eq!(connect_count(&calls), 2);

        // Further reconnects report the failed state without touching
        // the client again.
        assert!(matches!(
            manager.reconnect().await,
            Err(ConnectError::InvalidState {
                state: ConnectionState::Failed,
                ..
            })
        ));
        assert_eq!(connect_count(&calls), 2);
    }

    #[tokio::test]
    async fn reconnect_after_teardown_is_an_interruption() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = subscriber_manager(client);

        manager.connect().await.unwrap();
        manager.disconnect().await;

        let before = connect_count(&calls);
        assert!(manager.reconnect().await.unwrap().is_none());
        assert_eq!(connect_count(&calls), before);
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let manager = subscriber_manager(MockClient::default());

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        manager.connect().await.unwrap();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn publish_requires_connected_state() {
        let client = MockClient::default();
        let calls = client.recorded();
        let manager = subscriber_manager(client);

        assert!(matches!(
            manager.publish("t", QosLevel::AtMostOnce, vec![1]).await,
            Err(PublishError::InvalidState(ConnectionState::Disconnected))
        ));

        manager.connect().await.unwrap();
        manager
            .publish("t", QosLevel::AtMostOnce, vec![1, 2])
            .await
            .unwrap();

        let recorded = calls.lock().unwrap();
        assert!(recorded.contains(&Call::Publish {
            topic: "t".to_string(),
            payload: vec![1, 2],
        }));
    }

    #[tokio::test]
    async fn subscribe_failure_fails_the_connect() {
        let client = MockClient::default();
        client
            .subscribe_failures
            .lock()
            .unwrap()
            .push_back(ConnectError::Subscribe("denied".to_string()));
        let manager = subscriber_manager(client);

        assert!(matches!(
            manager.connect().await,
            Err(ConnectError::Subscribe(_))
        ));
        assert_eq!(manager.state().await, ConnectionState::Failed);
    }
}
