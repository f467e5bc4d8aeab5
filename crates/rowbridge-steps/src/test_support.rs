//! Scripted broker client shared by the step tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

use rowbridge_broker::{
    BrokerClient, BrokerEndpoint, BrokerEvent, ConnectError, PublishError, SubscriptionSet,
};

/// One recorded client call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Connect,
    Subscribe(Vec<(String, u8)>),
    Publish {
        topic: String,
        qos: u8,
        payload: Vec<u8>,
    },
    Disconnect,
}

/// In-memory [`BrokerClient`] that records calls, lets tests inject
/// broker events, and consumes scripted failures in order.
#[derive(Default)]
pub(crate) struct RecordingClient {
    pub(crate) calls: Arc<StdMutex<Vec<Call>>>,
    pub(crate) connect_failures: Arc<StdMutex<VecDeque<ConnectError>>>,
    pub(crate) publish_failures: Arc<StdMutex<VecDeque<PublishError>>>,
    /// Sender for each connect's event channel, in connect order.
    pub(crate) event_senders: Arc<StdMutex<Vec<mpsc::Sender<BrokerEvent>>>>,
}

impl RecordingClient {
    pub(crate) fn fail_next_publish(&self, error: PublishError) {
        self.publish_failures.lock().unwrap().push_back(error);
    }
}

impl BrokerClient for RecordingClient {
    async fn connect(
        &mut self,
        _endpoint: &BrokerEndpoint,
    ) -> Result<mpsc::Receiver<BrokerEvent>, ConnectError> {
        self.calls.lock().unwrap().push(Call::Connect);
        if let Some(error) = self.connect_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(16);
        self.event_senders.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn subscribe(&mut self, subscriptions: &SubscriptionSet) -> Result<(), ConnectError> {
        let pairs = subscriptions
            .pairs()
            .iter()
            .map(|(t, q)| (t.clone(), q.as_u8()))
            .collect();
        self.calls.lock().unwrap().push(Call::Subscribe(pairs));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: rowbridge_broker::QosLevel,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        if let Some(error) = self.publish_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.calls.lock().unwrap().push(Call::Publish {
            topic: topic.to_string(),
            qos: qos.as_u8(),
            payload,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        self.calls.lock().unwrap().push(Call::Disconnect);
        Ok(())
    }
}
