//! End-to-end round trip through a real MQTT broker.
//!
//! Skipped unless `ROWBRIDGE_INTEGRATION=1`; point
//! `ROWBRIDGE_MQTT_BROKER` at a broker (default `tcp://localhost:1883`).

use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use rowbridge_broker::{
    BrokerEndpoint, ConnectionManager, QosLevel, RumqttBroker, SubscriptionSet,
};
use rowbridge_core::{FieldSchema, FieldValue, Row, RowSchema, SemanticType};
use rowbridge_steps::{Publisher, Subscriber, SubscriberConfig, TopicSpec};

fn endpoint(client_id: String, keep_alive: bool) -> BrokerEndpoint {
    let broker = std::env::var("ROWBRIDGE_MQTT_BROKER")
        .unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    BrokerEndpoint {
        broker_url: broker,
        client_id,
        credentials: None,
        tls: None,
        connect_timeout_secs: "10".to_string(),
        keep_alive_secs: keep_alive.then(|| "5".to_string()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_subscribe_roundtrip() {
    if std::env::var("ROWBRIDGE_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set ROWBRIDGE_INTEGRATION=1 to run");
        return;
    }

    let topic = format!("rowbridge/it/{}", Uuid::new_v4());

    // Subscriber side first, so the subscription is live before the
    // publish.
    let sub_manager = ConnectionManager::new(
        RumqttBroker::new(),
        endpoint(format!("sub-{}", Uuid::new_v4()), true),
        SubscriptionSet::uniform(vec![topic.clone()], QosLevel::AtLeastOnce),
    );
    let mut subscriber = Subscriber::new(
        sub_manager,
        &SubscriberConfig {
            message_type: SemanticType::Integer64,
            allow_object_messages: false,
            run_duration: Duration::ZERO,
        },
    )
    .unwrap();
    subscriber.start().await.unwrap();

    // Publisher side.
    let schema = RowSchema::new(vec![FieldSchema::new("reading", SemanticType::Integer64)]);
    let pub_manager = ConnectionManager::new(
        RumqttBroker::new(),
        endpoint(format!("pub-{}", Uuid::new_v4()), false),
        SubscriptionSet::empty(),
    );
    let publisher = Publisher::new(
        pub_manager,
        &schema,
        "reading",
        &TopicSpec::Static(topic.clone()),
        "1",
        false,
    )
    .unwrap();
    publisher.start().await.unwrap();

    let row = Row::new(vec![FieldValue::Integer64(42)]);
    publisher.process_row(&row).await.unwrap();

    let received = timeout(Duration::from_secs(5), subscriber.next_row())
        .await
        .expect("timeout waiting for MQTT message")
        .unwrap()
        .expect("subscriber stopped early");

    assert_eq!(
        received.values(),
        &[FieldValue::Text(topic), FieldValue::Integer64(42)]
    );

    publisher.stop().await;
    subscriber.stop().await;
}
