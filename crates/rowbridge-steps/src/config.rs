//! Bridge configuration.
//!
//! The persisted configuration surface arrives as strings; numeric
//! fields (QoS, timeout, keep-alive, run duration) are kept in string
//! form here. QoS and duration are parsed at step startup, timeout and
//! keep-alive during the connect sequence.

use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use rowbridge_broker::{
    BrokerEndpoint, Credentials, QosLevel, SubscriptionSet, TlsMaterial,
};
use rowbridge_core::ConfigError;

use crate::subscriber::SubscriberConfig;
use crate::topic::TopicSpec;

/// Publisher-side settings.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Static topic, or the topic field name when
    /// [`PublishSettings::topic_from_field`] is set
    pub topic: String,
    /// Read the topic per row from the field named by `topic`
    pub topic_from_field: bool,
    /// Name of the input field whose value is published
    pub message_field: String,
    /// Divert failed rows instead of stopping the pipeline
    pub error_handling: bool,
}

/// Subscriber-side settings.
#[derive(Debug, Clone)]
pub struct SubscribeSettings {
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Semantic type name of arriving message payloads
    pub message_type: String,
    /// Allow deserializing `opaque_object` messages
    pub allow_object_messages: bool,
    /// Run duration in seconds; "0" runs until stopped
    pub run_duration_secs: String,
}

/// Full bridge configuration for either role.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Broker URL
    pub broker_url: String,
    /// Client identifier; generated when left blank
    pub client_id: String,
    /// QoS as the configuration string ("0", "1" or "2")
    pub qos: String,
    /// Connection timeout in seconds, as a string
    pub connect_timeout_secs: String,
    /// Keep-alive interval in seconds, as a string (subscriber role)
    pub keep_alive_secs: String,
    /// Username, when the broker requires authentication
    pub username: Option<String>,
    /// Password, when the broker requires authentication
    pub password: Option<String>,
    /// TLS material for secured broker URLs
    pub tls: Option<TlsMaterial>,
    /// Publisher settings
    pub publish: PublishSettings,
    /// Subscriber settings
    pub subscribe: SubscribeSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: String::new(),
            qos: "0".to_string(),
            connect_timeout_secs: "30".to_string(),
            keep_alive_secs: "60".to_string(),
            username: None,
            password: None,
            tls: None,
            publish: PublishSettings {
                topic: String::new(),
                topic_from_field: false,
                message_field: "message".to_string(),
                error_handling: false,
            },
            subscribe: SubscribeSettings {
                topics: Vec::new(),
                message_type: "text".to_string(),
                allow_object_messages: false,
                run_duration_secs: "0".to_string(),
            },
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ROWBRIDGE_BROKER_URL`: broker URL
    /// - `ROWBRIDGE_CLIENT_ID`: client identifier
    /// - `ROWBRIDGE_QOS`: QoS level (0-2)
    /// - `ROWBRIDGE_CONNECT_TIMEOUT`: connect timeout seconds
    /// - `ROWBRIDGE_KEEP_ALIVE`: keep-alive seconds (subscriber)
    /// - `ROWBRIDGE_USERNAME` / `ROWBRIDGE_PASSWORD`: authentication
    /// - `ROWBRIDGE_TLS_CA_FILE` / `ROWBRIDGE_TLS_CERT_FILE` /
    ///   `ROWBRIDGE_TLS_KEY_FILE` / `ROWBRIDGE_TLS_KEY_PASSWORD`: TLS
    /// - `ROWBRIDGE_TOPIC`: publish topic (or topic field name)
    /// - `ROWBRIDGE_TOPIC_FROM_FIELD`: read topic per row from a field
    /// - `ROWBRIDGE_MESSAGE_FIELD`: published input field
    /// - `ROWBRIDGE_ERROR_HANDLING`: divert failed rows
    /// - `ROWBRIDGE_TOPICS`: comma-separated subscribe topics
    /// - `ROWBRIDGE_MESSAGE_TYPE`: semantic type of inbound payloads
    /// - `ROWBRIDGE_ALLOW_OBJECT_MESSAGES`: allow opaque objects
    /// - `ROWBRIDGE_RUN_DURATION`: subscriber run bound in seconds
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFlag`] for boolean variables that
    /// are not `true`/`false`/`1`/`0`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("ROWBRIDGE_BROKER_URL") {
            config.broker_url = url;
        }
        if let Ok(id) = std::env::var("ROWBRIDGE_CLIENT_ID") {
            config.client_id = id;
        }
        if let Ok(qos) = std::env::var("ROWBRIDGE_QOS") {
            config.qos = qos;
        }
        if let Ok(timeout) = std::env::var("ROWBRIDGE_CONNECT_TIMEOUT") {
            config.connect_timeout_secs = timeout;
        }
        if let Ok(keep_alive) = std::env::var("ROWBRIDGE_KEEP_ALIVE") {
            config.keep_alive_secs = keep_alive;
        }
        if let Ok(username) = std::env::var("ROWBRIDGE_USERNAME") {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var("ROWBRIDGE_PASSWORD") {
            config.password = Some(password);
        }

        if let Ok(ca) = std::env::var("ROWBRIDGE_TLS_CA_FILE") {
            config.tls = Some(TlsMaterial {
                ca_cert: PathBuf::from(ca),
                client_cert: std::env::var("ROWBRIDGE_TLS_CERT_FILE")
                    .ok()
                    .map(PathBuf::from),
                client_key: std::env::var("ROWBRIDGE_TLS_KEY_FILE")
                    .ok()
                    .map(PathBuf::from),
                key_password: std::env::var("ROWBRIDGE_TLS_KEY_PASSWORD").ok(),
            });
        }

        if let Ok(topic) = std::env::var("ROWBRIDGE_TOPIC") {
            config.publish.topic = topic;
        }
        if let Ok(flag) = std::env::var("ROWBRIDGE_TOPIC_FROM_FIELD") {
            config.publish.topic_from_field = parse_flag("ROWBRIDGE_TOPIC_FROM_FIELD", &flag)?;
        }
        if let Ok(field) = std::env::var("ROWBRIDGE_MESSAGE_FIELD") {
            config.publish.message_field = field;
        }
        if let Ok(flag) = std::env::var("ROWBRIDGE_ERROR_HANDLING") {
            config.publish.error_handling = parse_flag("ROWBRIDGE_ERROR_HANDLING", &flag)?;
        }

        if let Ok(topics) = std::env::var("ROWBRIDGE_TOPICS") {
            config.subscribe.topics = topics
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(message_type) = std::env::var("ROWBRIDGE_MESSAGE_TYPE") {
            config.subscribe.message_type = message_type;
        }
        if let Ok(flag) = std::env::var("ROWBRIDGE_ALLOW_OBJECT_MESSAGES") {
            config.subscribe.allow_object_messages =
                parse_flag("ROWBRIDGE_ALLOW_OBJECT_MESSAGES", &flag)?;
        }
        if let Ok(duration) = std::env::var("ROWBRIDGE_RUN_DURATION") {
            config.subscribe.run_duration_secs = duration;
        }

        if config.client_id.trim().is_empty() {
            config.client_id = format!("rowbridge-{}", Uuid::new_v4());
        }

        Ok(config)
    }

    /// Broker endpoint for the publisher role (no keep-alive override).
    #[must_use]
    pub fn publisher_endpoint(&self) -> BrokerEndpoint {
        self.endpoint(false)
    }

    /// Broker endpoint for the subscriber role.
    #[must_use]
    pub fn subscriber_endpoint(&self) -> BrokerEndpoint {
        self.endpoint(true)
    }

    fn endpoint(&self, with_keep_alive: bool) -> BrokerEndpoint {
        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        BrokerEndpoint {
            broker_url: self.broker_url.clone(),
            client_id: self.client_id.clone(),
            credentials,
            tls: self.tls.clone(),
            connect_timeout_secs: self.connect_timeout_secs.clone(),
            keep_alive_secs: with_keep_alive.then(|| self.keep_alive_secs.clone()),
        }
    }

    /// The publish-topic specification.
    #[must_use]
    pub fn topic_spec(&self) -> TopicSpec {
        if self.publish.topic_from_field {
            TopicSpec::FromField(self.publish.topic.clone())
        } else {
            TopicSpec::Static(self.publish.topic.clone())
        }
    }

    /// The subscriber's subscription set, every topic at the configured
    /// QoS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoTopics`] without any topics, or
    /// [`ConfigError::InvalidQos`] for a bad QoS string.
    pub fn subscriptions(&self) -> Result<SubscriptionSet, ConfigError> {
        if self.subscribe.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        let qos = QosLevel::parse(&self.qos)?;
        Ok(SubscriptionSet::uniform(self.subscribe.topics.clone(), qos))
    }

    /// The subscriber step configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSemanticType`] for a bad type name
    /// or [`ConfigError::InvalidDuration`] for a non-numeric duration.
    pub fn subscriber_settings(&self) -> Result<SubscriberConfig, ConfigError> {
        let message_type = self.subscribe.message_type.parse()?;
        let seconds: u64 = self
            .subscribe
            .run_duration_secs
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(self.subscribe.run_duration_secs.clone()))?;

        Ok(SubscriberConfig {
            message_type,
            allow_object_messages: self.subscribe.allow_object_messages,
            run_duration: Duration::from_secs(seconds),
        })
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
