//! QoS levels and the subscription set.

use rowbridge_core::ConfigError;

/// MQTT quality-of-service level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QosLevel {
    /// At most once delivery (0)
    #[default]
    AtMostOnce,
    /// At least once delivery (1)
    AtLeastOnce,
    /// Exactly once delivery (2)
    ExactlyOnce,
}

impl QosLevel {
    /// Parse the configuration string form (`"0"`, `"1"` or `"2"`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidQos`] for non-numeric or
    /// out-of-range values.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        match input.trim() {
            "0" => Ok(Self::AtMostOnce),
            "1" => Ok(Self::AtLeastOnce),
            "2" => Ok(Self::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other.to_string())),
        }
    }

    /// Numeric level.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl From<QosLevel> for rumqttc::QoS {
    fn from(qos: QosLevel) -> Self {
        match qos {
            QosLevel::AtMostOnce => Self::AtMostOnce,
            QosLevel::AtLeastOnce => Self::AtLeastOnce,
            QosLevel::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// Ordered list of `(topic, QoS)` pairs, re-applied in full after every
/// successful connect.
///
/// An empty set means the connection is publish-only.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    entries: Vec<(String, QosLevel)>,
}

impl SubscriptionSet {
    /// An empty set (publisher role).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from explicit `(topic, QoS)` pairs.
    #[must_use]
    pub fn new(entries: Vec<(String, QosLevel)>) -> Self {
        Self { entries }
    }

    /// Build a set subscribing to every topic at the same QoS.
    #[must_use]
    pub fn uniform(topics: Vec<String>, qos: QosLevel) -> Self {
        Self {
            entries: topics.into_iter().map(|t| (t, qos)).collect(),
        }
    }

    /// The ordered `(topic, QoS)` pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, QosLevel)] {
        &self.entries
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_parse_levels() {
        assert_eq!(QosLevel::parse("0").unwrap(), QosLevel::AtMostOnce);
        assert_eq!(QosLevel::parse("1").unwrap(), QosLevel::AtLeastOnce);
        assert_eq!(QosLevel::parse(" 2 ").unwrap(), QosLevel::ExactlyOnce);
    }

    #[test]
    fn qos_parse_rejects_out_of_range_and_garbage() {
        assert!(matches!(
            QosLevel::parse("3"),
            Err(ConfigError::InvalidQos(_))
        ));
        assert!(matches!(
            QosLevel::parse("fast"),
            Err(ConfigError::InvalidQos(_))
        ));
    }

    #[test]
    fn uniform_set_keeps_order() {
        let set = SubscriptionSet::uniform(
            vec!["a/#".to_string(), "b/+".to_string()],
            QosLevel::AtLeastOnce,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.pairs()[0].0, "a/#");
        assert_eq!(set.pairs()[1].0, "b/+");
    }
}
