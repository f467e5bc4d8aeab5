//! Publish-topic resolution.

use rowbridge_core::{ConfigError, FieldValue, Row, RowSchema, SemanticType};

use crate::publisher::PublisherError;

/// Where the publish topic comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSpec {
    /// One fixed topic for every row, resolved at configuration time
    Static(String),
    /// The topic is read per row from the named text field
    FromField(String),
}

impl TopicSpec {
    /// Validate against the input schema and bind field-based topics
    /// to their column index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingTopic`] for a blank static topic,
    /// [`ConfigError::TopicFieldMissing`] if the named field is absent,
    /// or [`ConfigError::TopicFieldNotText`] if it is not of text type.
    pub fn bind(&self, schema: &RowSchema) -> Result<TopicBinding, ConfigError> {
        match self {
            Self::Static(topic) => {
                if topic.trim().is_empty() {
                    return Err(ConfigError::MissingTopic);
                }
                Ok(TopicBinding::Static(topic.clone()))
            }
            Self::FromField(name) => {
                let index = schema
                    .index_of(name)
                    .ok_or_else(|| ConfigError::TopicFieldMissing(name.clone()))?;
                let field = schema.field(index).expect("index came from the schema");
                if field.semantic_type != SemanticType::Text {
                    return Err(ConfigError::TopicFieldNotText(name.clone()));
                }
                Ok(TopicBinding::FromField {
                    name: name.clone(),
                    index,
                })
            }
        }
    }
}

/// A [`TopicSpec`] validated against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicBinding {
    /// Fixed topic
    Static(String),
    /// Per-row topic from a bound column
    FromField {
        /// Field name, kept for error messages
        name: String,
        /// Column index in the input schema
        index: usize,
    },
}

impl TopicBinding {
    /// Resolve the topic for one row.
    ///
    /// Returns `Ok(None)` when a field-sourced topic value is null or
    /// blank — the row is skipped, not failed.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::SchemaViolation`] if the bound column
    /// carries a non-text value at runtime.
    pub fn resolve(&self, row: &Row) -> Result<Option<String>, PublisherError> {
        match self {
            Self::Static(topic) => Ok(Some(topic.clone())),
            Self::FromField { name, index } => match row.get(*index) {
                None | Some(FieldValue::Null) => Ok(None),
                Some(FieldValue::Text(s)) if s.trim().is_empty() => Ok(None),
                Some(FieldValue::Text(s)) => Ok(Some(s.clone())),
                Some(other) => Err(PublisherError::SchemaViolation(format!(
                    "topic field {name:?} carried a {} value",
                    other.kind()
                ))),
            },
        }
    }
}
