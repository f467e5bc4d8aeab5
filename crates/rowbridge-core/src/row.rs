//! Row and schema model shared by the publisher and subscriber steps.

use serde::{Deserialize, Serialize};

use crate::value::{FieldValue, SemanticType};

/// A named, typed column in a row schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// Declared semantic type
    pub semantic_type: SemanticType,
}

impl FieldSchema {
    /// Create a new field schema.
    #[must_use]
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

/// An ordered set of typed fields describing a row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    fields: Vec<FieldSchema>,
}

impl RowSchema {
    /// Create a schema from a list of fields.
    #[must_use]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    /// The schema a subscriber step emits: `(Topic: Text, Message: <declared>)`.
    #[must_use]
    pub fn subscriber_output(message_type: SemanticType) -> Self {
        Self::new(vec![
            FieldSchema::new("Topic", SemanticType::Text),
            FieldSchema::new("Message", message_type),
        ])
    }

    /// Index of the named field, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field at the given index.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&FieldSchema> {
        self.fields.get(index)
    }

    /// All fields, in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One row of values, ordered to match a [`RowSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<FieldValue>,
}

impl Row {
    /// Create a row from ordered values.
    #[must_use]
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    /// Value at the given column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// All values, in order.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

/// Downstream consumer of subscriber rows.
///
/// `put_row` may block on backpressure; callers hand rows over from
/// their own worker task, never from the broker client's delivery
/// thread, so blocking here is acceptable and does not starve the
/// client's internal processing.
pub trait RowSink: Send {
    /// Deliver one row downstream.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the downstream consumer is gone.
    fn put_row(&mut self, row: Row) -> Result<(), SinkError>;
}

/// Errors delivering rows to a sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The downstream consumer has stopped accepting rows
    #[error("row sink closed: {0}")]
    Closed(String),
}
