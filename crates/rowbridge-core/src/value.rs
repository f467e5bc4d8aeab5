//! Semantic value types carried through the bridge.
//!
//! Every field that crosses the broker boundary is tagged with a
//! [`SemanticType`], declared once per step configuration and fixed for
//! the lifetime of a running step instance. The matching runtime value
//! is a [`FieldValue`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Nanoseconds in one second; the upper bound for a nanosecond-of-second
/// adjustment.
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// The closed set of value kinds the codec knows how to put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// UTF-8 text
    Text,
    /// 64-bit signed integer
    Integer64,
    /// 64-bit IEEE-754 float
    Float64,
    /// Instant with millisecond precision (epoch milliseconds on the wire)
    DateMillis,
    /// Instant with a separate nanosecond-of-second adjustment
    TimestampMillisNanos,
    /// Raw bytes, passed through unmodified
    Binary,
    /// Boolean
    Boolean,
    /// Opaque serialized object graph
    OpaqueObject,
}

impl SemanticType {
    /// Canonical configuration name for this type.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer64 => "integer64",
            Self::Float64 => "float64",
            Self::DateMillis => "date_millis",
            Self::TimestampMillisNanos => "timestamp_millis_nanos",
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::OpaqueObject => "opaque_object",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SemanticType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "integer64" => Ok(Self::Integer64),
            "float64" => Ok(Self::Float64),
            "date_millis" => Ok(Self::DateMillis),
            "timestamp_millis_nanos" => Ok(Self::TimestampMillisNanos),
            "binary" => Ok(Self::Binary),
            "boolean" => Ok(Self::Boolean),
            "opaque_object" => Ok(Self::OpaqueObject),
            other => Err(ConfigError::UnknownSemanticType(other.to_string())),
        }
    }
}

/// An instant carrying epoch milliseconds plus a nanosecond-of-second
/// adjustment.
///
/// The adjustment covers the full sub-second range, so `nanos` is always
/// `< 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampValue {
    /// Milliseconds since the UNIX epoch
    pub epoch_millis: i64,
    /// Nanosecond-of-second adjustment
    pub nanos: u32,
}

impl TimestampValue {
    /// Create a new timestamp value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueParseError::NanosOutOfRange`] if `nanos` is not a
    /// valid nanosecond-of-second adjustment.
    pub fn new(epoch_millis: i64, nanos: u32) -> Result<Self, ValueParseError> {
        if nanos >= NANOS_PER_SECOND {
            return Err(ValueParseError::NanosOutOfRange(nanos));
        }
        Ok(Self {
            epoch_millis,
            nanos,
        })
    }
}

/// A runtime value tagged with its semantic kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value
    Null,
    /// UTF-8 text
    Text(String),
    /// 64-bit signed integer
    Integer64(i64),
    /// 64-bit float
    Float64(f64),
    /// Millisecond-precision instant
    DateMillis(DateTime<Utc>),
    /// Instant with nanosecond-of-second adjustment
    Timestamp(TimestampValue),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Boolean
    Boolean(bool),
    /// Opaque object graph
    Opaque(serde_json::Value),
}

impl FieldValue {
    /// Short name of the value's kind, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Integer64(_) => "integer64",
            Self::Float64(_) => "float64",
            Self::DateMillis(_) => "date_millis",
            Self::Timestamp(_) => "timestamp_millis_nanos",
            Self::Binary(_) => "binary",
            Self::Boolean(_) => "boolean",
            Self::Opaque(_) => "opaque_object",
        }
    }

    /// Whether this value is [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Parse a configuration or CLI string into a value of the given
    /// semantic type.
    ///
    /// Text maps to the string itself, binary to the string's UTF-8
    /// bytes, dates to epoch milliseconds, timestamps to
    /// `<millis>[:<nanos>]`, and opaque objects to a JSON literal.
    ///
    /// # Errors
    ///
    /// Returns [`ValueParseError`] if the string does not parse as the
    /// requested type.
    pub fn parse(semantic_type: SemanticType, input: &str) -> Result<Self, ValueParseError> {
        fn invalid(semantic_type: SemanticType, input: &str) -> ValueParseError {
            ValueParseError::Invalid {
                semantic_type,
                input: input.to_string(),
            }
        }

        match semantic_type {
            SemanticType::Text => Ok(Self::Text(input.to_string())),
            SemanticType::Integer64 => input
                .parse::<i64>()
                .map(Self::Integer64)
                .map_err(|_| invalid(semantic_type, input)),
            SemanticType::Float64 => input
                .parse::<f64>()
                .map(Self::Float64)
                .map_err(|_| invalid(semantic_type, input)),
            SemanticType::DateMillis => {
                let millis = input
                    .parse::<i64>()
                    .map_err(|_| invalid(semantic_type, input))?;
                date_from_millis(millis).ok_or_else(|| invalid(semantic_type, input))
            }
            SemanticType::TimestampMillisNanos => {
                let (millis_part, nanos_part) = match input.split_once(':') {
                    Some((m, n)) => (m, n),
                    None => (input, "0"),
                };
                let millis = millis_part
                    .parse::<i64>()
                    .map_err(|_| invalid(semantic_type, input))?;
                let nanos = nanos_part
                    .parse::<u32>()
                    .map_err(|_| invalid(semantic_type, input))?;
                Ok(Self::Timestamp(TimestampValue::new(millis, nanos)?))
            }
            SemanticType::Binary => Ok(Self::Binary(input.as_bytes().to_vec())),
            SemanticType::Boolean => match input.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Self::Boolean(true)),
                "false" | "0" => Ok(Self::Boolean(false)),
                _ => Err(invalid(semantic_type, input)),
            },
            SemanticType::OpaqueObject => serde_json::from_str(input)
                .map(Self::Opaque)
                .map_err(|_| invalid(semantic_type, input)),
        }
    }
}

/// Build a UTC instant from epoch milliseconds, if representable.
#[must_use]
pub fn date_from_millis(millis: i64) -> Option<FieldValue> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(FieldValue::DateMillis)
}

/// Errors parsing a string into a [`FieldValue`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueParseError {
    /// The string does not parse as the requested type
    #[error("cannot parse {input:?} as {semantic_type}")]
    Invalid {
        /// Requested semantic type
        semantic_type: SemanticType,
        /// Offending input
        input: String,
    },
    /// Nanosecond adjustment out of range
    #[error("nanosecond-of-second adjustment out of range: {0}")]
    NanosOutOfRange(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_roundtrip() {
        for ty in [
            SemanticType::Text,
            SemanticType::Integer64,
            SemanticType::Float64,
            SemanticType::DateMillis,
            SemanticType::TimestampMillisNanos,
            SemanticType::Binary,
            SemanticType::Boolean,
            SemanticType::OpaqueObject,
        ] {
            assert_eq!(ty.name().parse::<SemanticType>().unwrap(), ty);
        }
    }

    #[test]
    fn type_name_unknown() {
        assert!(matches!(
            "varchar".parse::<SemanticType>(),
            Err(ConfigError::UnknownSemanticType(_))
        ));
    }

    #[test]
    fn parse_integer() {
        let v = FieldValue::parse(SemanticType::Integer64, "-42").unwrap();
        assert_eq!(v, FieldValue::Integer64(-42));
    }

    #[test]
    fn parse_timestamp_with_nanos() {
        let v = FieldValue::parse(SemanticType::TimestampMillisNanos, "1500:123456789").unwrap();
        assert_eq!(
            v,
            FieldValue::Timestamp(TimestampValue {
                epoch_millis: 1500,
                nanos: 123_456_789,
            })
        );
    }

    #[test]
    fn parse_timestamp_nanos_out_of_range() {
        assert!(matches!(
            FieldValue::parse(SemanticType::TimestampMillisNanos, "0:1000000000"),
            Err(ValueParseError::NanosOutOfRange(_))
        ));
    }

    #[test]
    fn parse_boolean_forms() {
        assert_eq!(
            FieldValue::parse(SemanticType::Boolean, "1").unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            FieldValue::parse(SemanticType::Boolean, "false").unwrap(),
            FieldValue::Boolean(false)
        );
        assert!(FieldValue::parse(SemanticType::Boolean, "yes").is_err());
    }

    #[test]
    fn parse_opaque_json() {
        let v = FieldValue::parse(SemanticType::OpaqueObject, r#"{"a": 1}"#).unwrap();
        assert_eq!(v, FieldValue::Opaque(serde_json::json!({"a": 1})));
    }
}
