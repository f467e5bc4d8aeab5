//! Typed binary codec between tagged values and MQTT payload bytes.
//!
//! Encodings are fixed and must stay bit-exact for interop with other
//! endpoints using the same scheme:
//!
//! | Semantic type | Wire encoding |
//! |---|---|
//! | `Text` | UTF-8 bytes, no length prefix, no terminator |
//! | `Integer64` / `DateMillis` | 8-byte big-endian signed integer |
//! | `Float64` | 8-byte big-endian IEEE-754 double |
//! | `TimestampMillisNanos` | 8-byte BE epoch-millis + 4-byte BE nanos |
//! | `Binary` | raw bytes, unmodified |
//! | `Boolean` | 1 byte; 0x00 = false, > 0 = true |
//! | `OpaqueObject` | CBOR object-graph serialization |
//!
//! Decoding tolerates compact widths from heterogeneous senders: a
//! 4-byte `Integer64` payload is read as a big-endian i32 and widened,
//! a 4-byte `Float64` payload as an f32 and widened.

use crate::value::{date_from_millis, FieldValue, SemanticType, TimestampValue, NANOS_PER_SECOND};

/// Codec for one declared semantic type.
///
/// Constructed once per step instance; both directions are pure and do
/// no I/O.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    semantic_type: SemanticType,
    allow_opaque: bool,
}

impl ValueCodec {
    /// Create a codec for the given declared type.
    ///
    /// Opaque object decoding starts disabled; see
    /// [`ValueCodec::with_allow_opaque`].
    #[must_use]
    pub fn new(semantic_type: SemanticType) -> Self {
        Self {
            semantic_type,
            allow_opaque: false,
        }
    }

    /// Permit (or forbid) decoding of `OpaqueObject` payloads.
    ///
    /// Deserializing arbitrary object graphs is refused by default as a
    /// security control; callers must opt in explicitly.
    #[must_use]
    pub fn with_allow_opaque(mut self, allow: bool) -> Self {
        self.allow_opaque = allow;
        self
    }

    /// The declared semantic type this codec was built for.
    #[must_use]
    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    /// Encode a value into payload bytes.
    ///
    /// Returns `Ok(None)` ("no bytes produced") for a null value or an
    /// empty text value; callers treat that as skip-this-row, not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedType`] if the value's kind does
    /// not match the declared type, and [`CodecError::NotSerializable`]
    /// if an opaque object graph cannot be serialized.
    pub fn encode(&self, value: &FieldValue) -> Result<Option<Vec<u8>>, CodecError> {
        if value.is_null() {
            return Ok(None);
        }
        if let FieldValue::Text(s) = value {
            if s.is_empty() {
                return Ok(None);
            }
        }

        let bytes = match (self.semantic_type, value) {
            (SemanticType::Text, FieldValue::Text(s)) => s.as_bytes().to_vec(),
            (SemanticType::Integer64, FieldValue::Integer64(i)) => i.to_be_bytes().to_vec(),
            (SemanticType::DateMillis, FieldValue::DateMillis(dt)) => {
                dt.timestamp_millis().to_be_bytes().to_vec()
            }
            (SemanticType::Float64, FieldValue::Float64(f)) => f.to_be_bytes().to_vec(),
            (SemanticType::TimestampMillisNanos, FieldValue::Timestamp(ts)) => {
                let mut bytes = Vec::with_capacity(12);
                bytes.extend_from_slice(&ts.epoch_millis.to_be_bytes());
                bytes.extend_from_slice(&ts.nanos.to_be_bytes());
                bytes
            }
            (SemanticType::Binary, FieldValue::Binary(b)) => b.clone(),
            (SemanticType::Boolean, FieldValue::Boolean(b)) => vec![u8::from(*b)],
            (SemanticType::OpaqueObject, FieldValue::Opaque(v)) => {
                let mut bytes = Vec::new();
                ciborium::into_writer(v, &mut bytes)
                    .map_err(|e| CodecError::NotSerializable(e.to_string()))?;
                bytes
            }
            (declared, other) => {
                return Err(CodecError::UnsupportedType {
                    declared,
                    actual: other.kind(),
                })
            }
        };

        Ok(Some(bytes))
    }

    /// Decode payload bytes into a value of the declared type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedInput`] for payloads that cannot
    /// be read as the declared type, and
    /// [`CodecError::NotSerializable`] for `OpaqueObject` payloads when
    /// opaque decoding is disabled.
    pub fn decode(&self, payload: &[u8]) -> Result<FieldValue, CodecError> {
        match self.semantic_type {
            SemanticType::Text => String::from_utf8(payload.to_vec())
                .map(FieldValue::Text)
                .map_err(|_| self.malformed("invalid UTF-8")),
            SemanticType::Integer64 => {
                // 4-byte payloads are widened; everything else reads a
                // full 64-bit big-endian integer.
                if payload.len() == 4 {
                    let n = i32::from_be_bytes(payload.try_into().expect("length checked"));
                    Ok(FieldValue::Integer64(i64::from(n)))
                } else {
                    Ok(FieldValue::Integer64(self.read_i64(payload)?))
                }
            }
            SemanticType::Float64 => {
                if payload.len() == 4 {
                    let bits: [u8; 4] = payload.try_into().expect("length checked");
                    Ok(FieldValue::Float64(f64::from(f32::from_be_bytes(bits))))
                } else {
                    let bytes = self.read_8(payload)?;
                    Ok(FieldValue::Float64(f64::from_be_bytes(bytes)))
                }
            }
            SemanticType::DateMillis => {
                let millis = self.read_i64(payload)?;
                date_from_millis(millis)
                    .ok_or_else(|| self.malformed("epoch milliseconds out of range"))
            }
            SemanticType::TimestampMillisNanos => {
                if payload.len() < 12 {
                    return Err(self.malformed("need at least 12 bytes"));
                }
                let millis = i64::from_be_bytes(payload[0..8].try_into().expect("length checked"));
                let nanos = u32::from_be_bytes(payload[8..12].try_into().expect("length checked"));
                if nanos >= NANOS_PER_SECOND {
                    return Err(self.malformed("nanosecond adjustment out of range"));
                }
                Ok(FieldValue::Timestamp(TimestampValue {
                    epoch_millis: millis,
                    nanos,
                }))
            }
            SemanticType::Binary => Ok(FieldValue::Binary(payload.to_vec())),
            SemanticType::Boolean => match payload.first() {
                Some(b) => Ok(FieldValue::Boolean(*b > 0)),
                None => Err(self.malformed("empty payload")),
            },
            SemanticType::OpaqueObject => {
                if !self.allow_opaque {
                    return Err(CodecError::NotSerializable(
                        "object messages are disabled by policy".to_string(),
                    ));
                }
                ciborium::from_reader(payload)
                    .map(FieldValue::Opaque)
                    .map_err(|e| self.malformed(&e.to_string()))
            }
        }
    }

    /// Read a big-endian i64 from the first 8 bytes.
    fn read_i64(&self, payload: &[u8]) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.read_8(payload)?))
    }

    fn read_8(&self, payload: &[u8]) -> Result<[u8; 8], CodecError> {
        payload
            .get(0..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| self.malformed("need at least 8 bytes"))
    }

    fn malformed(&self, reason: &str) -> CodecError {
        CodecError::MalformedInput {
            semantic_type: self.semantic_type,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by [`ValueCodec`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// The value's kind does not match the declared semantic type
    #[error("cannot encode {actual} value as {declared}")]
    UnsupportedType {
        /// Declared semantic type
        declared: SemanticType,
        /// Kind of the value actually supplied
        actual: &'static str,
    },
    /// The payload cannot be read as the declared semantic type
    #[error("malformed {semantic_type} payload: {reason}")]
    MalformedInput {
        /// Declared semantic type
        semantic_type: SemanticType,
        /// What went wrong
        reason: String,
    },
    /// Object-graph serialization failed or is disallowed by policy
    #[error("not serializable: {0}")]
    NotSerializable(String),
}
