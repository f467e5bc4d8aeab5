//! # rowbridge Core
//!
//! Value model, typed binary codec, and row interfaces for rowbridge.
//!
//! This crate provides:
//! - The closed set of semantic value types carried over MQTT payloads
//! - A pure, bit-exact codec between tagged values and payload bytes
//! - The row/schema model shared by the publisher and subscriber steps
//! - The pipeline sink interface and the startup configuration errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod row;
pub mod value;

pub use codec::{CodecError, ValueCodec};
pub use error::ConfigError;
pub use row::{FieldSchema, Row, RowSchema, RowSink, SinkError};
pub use value::{FieldValue, SemanticType, TimestampValue};
