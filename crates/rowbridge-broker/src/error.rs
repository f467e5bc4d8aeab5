//! Connection and publish error taxonomy.

use rowbridge_core::ConfigError;

use crate::manager::ConnectionState;

/// Errors establishing or tearing down a broker connection.
///
/// Configuration problems discovered during the connect sequence (an
/// unparsable timeout, for example) surface as [`ConnectError::Config`]
/// so callers can distinguish them from genuine network failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// Invalid configuration discovered during the connect sequence
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Broker URL could not be parsed
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// TLS material could not be loaded or assembled
    #[error("TLS setup failed: {0}")]
    Tls(String),
    /// Network-level connect failure
    #[error("broker connection failed: {0}")]
    Connection(String),
    /// Broker refused the connection (bad credentials, rejected client id)
    #[error("broker refused the connection: {0}")]
    Refused(String),
    /// Connect did not complete within the configured timeout
    #[error("connect timed out after {0} seconds")]
    Timeout(u64),
    /// Subscribe call after connect failed
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// Operation attempted from the wrong connection state
    #[error("cannot {operation} while connection is {state:?}")]
    InvalidState {
        /// Current connection state
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors publishing a message on an established connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Connection is not in the `Connected` state
    #[error("cannot publish while connection is {0:?}")]
    InvalidState(ConnectionState),
    /// No live client handle
    #[error("client not connected")]
    NotConnected,
    /// Broker or client rejected the publish
    #[error("publish failed: {0}")]
    Rejected(String),
}
