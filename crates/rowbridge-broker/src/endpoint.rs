//! Broker endpoint description and URL parsing.

use std::path::PathBuf;
use url::Url;

use crate::error::ConnectError;

/// Username/password authentication material.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Username presented to the broker
    pub username: String,
    /// Password presented to the broker
    pub password: String,
}

/// TLS material handed to the [`crate::SecureTransport`] collaborator.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    /// CA certificate file (PEM)
    pub ca_cert: PathBuf,
    /// Client certificate file for mutual TLS (PEM)
    pub client_cert: Option<PathBuf>,
    /// Client private key file for mutual TLS (PEM)
    pub client_key: Option<PathBuf>,
    /// Passphrase protecting the client key, if any
    pub key_password: Option<String>,
}

/// Everything needed to open one broker connection.
///
/// Immutable once a connection is established; a live connection must
/// be torn down before any field may change. Timeout and keep-alive are
/// carried as the raw configuration strings and parsed during the
/// connect sequence, where a non-numeric value is a configuration
/// error rather than a connect failure.
#[derive(Debug, Clone)]
pub struct BrokerEndpoint {
    /// Broker URL, e.g. `tcp://localhost:1883` or `ssl://broker:8883`
    pub broker_url: String,
    /// Client identifier, required and non-blank
    pub client_id: String,
    /// Optional authentication material
    pub credentials: Option<Credentials>,
    /// TLS material, required when the URL scheme is secured
    pub tls: Option<TlsMaterial>,
    /// Connection timeout in seconds; `0` waits indefinitely
    pub connect_timeout_secs: String,
    /// Keep-alive interval in seconds (subscriber role only)
    pub keep_alive_secs: Option<String>,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "rowbridge".to_string(),
            credentials: None,
            tls: None,
            connect_timeout_secs: "30".to_string(),
            keep_alive_secs: None,
        }
    }
}

/// Transport selected by the broker URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportScheme {
    /// Plain TCP (`tcp:` / `mqtt:`)
    Tcp,
    /// TLS over TCP (`ssl:` / `mqtts:`)
    Tls,
    /// Plain websocket (`ws:`)
    Ws,
    /// TLS websocket (`wss:`)
    Wss,
}

impl TransportScheme {
    /// Whether this scheme requires the secure-transport collaborator.
    #[must_use]
    pub fn is_secured(self) -> bool {
        matches!(self, Self::Tls | Self::Wss)
    }
}

/// A parsed broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Selected transport
    pub scheme: TransportScheme,
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
}

/// Parse a broker URL into transport scheme, host and port.
///
/// Accepts `tcp://`, `mqtt://`, `ssl://`, `mqtts://`, `ws://` and
/// `wss://` URLs, plus bare `host[:port]`. Default ports are 1883 for
/// plain transports and 8883 for secured ones.
///
/// # Errors
///
/// Returns [`ConnectError::InvalidBrokerUrl`] for unsupported schemes,
/// missing hosts, or unparsable ports.
pub fn parse_broker_url(input: &str) -> Result<BrokerAddress, ConnectError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| ConnectError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        let scheme = match url.scheme() {
            "tcp" | "mqtt" => TransportScheme::Tcp,
            "ssl" | "mqtts" => TransportScheme::Tls,
            "ws" => TransportScheme::Ws,
            "wss" => TransportScheme::Wss,
            scheme => {
                return Err(ConnectError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| ConnectError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(default_port(scheme));

        return Ok(BrokerAddress {
            scheme,
            host: host.to_string(),
            port,
        });
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConnectError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            ConnectError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(ConnectError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok(BrokerAddress {
        scheme: TransportScheme::Tcp,
        host: host.to_string(),
        port,
    })
}

fn default_port(scheme: TransportScheme) -> u16 {
    if scheme.is_secured() {
        8883
    } else {
        1883
    }
}
