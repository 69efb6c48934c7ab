//! Endpoint addressing
//!
//! Two endpoint forms are accepted:
//!
//! ```text
//! serial:///dev/ttyACM0          serial port at the default baud rate
//! serial:///dev/ttyACM0?baud=57600
//! net://192.168.0.10             TCP console on the default port
//! net://smoothie.local:2323
//! ```

use serde::{Deserialize, Serialize};
use smoothiehost_core::{ConnectionError, ConnectionSettings};
use std::fmt;

/// A parsed connection target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    /// Local serial device
    Serial {
        /// Device path
        path: String,
        /// Line speed
        baud_rate: u32,
    },
    /// TCP console
    Network {
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
    },
}

impl Endpoint {
    /// Parse an endpoint string, filling gaps from `defaults`
    pub fn parse(endpoint: &str, defaults: &ConnectionSettings) -> Result<Self, ConnectionError> {
        let invalid = |reason: &str| ConnectionError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = endpoint
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;

        match scheme {
            "serial" => {
                let (path, query) = match rest.split_once('?') {
                    Some((path, query)) => (path, Some(query)),
                    None => (rest, None),
                };
                if path.is_empty() {
                    return Err(invalid("missing device path"));
                }
                let mut baud_rate = defaults.baud_rate;
                for pair in query.into_iter().flat_map(|q| q.split('&')) {
                    match pair.split_once('=') {
                        Some(("baud", value)) => {
                            baud_rate = value.parse().map_err(|_| invalid("bad baud rate"))?;
                        }
                        _ => tracing::warn!("Ignoring endpoint option '{}'", pair),
                    }
                }
                Ok(Self::Serial {
                    path: path.to_string(),
                    baud_rate,
                })
            }
            "net" => {
                let rest = rest.trim_end_matches('/');
                let (host, port) = match rest.rsplit_once(':') {
                    Some((host, port)) if !host.contains(':') || host.starts_with('[') => {
                        (host, port.parse().map_err(|_| invalid("bad port"))?)
                    }
                    _ => (rest, defaults.net_port),
                };
                let host = host.trim_start_matches('[').trim_end_matches(']');
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                Ok(Self::Network {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(invalid("unknown scheme")),
        }
    }

    /// Check if this is a network endpoint
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl std::str::FromStr for Endpoint {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, &ConnectionSettings::default())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { path, baud_rate } => write!(f, "serial://{}?baud={}", path, baud_rate),
            Self::Network { host, port } if host.contains(':') => {
                write!(f, "net://[{}]:{}", host, port)
            }
            Self::Network { host, port } => write!(f, "net://{}:{}", host, port),
        }
    }
}
