//! Transport abstraction
//!
//! The connection loop works on any bidirectional byte stream. The
//! [`Connector`] trait turns an [`Endpoint`] into one; the default
//! implementation opens real serial ports and TCP sockets, and tests
//! substitute in-memory pipes.

use super::endpoint::Endpoint;
use super::serial::open_serial;
use super::tcp::open_tcp;
use async_trait::async_trait;
use smoothiehost_core::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream to the controller
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Owned transport handed to the connection loop
pub type BoxedTransport = Box<dyn Transport>;

/// Opens transports for endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the transport for `endpoint`
    ///
    /// Called on the connection thread, inside its runtime.
    async fn open(&self, endpoint: &Endpoint) -> Result<BoxedTransport>;
}

/// Opens serial ports and TCP sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<BoxedTransport> {
        match endpoint {
            Endpoint::Serial { path, baud_rate } => {
                Ok(Box::new(open_serial(path, *baud_rate)?) as BoxedTransport)
            }
            Endpoint::Network { host, port } => {
                Ok(Box::new(open_tcp(host, *port).await?) as BoxedTransport)
            }
        }
    }
}
