//! Controller link
//!
//! This module provides:
//! - Serial and TCP transports behind a common [`Connector`] seam
//! - Line framing of the inbound byte stream
//! - The two-priority send queue and acknowledgement tracking
//! - Inbound line redirection for request/response exchanges
//! - The status poller
//! - The connection lifecycle and the [`SmoothieLink`] handle

pub mod ack;
pub mod connection;
pub mod endpoint;
pub mod framer;
pub mod link;
pub mod poller;
pub mod redirect;
pub mod send_queue;
pub mod serial;
pub mod tcp;
pub mod transport;

pub use ack::{AckMark, AckOutcome, AckTracker};
pub use endpoint::Endpoint;
pub use framer::{FramedLine, LineFramer};
pub use link::SmoothieLink;
pub use poller::{PollContext, StatusPoller};
pub use redirect::{RedirectGuard, RedirectScope, RedirectSlot, RedirectTarget};
pub use send_queue::{OutboundMessage, Priority, SendQueue};
pub use serial::{list_ports, SerialPortInfo};
pub use transport::{BoxedTransport, Connector, DefaultConnector, Transport};
