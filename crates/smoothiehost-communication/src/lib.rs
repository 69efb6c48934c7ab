//! # SmoothieHost Communication
//!
//! Link to Smoothieware controllers over serial/USB or TCP.
//! Frames and classifies controller output, keeps the two-priority send
//! queue, polls status, and streams or uploads G-code files.

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    list_ports, AckOutcome, Connector, DefaultConnector, Endpoint, Priority, RedirectGuard,
    RedirectScope, RedirectTarget, SerialPortInfo, SmoothieLink, Transport,
};

pub use firmware::{classify, HostAction, SmoothiewareResponse, SmoothiewareResponseParser};

pub use streaming::{
    estimate_eta, get_line_count, ResumeAction, SessionKind, StreamControl, StreamSession,
};
