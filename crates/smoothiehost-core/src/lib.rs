//! # SmoothieHost Core
//!
//! Core types, errors, events and configuration for SmoothieHost.
//! Provides the data model shared by the communication layer and its
//! collaborators: parsed controller reports, link events, the error
//! taxonomy and the link configuration.

pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod event;
pub mod types;

pub use config::{
    ConnectionSettings, LinkConfig, PollingSettings, QueueSettings, StreamingSettings,
};

pub use data::{
    Axes, FirmwareInfo, LinkState, MachineState, ProbeResult, StatusReport, StreamMode,
    StreamProgress, TemperatureReport, ThermalReading, ThermalZone,
};

pub use error::{ConnectionError, Error, ProtocolError, Result, StreamError};

pub use event::{EventDispatcher, LinkEvent, LinkEvents};

pub use types::{thread_safe, thread_safe_none, DataCallback, ThreadSafe, ThreadSafeOption};
