//! Event system for the controller link
//!
//! Provides:
//! - `LinkEvent`, every notification the link raises towards its collaborators
//! - `EventDispatcher`, the sending half used on the connection thread
//! - `LinkEvents`, the receiving half owned by the application thread
//!
//! Events cross from the connection thread to the application thread only
//! through this channel; nothing on the connection thread calls into the
//! application directly.

use crate::data::{
    Axes, FirmwareInfo, ProbeResult, StatusReport, StreamProgress, TemperatureReport,
};
use tokio::sync::mpsc;

/// Link event types
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Transport opened; payload is the endpoint description
    Connected(String),
    /// Transport closed (requested or lost)
    Disconnected,
    /// Line for the console display
    Log(String),
    /// Line that was not valid UTF-8, rendered with escapes
    UndecodedLine(String),
    /// Status report
    Status(StatusReport),
    /// Temperature report
    Temperature(TemperatureReport),
    /// Position reply to `M114`
    Position(Axes),
    /// Controller reported an alarm or error
    Alarm {
        /// The alarm line
        message: String,
        /// Whether a stream was running when the alarm arrived
        was_printing: bool,
    },
    /// Probe result
    Probe(ProbeResult),
    /// Modal parser state words (`[GC:...]`)
    ParserState(Vec<String>),
    /// Firmware identification
    Firmware(FirmwareInfo),
    /// Reply to a `switch` query
    Switch {
        /// Switch name
        name: String,
        /// Reported value
        value: String,
    },
    /// Stream progress
    StreamProgress(StreamProgress),
    /// Stream paused or resumed
    StreamPaused {
        /// True when paused
        paused: bool,
        /// True when the pause was requested by the controller
        suspended: bool,
    },
    /// Stream finished; reported exactly once per session
    StreamDone {
        /// True on clean end of file
        ok: bool,
        /// Last line number reached
        lines: u64,
    },
    /// Manual tool change requested by the stream
    ToolChange {
        /// The tool change line
        line: String,
        /// Most recent tool selection line
        last_tool: Option<String>,
    },
    /// Stream is waiting for the operator to release an M0
    WaitOnM0,
    /// `(NOTIFY ...)` comment from the stream
    Notify(String),
    /// Result of an SD-card listing
    SdCardListing(Vec<String>),
}

impl std::fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEvent::Connected(endpoint) => write!(f, "Connected to {}", endpoint),
            LinkEvent::Disconnected => write!(f, "Disconnected"),
            LinkEvent::Log(line) => write!(f, "{}", line),
            LinkEvent::UndecodedLine(line) => write!(f, "{} (undecodable)", line),
            LinkEvent::Status(status) => write!(
                f,
                "Status: {} MPos {} WPos {}",
                status.state, status.mpos, status.wpos
            ),
            LinkEvent::Temperature(temps) => {
                write!(f, "Temperature:")?;
                for (zone, reading) in &temps.zones {
                    write!(f, " {}={:?}/{:?}", zone, reading.current, reading.setpoint)?;
                }
                Ok(())
            }
            LinkEvent::Position(pos) => write!(f, "Position: {}", pos),
            LinkEvent::Alarm {
                message,
                was_printing,
            } => write!(f, "Alarm: {} (printing: {})", message, was_printing),
            LinkEvent::Probe(probe) => write!(
                f,
                "Probe: {} - {}",
                if probe.triggered { 1 } else { 0 },
                probe.position
            ),
            LinkEvent::ParserState(words) => write!(f, "State: {}", words.join(" ")),
            LinkEvent::Firmware(info) => {
                write!(f, "Firmware: {} {}", info.name, info.version)
            }
            LinkEvent::Switch { name, value } => write!(f, "switch {} is {}", name, value),
            LinkEvent::StreamProgress(p) => write!(f, "Progress: {}/{:?}", p.line, p.total),
            LinkEvent::StreamPaused { paused, suspended } => {
                write!(f, "Paused: {} (suspended: {})", paused, suspended)
            }
            LinkEvent::StreamDone { ok, lines } => {
                write!(f, "Stream {} at line {}", if *ok { "ok" } else { "failed" }, lines)
            }
            LinkEvent::ToolChange { line, last_tool } => write!(
                f,
                "Tool change: {} - {}",
                line,
                last_tool.as_deref().unwrap_or("none")
            ),
            LinkEvent::WaitOnM0 => write!(f, "Waiting on M0"),
            LinkEvent::Notify(text) => write!(f, "Notify: {}", text),
            LinkEvent::SdCardListing(files) => write!(f, "SD card: {} entries", files.len()),
        }
    }
}

/// Sending half of the link event channel
#[derive(Clone, Debug)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventDispatcher {
    /// Create a connected dispatcher/receiver pair
    pub fn channel() -> (Self, LinkEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, LinkEvents { rx })
    }

    /// Publish an event
    ///
    /// Returns false if the receiving side has been dropped; the event is
    /// discarded in that case.
    pub fn publish(&self, event: LinkEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!("Dropping link event, no receiver: {}", e.0);
                false
            }
        }
    }

    /// Publish a console line
    pub fn log(&self, line: impl Into<String>) -> bool {
        self.publish(LinkEvent::Log(line.into()))
    }

    /// Check if the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the link event channel
#[derive(Debug)]
pub struct LinkEvents {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl LinkEvents {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is pending
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        self.rx.try_recv().ok()
    }

    /// Block the calling (non-async) thread until the next event
    pub fn blocking_recv(&mut self) -> Option<LinkEvent> {
        self.rx.blocking_recv()
    }

    /// Take every pending event
    pub fn drain(&mut self) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
