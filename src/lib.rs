//! # SmoothieHost
//!
//! Host-side link to Smoothieware CNC and 3D printer controllers.
//!
//! ## Architecture
//!
//! SmoothieHost is organized as a workspace:
//!
//! 1. **smoothiehost-core** - Errors, data model, link events, configuration
//! 2. **smoothiehost-communication** - Transports, response classifier, send
//!    queue, poller, connection lifecycle, file streaming and SD uploads
//! 3. **smoothiehost-settings** - Configuration file persistence
//! 4. **smoothiehost** - This facade plus the `smoothiehost` streamer binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use smoothiehost::{LinkConfig, LinkEvent, SmoothieLink, StreamMode};
//!
//! let (link, mut events) = SmoothieLink::new(LinkConfig::default());
//! link.connect("serial:///dev/ttyACM0").unwrap();
//! while let Some(event) = events.blocking_recv() {
//!     if let LinkEvent::Connected(_) = event {
//!         link.stream_file("job.nc", StreamMode::PingPong).unwrap();
//!     }
//!     if let LinkEvent::StreamDone { .. } = event {
//!         break;
//!     }
//! }
//! link.stop();
//! ```

pub use smoothiehost_communication::{communication, firmware, streaming};
pub use smoothiehost_core::{constants, data};

pub use smoothiehost_core::{
    Axes, ConnectionError, Error, EventDispatcher, FirmwareInfo, LinkConfig, LinkEvent,
    LinkEvents, LinkState, MachineState, ProbeResult, ProtocolError, Result, StatusReport,
    StreamError, StreamMode, StreamProgress, TemperatureReport, ThermalReading, ThermalZone,
};

pub use smoothiehost_communication::{
    estimate_eta, get_line_count, list_ports, AckOutcome, Connector, DefaultConnector, Endpoint,
    Priority, RedirectGuard, RedirectScope, RedirectTarget, ResumeAction, SerialPortInfo,
    SmoothieLink, StreamSession, Transport,
};

pub use smoothiehost_settings::{SettingsError, SettingsManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, leaving stdout to the console text
/// - RUST_LOG environment variable support, INFO otherwise
/// - Thread names, so the `smoothie-link` thread is visible
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
