//! Protocol constants shared across crates

/// Realtime cancel (Ctrl-X) sent when a stream is aborted
pub const CANCEL_BYTE: &str = "\x18";

/// Realtime status query for serial connections
pub const STATUS_QUERY: &str = "?";

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default TCP port of the controller's telnet-style console
pub const DEFAULT_NET_PORT: u16 = 23;

/// Command that resumes a controller-initiated suspend
pub const RESUME_COMMAND: &str = "M601\n";

/// Commands inserted for a manual tool change
pub const WAIT_FOR_MOVES_COMMAND: &str = "M400\n";
/// Suspend command issued once motion has completed
pub const SUSPEND_COMMAND: &str = "M600\n";

/// Line counting threshold before an ETA is estimated
pub const ETA_MIN_LINES: u64 = 10;
/// Elapsed time threshold before an ETA is estimated
pub const ETA_MIN_SECS: u64 = 10;
