//! Data models for controller telemetry
//!
//! This module provides:
//! - Three-axis coordinate triples (machine and work positions)
//! - Machine state tags reported in status lines
//! - Status, temperature, probe and firmware reports
//! - Stream progress values surfaced to collaborators
//! - Link (connection) state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// X/Y/Z coordinate triple as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Axes {
    /// Create a new coordinate triple
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build from the first three values of a slice
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y, z, ..] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Check that every component is within `tolerance` of `other`
    pub fn approx_eq(&self, other: &Axes, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl fmt::Display for Axes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.4} Y:{:.4} Z:{:.4}", self.x, self.y, self.z)
    }
}

/// Machine state tag from a status report
///
/// Smoothieware reports a small set of states; anything else is kept
/// verbatim so the display layer can still show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold
    Hold,
    /// Alarm, requires operator intervention
    Alarm,
    /// Homing cycle in progress
    Home,
    /// Safety door open
    Door,
    /// Any state this host does not know about
    Unknown(String),
}

impl MachineState {
    /// Map a raw state tag to a machine state
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        match tag {
            s if s.starts_with("Idle") => Self::Idle,
            s if s.starts_with("Run") => Self::Run,
            s if s.starts_with("Hold") => Self::Hold,
            s if s.starts_with("Alarm") => Self::Alarm,
            s if s.starts_with("Home") => Self::Home,
            s if s.starts_with("Door") => Self::Door,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The tag as the controller spells it
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Hold => "Hold",
            Self::Alarm => "Alarm",
            Self::Home => "Home",
            Self::Door => "Door",
            Self::Unknown(s) => s,
        }
    }

    /// Check if this state indicates an error condition
    pub fn is_alarm(&self) -> bool {
        matches!(self, Self::Alarm)
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(self, Self::Run | Self::Home)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed status report (`<Idle,MPos:...,WPos:...>` or the pipe form)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state tag
    pub state: MachineState,
    /// Machine coordinates
    pub mpos: Axes,
    /// Work coordinates
    pub wpos: Axes,
    /// Every `key:v1,v2,...` field of the report, including MPos/WPos
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl StatusReport {
    /// Values of a named field
    pub fn field(&self, key: &str) -> Option<&[f64]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// Current feed rate (`F:` first value)
    pub fn feed_rate(&self) -> Option<f64> {
        self.field("F").and_then(|v| v.first().copied())
    }

    /// Feed override percentage (`F:` second value)
    pub fn feed_override(&self) -> Option<f64> {
        self.field("F").and_then(|v| v.get(1).copied())
    }

    /// Current spindle speed (`S:` first value)
    pub fn spindle_speed(&self) -> Option<f64> {
        self.field("S").and_then(|v| v.first().copied())
    }

    /// Spindle speed override percentage (`S:` second value)
    pub fn speed_override(&self) -> Option<f64> {
        self.field("S").and_then(|v| v.get(1).copied())
    }
}

/// A heated zone on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThermalZone {
    /// Hotend with index (T, T0 -> 0; T1 -> 1)
    Hotend(u8),
    /// Heated bed
    Bed,
}

impl ThermalZone {
    /// Map a wire designator (`T`, `T1`, `B`) to a zone
    pub fn from_designator(designator: &str) -> Option<Self> {
        let mut chars = designator.chars();
        let kind = chars.next()?;
        let rest = chars.as_str();
        match kind {
            'T' if rest.is_empty() => Some(Self::Hotend(0)),
            'T' => rest.parse::<u8>().ok().map(Self::Hotend),
            'B' => Some(Self::Bed),
            _ => None,
        }
    }
}

impl fmt::Display for ThermalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hotend(n) => write!(f, "hotend{}", n),
            Self::Bed => write!(f, "bed"),
        }
    }
}

/// Current and target temperature of one zone
///
/// `None` means the controller did not report the value, which is
/// distinct from a reported `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThermalReading {
    /// Measured temperature
    pub current: Option<f64>,
    /// Target temperature
    pub setpoint: Option<f64>,
}

/// Temperatures reported by an `M105` style reply
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureReport {
    /// Readings per zone
    pub zones: BTreeMap<ThermalZone, ThermalReading>,
}

impl TemperatureReport {
    /// Reading for a zone
    pub fn get(&self, zone: ThermalZone) -> Option<&ThermalReading> {
        self.zones.get(&zone)
    }

    /// Reading for hotend `index`
    pub fn hotend(&self, index: u8) -> Option<&ThermalReading> {
        self.get(ThermalZone::Hotend(index))
    }

    /// Reading for the bed
    pub fn bed(&self) -> Option<&ThermalReading> {
        self.get(ThermalZone::Bed)
    }

    /// True when no zone was reported
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Result of a `[PRB:x,y,z:s]` probe reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe contact position
    pub position: Axes,
    /// Whether the probe triggered
    pub triggered: bool,
}

/// Firmware identification from an `M115` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    /// FIRMWARE_NAME
    pub name: String,
    /// FIRMWARE_VERSION
    pub version: String,
    /// X-CNC flag
    pub is_cnc: bool,
    /// All reported key/value pairs
    pub fields: BTreeMap<String, String>,
}

/// One progress update of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamProgress {
    /// Line number reached (never decreases within a session)
    pub line: u64,
    /// Total lines if known
    pub total: Option<u64>,
    /// Estimated time remaining, once enough data has been observed
    pub eta: Option<Duration>,
}

impl StreamProgress {
    /// Fraction complete in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.line as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Flow control discipline for a file stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Send one line, wait for `ok`, repeat
    #[default]
    PingPong,
    /// Send everything, let the controller's buffering pace the transfer
    Fast,
}

/// State of the controller link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No connection
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport open and ready
    Connected,
}

impl LinkState {
    /// Check if the transport is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_state_parse() {
        assert_eq!(MachineState::parse("Idle"), MachineState::Idle);
        assert_eq!(MachineState::parse("Alarm"), MachineState::Alarm);
        assert_eq!(
            MachineState::parse("Sleep"),
            MachineState::Unknown("Sleep".to_string())
        );
        assert_eq!(MachineState::parse("Run").to_string(), "Run");
        assert!(MachineState::Home.is_moving());
    }

    #[test]
    fn test_thermal_zone_designators() {
        assert_eq!(ThermalZone::from_designator("T"), Some(ThermalZone::Hotend(0)));
        assert_eq!(ThermalZone::from_designator("T1"), Some(ThermalZone::Hotend(1)));
        assert_eq!(ThermalZone::from_designator("B"), Some(ThermalZone::Bed));
        assert_eq!(ThermalZone::from_designator("Q"), None);
        assert_eq!(ThermalZone::Hotend(1).to_string(), "hotend1");
    }

    #[test]
    fn test_axes_from_slice() {
        assert_eq!(Axes::from_slice(&[1.0, 2.0]), None);
        let axes = Axes::from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(axes.approx_eq(&Axes::new(1.0, 2.0, 3.0), 1e-9));
    }

    #[test]
    fn test_progress_fraction() {
        let progress = StreamProgress {
            line: 25,
            total: Some(100),
            eta: None,
        };
        assert_eq!(progress.fraction(), Some(0.25));
        let unknown = StreamProgress {
            line: 25,
            total: None,
            eta: None,
        };
        assert_eq!(unknown.fraction(), None);
    }
}
