//! Smoothieware response parser
//!
//! Classifies every complete line received from Smoothieware. Rules are
//! tried in a fixed order and the first match wins:
//!
//! 1. exactly `ok` is an acknowledgment
//! 2. `ok C:` is a position reply to `M114`
//! 3. `ok T:`, `T:` or a line containing ` T:` is a temperature reply
//! 4. `<` starts a status report
//! 5. alarms, host actions, probe, parser state, firmware, switch,
//!    progress sideband and `done`
//! 6. anything else is console text
//!
//! A line that looks like a report but fails to parse degrades to
//! console text.

use super::status_parser::StatusParser;
use super::temperature::{is_temperature_line, parse_temperatures};
use smoothiehost_core::{
    Axes, FirmwareInfo, ProbeResult, ProtocolError, StatusReport, TemperatureReport,
};
use std::collections::BTreeMap;

/// Minimum number of modal words in a `[GC:...]` reply
const MIN_PARSER_STATE_WORDS: usize = 10;

/// Host action requested through a `// action:` comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Suspend the running stream
    Pause,
    /// Resume a suspended stream
    Resume,
    /// Drop the connection
    Disconnect,
    /// Action this host does not implement
    Unknown(String),
}

impl HostAction {
    fn parse(action: &str) -> Self {
        match action.trim() {
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "disconnect" => Self::Disconnect,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Parsed Smoothieware response
#[derive(Debug, Clone, PartialEq)]
pub enum SmoothiewareResponse {
    /// Command was acknowledged (`ok`)
    Ok,
    /// Position feedback
    Position(Axes),
    /// Temperature feedback
    Temperature(TemperatureReport),
    /// Status report
    Status(StatusReport),
    /// Alarm or error
    Alarm {
        /// The alarm line
        message: String,
        /// Whether the alarm also releases an outstanding ack wait
        releases_ack: bool,
    },
    /// `// action:` request
    Action(HostAction),
    /// Probe result
    Probe(ProbeResult),
    /// Modal parser state words
    ParserState(Vec<String>),
    /// Firmware identification
    Firmware(FirmwareInfo),
    /// `switch` query reply
    Switch {
        /// Switch name
        name: String,
        /// Reported value
        value: String,
    },
    /// Progress sideband (`progress: line,total`)
    Progress {
        /// Line reached
        line: u64,
        /// Total lines
        total: u64,
    },
    /// `done` marker, ignored
    Done,
    /// Console text
    Log(String),
}

/// Parser for Smoothieware protocol responses
#[derive(Debug, Clone, Default)]
pub struct SmoothiewareResponseParser;

impl SmoothiewareResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        Self
    }

    /// Classify a single framed line
    pub fn parse_line(&self, line: &str) -> SmoothiewareResponse {
        if line == "ok" {
            return SmoothiewareResponse::Ok;
        }

        if line.starts_with("ok C:") {
            return match parse_position(line) {
                Some(pos) => SmoothiewareResponse::Position(pos),
                None => degrade(line, "position"),
            };
        }

        if is_temperature_line(line) {
            let report = parse_temperatures(line);
            return if report.is_empty() {
                degrade(line, "temperature")
            } else {
                SmoothiewareResponse::Temperature(report)
            };
        }

        if line.starts_with('<') {
            return match StatusParser::parse(line) {
                Ok(report) => SmoothiewareResponse::Status(report),
                Err(e) => {
                    tracing::debug!("Unparsable status report '{}': {}", line, e);
                    SmoothiewareResponse::Log(line.to_string())
                }
            };
        }

        if line.starts_with("!!") || line.starts_with("error:Alarm lock") {
            return SmoothiewareResponse::Alarm {
                message: line.to_string(),
                releases_ack: true,
            };
        }

        if line.starts_with("ALARM") || line.starts_with("ERROR") || line.starts_with("HALTED") {
            return SmoothiewareResponse::Alarm {
                message: line.to_string(),
                releases_ack: false,
            };
        }

        if line.starts_with("//") {
            return match line.split_once("action:") {
                Some((_, action)) => SmoothiewareResponse::Action(HostAction::parse(action)),
                None => SmoothiewareResponse::Log(line.to_string()),
            };
        }

        if let Some(body) = line.strip_prefix("[PRB:") {
            return match parse_probe(body) {
                Ok(probe) => SmoothiewareResponse::Probe(probe),
                Err(e) => {
                    tracing::debug!("Unparsable probe reply '{}': {}", line, e);
                    SmoothiewareResponse::Log(line.to_string())
                }
            };
        }

        if let Some(body) = line.strip_prefix("[GC:") {
            let words: Vec<String> = body
                .trim_end_matches(']')
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if words.len() < MIN_PARSER_STATE_WORDS {
                tracing::warn!("Bad parser state reply: {}", line);
                return SmoothiewareResponse::Log(line.to_string());
            }
            return SmoothiewareResponse::ParserState(words);
        }

        if line.starts_with("FIRMWARE_NAME:") {
            return SmoothiewareResponse::Firmware(parse_firmware(line));
        }

        if let Some(rest) = line.strip_prefix("switch ") {
            let parts: Vec<&str> = rest.split(' ').collect();
            if let [name, _, value] = parts.as_slice() {
                return SmoothiewareResponse::Switch {
                    name: name.to_string(),
                    value: value.to_string(),
                };
            }
            return SmoothiewareResponse::Log(line.to_string());
        }

        if let Some(rest) = line.strip_prefix("progress:") {
            if let Some((done, total)) = rest.trim().split_once(',') {
                if let (Ok(line), Ok(total)) = (done.trim().parse(), total.trim().parse()) {
                    return SmoothiewareResponse::Progress { line, total };
                }
            }
            return SmoothiewareResponse::Log(line.to_string());
        }

        if line == "done" {
            return SmoothiewareResponse::Done;
        }

        SmoothiewareResponse::Log(line.to_string())
    }
}

/// Classify a line with a default parser
pub fn classify(line: &str) -> SmoothiewareResponse {
    SmoothiewareResponseParser::new().parse_line(line)
}

fn degrade(line: &str, kind: &str) -> SmoothiewareResponse {
    tracing::debug!("Unparsable {} reply: {}", kind, line);
    SmoothiewareResponse::Log(line.to_string())
}

/// `ok C: X:1.0000 Y:2.0000 Z:3.0000`
fn parse_position(line: &str) -> Option<Axes> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let axis = |index: usize, prefix: &str| -> Option<f64> {
        tokens.get(index)?.strip_prefix(prefix)?.parse().ok()
    };
    Some(Axes::new(axis(2, "X:")?, axis(3, "Y:")?, axis(4, "Z:")?))
}

/// `1.000,80.137,10.000:0]`
fn parse_probe(body: &str) -> Result<ProbeResult, ProtocolError> {
    let body = body.trim_end_matches(']');
    let (coords, status) = body.split_once(':').ok_or(ProtocolError::MissingField {
        kind: "probe",
        field: "status",
    })?;
    let values = coords
        .split(',')
        .map(|v| {
            v.trim().parse::<f64>().map_err(|_| ProtocolError::InvalidNumber {
                kind: "probe",
                value: v.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let position = Axes::from_slice(&values).ok_or(ProtocolError::FieldCount {
        kind: "probe",
        expected: 3,
        actual: values.len(),
    })?;
    Ok(ProbeResult {
        position,
        triggered: status.trim() == "1",
    })
}

/// `FIRMWARE_NAME:Smoothieware, FIRMWARE_URL:http..., X-CNC:1, FIRMWARE_VERSION:edge-1234`
fn parse_firmware(line: &str) -> FirmwareInfo {
    let fields: BTreeMap<String, String> = line
        .split(',')
        .filter_map(|entry| entry.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    FirmwareInfo {
        name: fields.get("FIRMWARE_NAME").cloned().unwrap_or_default(),
        version: fields.get("FIRMWARE_VERSION").cloned().unwrap_or_default(),
        is_cnc: fields.get("X-CNC").is_some_and(|v| v == "1"),
        fields,
    }
}
