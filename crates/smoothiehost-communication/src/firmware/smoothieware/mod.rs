//! Smoothieware reply grammar
//!
//! Provides:
//! - Line classification (acks, reports, alarms, host actions)
//! - Status report parsing (comma and pipe formats)
//! - Temperature reply parsing

pub mod response_parser;
pub mod status_parser;
pub mod temperature;

pub use response_parser::{classify, HostAction, SmoothiewareResponse, SmoothiewareResponseParser};
pub use status_parser::StatusParser;
pub use temperature::{is_temperature_line, parse_temperatures};
