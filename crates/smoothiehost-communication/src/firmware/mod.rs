//! Firmware protocol support
//!
//! Only Smoothieware is spoken by this host. Its reply grammar lives in
//! [`smoothieware`]; the connection layer depends on the classifier alone.

pub mod smoothieware;

pub use smoothieware::{classify, HostAction, SmoothiewareResponse, SmoothiewareResponseParser};
