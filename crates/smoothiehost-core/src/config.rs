//! Link configuration
//!
//! Runtime settings for the controller link, grouped by concern. Every
//! section deserializes with defaults so partial configuration files work.

use crate::constants::{DEFAULT_BAUD_RATE, DEFAULT_NET_PORT, STATUS_QUERY};
use crate::data::StreamMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Baud rate for serial endpoints that do not specify one
    pub baud_rate: u32,
    /// TCP port for network endpoints that do not specify one
    pub net_port: u16,
    /// Maximum time to wait for the transport to open
    pub open_timeout_ms: u64,
    /// Command sent once the transport is open
    pub handshake: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            net_port: DEFAULT_NET_PORT,
            open_timeout_ms: 5000,
            handshake: "version\n".to_string(),
        }
    }
}

/// Periodic status poll settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Poll period in milliseconds, 0 disables polling
    pub interval_ms: u64,
    /// Extra high-priority queries sent before the status query
    pub queries: Vec<String>,
    /// Status query sent to serial endpoints
    pub status_query: String,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            queries: vec!["M105\n".to_string()],
            status_query: STATUS_QUERY.to_string(),
        }
    }
}

/// Send queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Capacity of the normal priority queue
    pub normal_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            normal_capacity: 100,
        }
    }
}

/// File streaming settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Use fast (count-paced) streaming instead of ping-pong
    pub fast_stream: bool,
    /// Maximum wait for an `ok` in milliseconds, 0 waits forever
    pub ack_timeout_ms: u64,
    /// Emit a progress event every this many counted lines
    pub progress_every: u64,
    /// Replace M6 with M400/M600 and pause for a manual tool change
    pub manual_tool_change: bool,
    /// Stop at M0 until the operator releases it
    pub wait_on_m0: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            fast_stream: false,
            ack_timeout_ms: 300_000,
            progress_every: 10,
            manual_tool_change: false,
            wait_on_m0: false,
        }
    }
}

impl StreamingSettings {
    /// Default mode for new streams
    pub fn mode(&self) -> StreamMode {
        if self.fast_stream {
            StreamMode::Fast
        } else {
            StreamMode::PingPong
        }
    }

    /// Bound on waiting for an acknowledgment
    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms))
    }
}

/// Complete link configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Status poller settings
    pub polling: PollingSettings,
    /// Send queue settings
    pub queue: QueueSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
}

impl LinkConfig {
    /// Bound on opening the transport
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.open_timeout_ms)
    }

    /// Status poll period, `None` when polling is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.polling.interval_ms > 0).then(|| Duration::from_millis(self.polling.interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.connection.handshake, "version\n");
        assert_eq!(config.queue.normal_capacity, 100);
        assert_eq!(config.poll_interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.streaming.mode(), StreamMode::PingPong);
    }

    #[test]
    fn test_partial_json() {
        let config: LinkConfig =
            serde_json::from_str(r#"{"polling": {"interval_ms": 0}, "streaming": {"fast_stream": true}}"#)
                .unwrap();
        assert_eq!(config.poll_interval(), None);
        assert_eq!(config.polling.status_query, "?");
        assert_eq!(config.streaming.mode(), StreamMode::Fast);
        assert_eq!(config.connection.baud_rate, 115200);
    }

    #[test]
    fn test_unbounded_ack_timeout() {
        let settings = StreamingSettings {
            ack_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(settings.ack_timeout(), None);
    }
}
