//! Serial port transport
//!
//! Provides port discovery for the connection dialog and opens the async
//! serial stream used by the connection thread. Smoothieware speaks 8N1
//! without flow control over USB CDC, so only the baud rate is
//! configurable.

use smoothiehost_core::{ConnectionError, Error, Result};
use std::time::Duration;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Smoothieboard")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor and product IDs if applicable
    pub usb_ids: Option<(u16, u16)>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            usb_ids: None,
        }
    }

    /// Endpoint string for this port
    pub fn endpoint(&self) -> String {
        format!("serial://{}", self.port_name)
    }
}

/// List serial ports that may have a controller attached
///
/// Keeps Windows `COM*`, Linux `/dev/ttyUSB*` and `/dev/ttyACM*`, and macOS
/// `/dev/cu.usbserial-*` and `/dev/cu.usbmodem*` devices.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::from(ConnectionError::SerialError {
            reason: e.to_string(),
        })
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo::new(&port.port_name, describe(port));
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.usb_ids = Some((usb.vid, usb.pid));
                info.manufacturer = usb.manufacturer.clone();
                info.serial_number = usb.serial_number.clone();
            }
            info
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn describe(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Open a serial device for async I/O
///
/// Must be called from within a tokio runtime. Stale bytes in the driver
/// buffers are discarded after opening.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .timeout(Duration::from_millis(10))
        .open_native_async()
        .map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", path, e);
            ConnectionError::FailedToOpen {
                endpoint: path.to_string(),
                reason: e.to_string(),
            }
        })?;

    if let Err(e) = port.clear(tokio_serial::ClearBuffer::All) {
        tracing::debug!("Could not flush {} buffers: {}", path, e);
    }

    tracing::info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_port_patterns() {
        assert!(is_controller_port("COM3"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("COMX"));
        assert!(is_controller_port("/dev/ttyACM0"));
        assert!(is_controller_port("/dev/ttyUSB1"));
        assert!(is_controller_port("/dev/cu.usbmodem1411"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }

    #[test]
    fn test_endpoint_string() {
        let info = SerialPortInfo::new("/dev/ttyACM0", "USB Smoothieboard");
        assert_eq!(info.endpoint(), "serial:///dev/ttyACM0");
    }
}
