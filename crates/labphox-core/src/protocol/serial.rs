//! Serial port handling
//!
//! Provides low-level serial port access and board discovery for the
//! serial-link variant of the transport.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use tracing::debug;

use super::{ProtocolError, LABPHOX_USB_PID};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.serial_number)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            serial_number,
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Vec<PortInfo> {
    serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect()
}

/// Find the first port whose USB product ID matches the board
pub fn find_board() -> Option<PortInfo> {
    let port = list_ports()
        .into_iter()
        .find(|p| p.pid == Some(LABPHOX_USB_PID));
    if let Some(p) = &port {
        debug!(port = %p.name, pid = ?p.pid, "found board on serial port");
    }
    port
}

/// Open a serial port with the standard 8N1 configuration
///
/// The short port timeout only bounds individual read calls; the protocol
/// layer never relies on it because reads are preceded by an explicit
/// bytes-waiting query.
pub fn open_port(name: &str) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let port = serialport::new(name, 115_200)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| ProtocolError::ConnectFailed(e.to_string()))?;
    Ok(port)
}

/// Clear the serial port input buffer
pub fn clear_input(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::Input)
        .map_err(|e| ProtocolError::Serial(e.to_string()))
}
