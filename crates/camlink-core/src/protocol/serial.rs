//! Serial port handling
//!
//! Port discovery and opening for cameras attached through USB-serial
//! adapters or on-board UARTs.

use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tracing::debug;

use super::{ProtocolError, SerialTransport, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key: USB adapters (ttyUSB*) first, then on-board UARTs (ttyS*,
/// ttyAMA*), then everything else, numerically within each group
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0, "ttyUSB"), (1, "ttyAMA"), (1, "ttyS")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux: USB adapters sometimes appear in /dev before udev reports them
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port configured for the camera (8N1, no flow control)
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<SerialTransport, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    debug!(port = name, baud, "opening serial port");

    let port = serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    Ok(SerialTransport::new(port))
}
