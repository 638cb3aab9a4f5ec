//! Camera session configuration
//!
//! Timeouts and pacing for the camera protocol. Defaults match what the
//! camera firmware expects; tests and fast links may shorten the delays.
//! Stored as JSON, every field optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::protocol::{
    ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE,
};

/// What a fetch returns when the packet error budget runs out before the
/// declared picture size was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteTransfer {
    /// Return `ProtocolError::TransferIncomplete`
    #[default]
    Fail,
    /// Return the partially filled buffer as a success
    Accept,
}

/// Camera session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate used to open the port
    pub baud_rate: u32,
    /// Timeout for configuration command ACKs and sync responses
    pub ack_timeout_ms: u64,
    /// Timeout for the GetPicture ACK (camera is still encoding)
    pub picture_ack_timeout_ms: u64,
    /// Timeout for the DATA descriptor frame
    pub data_timeout_ms: u64,
    /// Timeout for each image packet
    pub packet_timeout_ms: u64,
    /// Timeout for a whole uncompressed picture
    pub raw_timeout_ms: u64,
    /// Pause after every command written
    pub settle_delay_ms: u64,
    /// Pause between a packet ACK and reading the packet
    pub packet_spacing_ms: u64,
    /// Sync attempts before giving up
    pub sync_attempts: u32,
    /// Packet errors tolerated during one transfer
    pub max_packet_errors: u32,
    /// Packet size negotiated by `initialize`
    pub packet_size: u16,
    /// Expect a 2-byte verify code after every packet
    pub verify_packets: bool,
    /// Behaviour when the packet error budget is exhausted
    pub incomplete_transfer: IncompleteTransfer,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            ack_timeout_ms: 100,
            picture_ack_timeout_ms: 1000,
            data_timeout_ms: 500,
            packet_timeout_ms: 1000,
            raw_timeout_ms: 2000,
            settle_delay_ms: 10,
            packet_spacing_ms: 40,
            sync_attempts: 60,
            max_packet_errors: 15,
            packet_size: DEFAULT_PACKET_SIZE,
            verify_packets: false,
            incomplete_transfer: IncompleteTransfer::Fail,
        }
    }
}

impl CameraConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(content: &str) -> io::Result<Self> {
        let config: CameraConfig = serde_json::from_str(content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Check values the camera cannot work with
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&self.packet_size) {
            return Err(ProtocolError::InvalidParameter(format!(
                "packet_size {} outside {}..={}",
                self.packet_size, MIN_PACKET_SIZE, MAX_PACKET_SIZE
            )));
        }
        if self.sync_attempts == 0 {
            return Err(ProtocolError::InvalidParameter(
                "sync_attempts must be at least 1".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ProtocolError::InvalidParameter(
                "baud_rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Configuration with all pacing delays removed, for simulated links
    pub fn without_delays(mut self) -> Self {
        self.settle_delay_ms = 0;
        self.packet_spacing_ms = 0;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn picture_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.picture_ack_timeout_ms)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_millis(self.data_timeout_ms)
    }

    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    pub fn raw_timeout(&self) -> Duration {
        Duration::from_millis(self.raw_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn packet_spacing(&self) -> Duration {
        Duration::from_millis(self.packet_spacing_ms)
    }
}
