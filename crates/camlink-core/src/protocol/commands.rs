//! Protocol commands
//!
//! Opcodes and typed command parameters understood by the camera.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame opcodes (byte 1 of every frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Set colour type and resolutions
    Initial = 0x01,
    /// Request a picture
    GetPicture = 0x04,
    /// Capture a frame into the camera buffer
    Snapshot = 0x05,
    /// Negotiate the transfer packet size
    PackageSize = 0x06,
    /// Change the camera baud rate divider
    BaudRate = 0x07,
    /// Reset the camera state machine or the whole module
    Reset = 0x08,
    /// Power the camera down
    PowerOff = 0x09,
    /// Data descriptor announcing an image transfer
    Data = 0x0A,
    /// Synchronization
    Sync = 0x0D,
    /// Positive acknowledgement
    Ack = 0x0E,
    /// Negative acknowledgement
    Nak = 0x0F,
    /// Light frequency (flicker) setting
    LightFreq = 0x13,
}

impl Opcode {
    /// Wire value of the opcode
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Look up an opcode by wire value
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Opcode::Initial),
            0x04 => Some(Opcode::GetPicture),
            0x05 => Some(Opcode::Snapshot),
            0x06 => Some(Opcode::PackageSize),
            0x07 => Some(Opcode::BaudRate),
            0x08 => Some(Opcode::Reset),
            0x09 => Some(Opcode::PowerOff),
            0x0A => Some(Opcode::Data),
            0x0D => Some(Opcode::Sync),
            0x0E => Some(Opcode::Ack),
            0x0F => Some(Opcode::Nak),
            0x13 => Some(Opcode::LightFreq),
            _ => None,
        }
    }
}

/// Colour depth of captured pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorType {
    GreyScale2 = 1,
    GreyScale4 = 2,
    GreyScale8 = 3,
    Color12 = 5,
    Color16 = 6,
    Jpeg = 7,
}

/// Resolution of uncompressed preview pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PreviewResolution {
    R80x60 = 1,
    R160x120 = 3,
}

/// Resolution of JPEG pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum JpegResolution {
    R80x64 = 1,
    R160x128 = 3,
    R320x240 = 5,
    R640x480 = 7,
}

impl JpegResolution {
    /// Parse a `WIDTHxHEIGHT` string such as `"320x240"`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "80x64" => Some(JpegResolution::R80x64),
            "160x128" => Some(JpegResolution::R160x128),
            "320x240" => Some(JpegResolution::R320x240),
            "640x480" => Some(JpegResolution::R640x480),
            _ => None,
        }
    }
}

/// Picture source requested with GetPicture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PictureType {
    /// Picture previously captured with Snapshot
    Snapshot = 1,
    /// Live uncompressed preview
    Preview = 2,
    /// Live JPEG picture
    Jpeg = 5,
}

/// Compression of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SnapshotType {
    Compressed = 0,
    Uncompressed = 1,
}

/// Mains frequency used to suppress light flicker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LightFrequency {
    F50Hz = 0,
    F60Hz = 1,
}

/// Baud rates the camera can switch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaudRate {
    Baud7200,
    Baud9600,
    Baud14400,
    Baud19200,
    Baud28800,
    Baud38400,
    Baud57600,
    Baud115200,
}

impl BaudRate {
    /// Every supported rate, slowest first
    pub const ALL: [BaudRate; 8] = [
        BaudRate::Baud7200,
        BaudRate::Baud9600,
        BaudRate::Baud14400,
        BaudRate::Baud19200,
        BaudRate::Baud28800,
        BaudRate::Baud38400,
        BaudRate::Baud57600,
        BaudRate::Baud115200,
    ];

    /// First and second clock divider bytes sent with the BaudRate command
    pub fn divider(self) -> (u8, u8) {
        let first = match self {
            BaudRate::Baud7200 => 0xFF,
            BaudRate::Baud9600 => 0xBF,
            BaudRate::Baud14400 => 0x7F,
            BaudRate::Baud19200 => 0x5F,
            BaudRate::Baud28800 => 0x3F,
            BaudRate::Baud38400 => 0x2F,
            BaudRate::Baud57600 => 0x1F,
            BaudRate::Baud115200 => 0x0F,
        };
        (first, 0x01)
    }

    /// Line speed in bits per second
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::Baud7200 => 7200,
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud14400 => 14400,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud28800 => 28800,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
            BaudRate::Baud115200 => 115200,
        }
    }

    /// Find the rate matching a line speed
    pub fn from_bits_per_second(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.bits_per_second() == bps)
    }

    /// Find the rate selected by a first divider byte
    pub fn from_divider(first: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.divider().0 == first)
    }
}

/// Error number carried by a NAK frame
///
/// Unknown values are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceErrorCode(pub u8);

impl DeviceErrorCode {
    pub const PICTURE_TYPE_ERROR: Self = Self(0x01);
    pub const PARAMETER_ERROR: Self = Self(0x0B);
    pub const PICTURE_NOT_READY: Self = Self(0x0F);
    pub const PACKAGE_NUMBER_ERROR: Self = Self(0x10);
    pub const PACKAGE_SIZE_WRONG: Self = Self(0x11);

    /// Raw error byte
    pub fn code(self) -> u8 {
        self.0
    }

    /// Human-readable name from the camera's error table
    pub fn description(self) -> Option<&'static str> {
        let name = match self.0 {
            0x01 => "picture type error",
            0x02 => "picture up scale",
            0x03 => "picture scale error",
            0x04 => "unexpected reply",
            0x05 => "send picture timeout",
            0x06 => "unexpected command",
            0x07 => "SRAM JPEG type error",
            0x08 => "SRAM JPEG size error",
            0x09 => "picture format error",
            0x0A => "picture size error",
            0x0B => "parameter error",
            0x0C => "send register timeout",
            0x0D => "command ID error",
            0x0F => "picture not ready",
            0x10 => "transfer package number error",
            0x11 => "set transfer package size wrong",
            0xF0 => "command header error",
            0xF1 => "command length error",
            0xF5 => "send picture error",
            0xFF => "send command error",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(name) => write!(f, "{:#04x} ({})", self.0, name),
            None => write!(f, "{:#04x}", self.0),
        }
    }
}
