//! Camera Serial Protocol
//!
//! Implements the fixed-frame command/acknowledge protocol spoken by C328-class
//! serial JPEG camera modules.
//!
//! Every command and acknowledgement is a 6-byte frame starting with `0xAA`.
//! Image data follows either as one raw block or as a sequence of
//! acknowledged packets.

mod camera;
pub mod commands;
mod error;
pub mod frame;
pub mod packet;
pub mod serial;
mod transfer;
pub mod transport;

pub use camera::{Ack, Camera, LinkCounters};
pub use commands::{
    BaudRate, ColorType, DeviceErrorCode, JpegResolution, LightFrequency, Opcode, PictureType,
    PreviewResolution, SnapshotType,
};
pub use error::ProtocolError;
pub use frame::Frame;
pub use packet::PacketHeader;
pub use serial::{list_ports, open_port, PortInfo};
pub use transfer::{TransferState, TransferStats};
pub use transport::{SerialTransport, TcpTransport, Transport};

/// First byte of every command frame
pub const FRAME_PREFIX: u8 = 0xAA;

/// Size of a command/acknowledge frame in bytes
pub const FRAME_SIZE: usize = 6;

/// Default baud rate for camera communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default packet size negotiated with the camera before JPEG transfers
pub const DEFAULT_PACKET_SIZE: u16 = 512;

/// Smallest packet size the camera accepts
pub const MIN_PACKET_SIZE: u16 = 64;

/// Largest packet size the camera accepts
pub const MAX_PACKET_SIZE: u16 = 512;
