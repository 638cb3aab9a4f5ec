//! Command frame encoding/decoding
//!
//! Every command and acknowledgement exchanged with the camera is a fixed
//! 6-byte frame:
//! - 1 byte: prefix (always 0xAA)
//! - 1 byte: opcode
//! - 4 bytes: parameters
//!
//! 16-bit parameters are little-endian. The 24-bit picture size carried by a
//! DATA frame uses bytes 3..=5 with byte 5 most significant.

use byteorder::{ByteOrder, LittleEndian};

use super::commands::{
    BaudRate, ColorType, JpegResolution, LightFrequency, Opcode, PictureType, PreviewResolution,
    SnapshotType,
};
use super::{FRAME_PREFIX, FRAME_SIZE};

/// A 6-byte command or acknowledgement frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Frame prefix, `FRAME_PREFIX` for well-formed frames
    pub prefix: u8,
    /// Raw opcode byte
    pub opcode: u8,
    /// Parameter bytes 2..=5
    pub params: [u8; 4],
}

impl Frame {
    /// Create a frame with the standard prefix
    pub fn new(opcode: Opcode, params: [u8; 4]) -> Self {
        Self {
            prefix: FRAME_PREFIX,
            opcode: opcode.byte(),
            params,
        }
    }

    /// Decode a frame from raw bytes
    pub fn from_bytes(data: &[u8; FRAME_SIZE]) -> Self {
        Self {
            prefix: data[0],
            opcode: data[1],
            params: [data[2], data[3], data[4], data[5]],
        }
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        [
            self.prefix,
            self.opcode,
            self.params[0],
            self.params[1],
            self.params[2],
            self.params[3],
        ]
    }

    /// Whether the prefix byte is the frame sentinel
    pub fn has_valid_prefix(&self) -> bool {
        self.prefix == FRAME_PREFIX
    }

    /// Known opcode of this frame, if any
    pub fn kind(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    /// Check the opcode byte
    pub fn is(&self, opcode: Opcode) -> bool {
        self.opcode == opcode.byte()
    }

    /// Whether this is an ACK frame
    pub fn is_ack(&self) -> bool {
        self.is(Opcode::Ack)
    }

    /// Whether this is a NAK frame
    pub fn is_nak(&self) -> bool {
        self.is(Opcode::Nak)
    }

    /// Opcode being acknowledged (ACK/NAK frames)
    pub fn acked_opcode(&self) -> u8 {
        self.params[0]
    }

    /// Error number reported by a NAK frame
    pub fn nak_error(&self) -> u8 {
        self.params[2]
    }

    /// Package id carried by an ACK frame
    pub fn package_id(&self) -> u16 {
        LittleEndian::read_u16(&self.params[2..4])
    }

    /// Picture size announced by a DATA frame
    pub fn picture_size(&self) -> u32 {
        (self.params[3] as u32) << 16 | (self.params[2] as u32) << 8 | self.params[1] as u32
    }

    /// SYNC frame used during bring-up
    pub fn sync() -> Self {
        Self::new(Opcode::Sync, [0; 4])
    }

    /// ACK frame carrying a package id (0 for plain acknowledgements)
    pub fn ack(package_id: u16) -> Self {
        let mut params = [0u8; 4];
        LittleEndian::write_u16(&mut params[2..4], package_id);
        Self::new(Opcode::Ack, params)
    }

    /// ACK frame as sent by the camera for a received command
    pub fn ack_for(opcode: Opcode, ack_counter: u8) -> Self {
        Self::new(Opcode::Ack, [opcode.byte(), ack_counter, 0, 0])
    }

    /// NAK frame as sent by the camera
    pub fn nak(error: u8) -> Self {
        Self::new(Opcode::Nak, [0, 0, error, 0])
    }

    /// Initial command
    pub fn initial(color: ColorType, preview: PreviewResolution, jpeg: JpegResolution) -> Self {
        Self::new(
            Opcode::Initial,
            [0, color as u8, preview as u8, jpeg as u8],
        )
    }

    /// Set Package Size command
    pub fn package_size(size: u16) -> Self {
        let mut params = [0x08, 0, 0, 0];
        LittleEndian::write_u16(&mut params[1..3], size);
        Self::new(Opcode::PackageSize, params)
    }

    /// Set Baudrate command
    pub fn baud_rate(rate: BaudRate) -> Self {
        let (first, second) = rate.divider();
        Self::new(Opcode::BaudRate, [first, second, 0, 0])
    }

    /// Reset command; a full reset restarts the whole module
    pub fn reset(full: bool) -> Self {
        Self::new(Opcode::Reset, [if full { 0x00 } else { 0x01 }, 0, 0, 0xFF])
    }

    /// Power Off command
    pub fn power_off() -> Self {
        Self::new(Opcode::PowerOff, [0; 4])
    }

    /// Light Frequency command
    pub fn light_frequency(frequency: LightFrequency) -> Self {
        Self::new(Opcode::LightFreq, [frequency as u8, 0, 0, 0])
    }

    /// Snapshot command; `skip_frames` frames are dropped before capture
    pub fn snapshot(kind: SnapshotType, skip_frames: u16) -> Self {
        let mut params = [kind as u8, 0, 0, 0];
        LittleEndian::write_u16(&mut params[1..3], skip_frames);
        Self::new(Opcode::Snapshot, params)
    }

    /// Get Picture command
    pub fn get_picture(kind: PictureType) -> Self {
        Self::new(Opcode::GetPicture, [kind as u8, 0, 0, 0])
    }

    /// DATA frame announcing `size` bytes of picture data
    pub fn data(kind: PictureType, size: u32) -> Self {
        Self::new(
            Opcode::Data,
            [kind as u8, size as u8, (size >> 8) as u8, (size >> 16) as u8],
        )
    }
}
