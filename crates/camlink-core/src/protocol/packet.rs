//! Image data packet encoding/decoding
//!
//! Packet format used by packetized (JPEG) transfers:
//! - 2 bytes: Package id / sequence counter (little-endian)
//! - 2 bytes: Payload length (little-endian)
//! - N bytes: Payload
//! - 2 bytes: Verify code (optional, see [`verify_code`])
//!
//! The negotiated package size bounds the whole packet, so a packet of
//! `package_size` bytes carries at most `package_size - overhead` payload bytes.

use byteorder::{ByteOrder, LittleEndian};

use super::ProtocolError;

/// Size of the packet header (sequence + length)
pub const PACKET_HEADER_SIZE: usize = 4;

/// Size of the optional verify trailer
pub const VERIFY_CODE_SIZE: usize = 2;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Package id echoed by the camera
    pub sequence: u16,
    /// Number of payload bytes that follow
    pub length: u16,
}

impl PacketHeader {
    /// Decode a header from raw bytes
    pub fn from_bytes(data: &[u8; PACKET_HEADER_SIZE]) -> Self {
        Self {
            sequence: LittleEndian::read_u16(&data[0..2]),
            length: LittleEndian::read_u16(&data[2..4]),
        }
    }

    /// Encode the header to raw bytes
    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut bytes = [0u8; PACKET_HEADER_SIZE];
        LittleEndian::write_u16(&mut bytes[0..2], self.sequence);
        LittleEndian::write_u16(&mut bytes[2..4], self.length);
        bytes
    }

    /// Check the declared length against the room left in the image buffer
    /// and the negotiated packet capacity
    pub fn validate(&self, remaining: usize, max_payload: usize) -> Result<usize, ProtocolError> {
        let length = self.length as usize;
        if length == 0 {
            return Err(ProtocolError::InvalidPacket(format!(
                "packet {} is empty",
                self.sequence
            )));
        }
        if length > max_payload {
            return Err(ProtocolError::InvalidPacket(format!(
                "packet {} declares {} bytes, capacity is {}",
                self.sequence, length, max_payload
            )));
        }
        if length > remaining {
            return Err(ProtocolError::InvalidPacket(format!(
                "packet {} declares {} bytes, only {} remaining",
                self.sequence, length, remaining
            )));
        }
        Ok(length)
    }
}

/// Largest payload a packet of `package_size` bytes can carry
pub fn max_payload(package_size: u16, verify: bool) -> usize {
    let overhead = PACKET_HEADER_SIZE + if verify { VERIFY_CODE_SIZE } else { 0 };
    (package_size as usize).saturating_sub(overhead)
}

/// Verify code of a packet: low byte is the low byte of the sum of all
/// header and payload bytes, high byte is zero
pub fn verify_code(header: &[u8; PACKET_HEADER_SIZE], payload: &[u8]) -> [u8; VERIFY_CODE_SIZE] {
    let sum = header
        .iter()
        .chain(payload.iter())
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    [sum, 0]
}

/// Encode a complete packet
pub fn encode(sequence: u16, payload: &[u8], verify: bool) -> Vec<u8> {
    let header = PacketHeader {
        sequence,
        length: payload.len() as u16,
    }
    .to_bytes();

    let mut bytes = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len() + VERIFY_CODE_SIZE);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(payload);
    if verify {
        bytes.extend_from_slice(&verify_code(&header, payload));
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_decode() {
        let header = PacketHeader::from_bytes(&[0x02, 0x00, 0xFC, 0x01]);
        assert_eq!(header.sequence, 2);
        assert_eq!(header.length, 508);
        assert_eq!(header.to_bytes(), [0x02, 0x00, 0xFC, 0x01]);
    }

    #[test]
    fn test_max_payload() {
        assert_eq!(max_payload(512, false), 508);
        assert_eq!(max_payload(512, true), 506);
        assert_eq!(max_payload(2, false), 0);
    }

    #[test]
    fn test_validate_bounds() {
        let header = PacketHeader {
            sequence: 0,
            length: 100,
        };
        assert_eq!(header.validate(100, 508).unwrap(), 100);
        assert!(header.validate(99, 508).is_err());
        assert!(header.validate(1000, 64).is_err());

        let empty = PacketHeader {
            sequence: 0,
            length: 0,
        };
        assert!(empty.validate(100, 508).is_err());
    }

    #[test]
    fn test_encode_with_verify() {
        let bytes = encode(1, &[0x10, 0x20], true);
        assert_eq!(bytes, vec![0x01, 0x00, 0x02, 0x00, 0x10, 0x20, 0x33, 0x00]);

        let bytes = encode(1, &[0x10, 0x20], false);
        assert_eq!(bytes.len(), 6);
    }

    #[test]
    fn test_verify_code_wraps() {
        let header = [0xFF, 0x00, 0x02, 0x00];
        assert_eq!(verify_code(&header, &[0xFF, 0x03]), [0x03, 0x00]);
    }
}
