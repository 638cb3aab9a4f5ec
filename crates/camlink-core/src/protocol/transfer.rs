//! Picture transfer
//!
//! `GetPicture` → ACK → DATA descriptor, then either one raw block or a
//! sequence of packets, each requested with an ACK carrying its package id.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    commands::{Opcode, PictureType},
    packet::{self, PacketHeader, PACKET_HEADER_SIZE, VERIFY_CODE_SIZE},
    Camera, DeviceErrorCode, Frame, ProtocolError, Transport,
};
use crate::config::IncompleteTransfer;

/// Progress of the current picture fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No fetch in progress
    Idle,
    /// GetPicture sent and acknowledged
    CommandSent,
    /// DATA descriptor received
    SizeKnown,
    /// Image data being received
    Transferring,
    /// Last fetch returned a picture
    Complete,
    /// Last fetch failed
    Failed,
}

/// Summary of the last picture fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Size announced by the DATA descriptor
    pub declared_size: usize,
    /// Bytes written into the image buffer
    pub received: usize,
    /// Packets accepted (0 for raw transfers)
    pub packets: u32,
    /// Packet timeouts and rejected packets
    pub errors: u32,
}

impl TransferStats {
    /// Whether every announced byte arrived
    pub fn is_complete(&self) -> bool {
        self.received >= self.declared_size
    }
}

impl<T: Transport> Camera<T> {
    /// Where the current or last fetch stands
    pub fn transfer_state(&self) -> TransferState {
        self.state
    }

    /// Statistics of the most recent fetch, if any got past the DATA frame
    pub fn last_transfer(&self) -> Option<TransferStats> {
        self.last_transfer
    }

    /// Package id of the next packet to request
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Packet errors counted during the current or last transfer
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Request a picture and return the size announced by the camera.
    ///
    /// `process_delay` gives the camera time to encode before its ACK is
    /// expected; large JPEGs need close to a second.
    pub fn request_picture(
        &mut self,
        kind: PictureType,
        process_delay: Duration,
    ) -> Result<u32, ProtocolError> {
        self.state = TransferState::Idle;
        self.last_transfer = None;

        self.send_command(&Frame::get_picture(kind))?;
        if !process_delay.is_zero() {
            std::thread::sleep(process_delay);
        }
        self.receive_ack(Opcode::GetPicture, self.config.picture_ack_timeout())?;
        self.state = TransferState::CommandSent;

        let frame = self.read_frame(self.config.data_timeout())?;
        if !frame.has_valid_prefix() {
            self.transport.clear_input()?;
        }
        if frame.is_nak() {
            return Err(ProtocolError::DeviceError(DeviceErrorCode(frame.nak_error())));
        }
        if !frame.is(Opcode::Data) {
            return Err(ProtocolError::Mismatch {
                expected: Opcode::Data.byte(),
                actual: frame.opcode,
            });
        }

        let size = frame.picture_size();
        self.state = TransferState::SizeKnown;
        debug!(?kind, size, "picture size announced");
        Ok(size)
    }

    /// Fetch a JPEG picture packet by packet.
    ///
    /// Each packet is requested with an ACK carrying its package id. A lost
    /// or malformed packet is requested again with the same id; the transfer
    /// gives up once more than `max_packet_errors` packets failed in total.
    pub fn get_jpeg_picture(
        &mut self,
        kind: PictureType,
        process_delay: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let result = self.fetch_packets(kind, process_delay);
        self.finish(result)
    }

    /// Fetch an uncompressed picture as one block
    pub fn get_raw_picture(
        &mut self,
        kind: PictureType,
        process_delay: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let result = self.fetch_raw(kind, process_delay);
        self.finish(result)
    }

    fn finish(&mut self, result: Result<Vec<u8>, ProtocolError>) -> Result<Vec<u8>, ProtocolError> {
        self.state = match result {
            Ok(_) => TransferState::Complete,
            Err(_) => TransferState::Failed,
        };
        result
    }

    fn fetch_packets(
        &mut self,
        kind: PictureType,
        process_delay: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let size = self.request_picture(kind, process_delay)? as usize;

        self.state = TransferState::Transferring;
        self.sequence = 0;
        self.error_count = 0;

        let mut buffer = vec![0u8; size];
        let mut offset = 0;
        let mut packets = 0u32;
        let max_payload = packet::max_payload(self.packet_size, self.config.verify_packets);
        let spacing = self.config.packet_spacing();

        while offset < size && self.error_count <= self.config.max_packet_errors {
            self.send_ack(self.sequence)?;
            if !spacing.is_zero() {
                std::thread::sleep(spacing);
            }

            match self.receive_packet(&mut buffer[offset..], max_payload) {
                Ok(length) => {
                    offset += length;
                    packets += 1;
                    self.sequence = self.sequence.wrapping_add(1);
                }
                Err(e) if e.is_recoverable() => {
                    // Not reset on success: the budget covers the whole transfer
                    self.error_count += 1;
                    warn!(
                        sequence = self.sequence,
                        errors = self.error_count,
                        error = %e,
                        "packet error"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // Tells the camera the transfer is over, whatever the outcome
        self.send_ack(self.sequence)?;

        let stats = TransferStats {
            declared_size: size,
            received: offset,
            packets,
            errors: self.error_count,
        };
        self.last_transfer = Some(stats);
        self.accept_transfer(buffer, stats)
    }

    fn fetch_raw(
        &mut self,
        kind: PictureType,
        process_delay: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let size = self.request_picture(kind, process_delay)? as usize;

        self.state = TransferState::Transferring;
        let mut buffer = vec![0u8; size];
        let received = self.read_bytes(&mut buffer, self.config.raw_timeout())?;
        if received == 0 && size > 0 {
            return Err(ProtocolError::Timeout);
        }

        let stats = TransferStats {
            declared_size: size,
            received,
            packets: 0,
            errors: 0,
        };
        self.last_transfer = Some(stats);

        if received < size && self.config.incomplete_transfer == IncompleteTransfer::Fail {
            self.transport.clear_input()?;
            return Err(ProtocolError::TransferIncomplete {
                received,
                expected: size,
            });
        }

        self.send_ack(0)?;
        self.accept_transfer(buffer, stats)
    }

    fn accept_transfer(
        &mut self,
        buffer: Vec<u8>,
        stats: TransferStats,
    ) -> Result<Vec<u8>, ProtocolError> {
        if stats.is_complete() {
            info!(
                bytes = stats.declared_size,
                packets = stats.packets,
                errors = stats.errors,
                "picture received"
            );
            return Ok(buffer);
        }

        match self.config.incomplete_transfer {
            IncompleteTransfer::Fail => Err(ProtocolError::TransferIncomplete {
                received: stats.received,
                expected: stats.declared_size,
            }),
            IncompleteTransfer::Accept => {
                warn!(
                    received = stats.received,
                    expected = stats.declared_size,
                    "returning incomplete picture"
                );
                Ok(buffer)
            }
        }
    }

    /// Read one packet, copying its payload to the start of `dest`.
    ///
    /// `dest` is the unfilled tail of the image buffer, so a packet can never
    /// write past the declared picture size.
    fn receive_packet(&mut self, dest: &mut [u8], max_payload: usize) -> Result<usize, ProtocolError> {
        let timeout = self.config.packet_timeout();
        let deadline = Instant::now() + timeout;

        let mut raw_header = [0u8; PACKET_HEADER_SIZE];
        let n = self.read_bytes(&mut raw_header, timeout)?;
        if n < PACKET_HEADER_SIZE {
            if n > 0 {
                self.transport.clear_input()?;
            }
            return Err(ProtocolError::Timeout);
        }

        let header = PacketHeader::from_bytes(&raw_header);
        let length = match header.validate(dest.len(), max_payload) {
            Ok(length) => length,
            Err(e) => {
                self.transport.clear_input()?;
                return Err(e);
            }
        };
        if header.sequence != self.sequence {
            // Late or repeated packet; its payload belongs elsewhere in the image
            self.transport.clear_input()?;
            return Err(ProtocolError::InvalidPacket(format!(
                "packet id {} while waiting for {}",
                header.sequence, self.sequence
            )));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let n = self.read_bytes(&mut dest[..length], remaining)?;
        if n < length {
            self.transport.clear_input()?;
            return Err(ProtocolError::Timeout);
        }

        if self.config.verify_packets {
            let mut code = [0u8; VERIFY_CODE_SIZE];
            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = self.read_bytes(&mut code, remaining)?;
            if n < VERIFY_CODE_SIZE {
                self.transport.clear_input()?;
                return Err(ProtocolError::Timeout);
            }
            let expected = packet::verify_code(&raw_header, &dest[..length]);
            if code != expected {
                return Err(ProtocolError::InvalidPacket(format!(
                    "packet {} verify code {:02x?}, expected {:02x?}",
                    header.sequence, code, expected
                )));
            }
        }

        debug!(sequence = header.sequence, length, "rx packet");
        Ok(length)
    }
}
