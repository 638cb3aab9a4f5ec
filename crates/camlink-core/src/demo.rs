//! Demo Mode - Simulated camera for testing
//!
//! An in-process [`Transport`] that answers frames the way the camera does,
//! so the protocol engine can be exercised without hardware. Answers are
//! queued immediately when a frame is written; reads never block.

use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::time::Duration;

use crate::protocol::{
    packet, BaudRate, DeviceErrorCode, Frame, Opcode, PictureType, SnapshotType, Transport,
    DEFAULT_BAUD_RATE, DEFAULT_PACKET_SIZE, FRAME_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Streaming {
    None,
    /// Serving packets, waiting for package-id ACKs
    Packets,
    /// Raw block sent, waiting for the closing ACK
    Raw,
}

/// Simulated C328-class camera
pub struct SimulatedCamera {
    image: Vec<u8>,
    outbox: VecDeque<u8>,
    inbox: Vec<u8>,
    received: Vec<Frame>,
    /// SYNC frames ignored before the camera answers
    boot_syncs: u32,
    packet_size: u16,
    verify_packets: bool,
    nak: Option<(Opcode, u8)>,
    drop_once: HashSet<u16>,
    /// Bytes emitted ahead of the next reply
    noise: Vec<u8>,
    snapshot: Option<SnapshotType>,
    streaming: Streaming,
    ack_counter: u8,
    baud_rate: u32,
    powered: bool,
}

impl SimulatedCamera {
    /// Camera that serves `image` for every picture request
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            outbox: VecDeque::new(),
            inbox: Vec::new(),
            received: Vec::new(),
            boot_syncs: 0,
            packet_size: DEFAULT_PACKET_SIZE,
            verify_packets: false,
            nak: None,
            drop_once: HashSet::new(),
            noise: Vec::new(),
            snapshot: None,
            streaming: Streaming::None,
            ack_counter: 0,
            baud_rate: DEFAULT_BAUD_RATE,
            powered: true,
        }
    }

    /// Camera serving `size` pseudo-random bytes framed by JPEG SOI/EOI markers
    pub fn with_random_image(size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut image: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
        if size >= 4 {
            image[..2].copy_from_slice(&[0xFF, 0xD8]);
            image[size - 2..].copy_from_slice(&[0xFF, 0xD9]);
        }
        Self::new(image)
    }

    /// Ignore the first `syncs` SYNC frames, like a camera still booting
    pub fn boot_delay(mut self, syncs: u32) -> Self {
        self.boot_syncs = syncs;
        self
    }

    /// Answer every `opcode` command with a NAK carrying `code`
    pub fn nak_on(mut self, opcode: Opcode, code: u8) -> Self {
        self.nak = Some((opcode, code));
        self
    }

    /// Lose the first transmission of packet `id`
    pub fn drop_packet_once(mut self, id: u16) -> Self {
        self.drop_once.insert(id);
        self
    }

    /// Put `noise` on the line just before the next reply
    pub fn line_noise(mut self, noise: Vec<u8>) -> Self {
        self.noise = noise;
        self
    }

    /// Append verify codes to packets
    pub fn verify_packets(mut self, enabled: bool) -> Self {
        self.verify_packets = enabled;
        self
    }

    /// Picture data served by the camera
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Every frame written to the camera, in order
    pub fn received_frames(&self) -> &[Frame] {
        &self.received
    }

    pub fn packet_size(&self) -> u16 {
        self.packet_size
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    fn queue(&mut self, frame: Frame) {
        self.outbox.extend(frame.to_bytes());
    }

    fn ack(&mut self, opcode: Opcode) {
        self.ack_counter = self.ack_counter.wrapping_add(1);
        let counter = self.ack_counter;
        self.queue(Frame::ack_for(opcode, counter));
    }

    fn handle(&mut self, frame: Frame) {
        self.received.push(frame);

        if !frame.has_valid_prefix() {
            self.queue(Frame::nak(0xF0));
            return;
        }
        let Some(opcode) = frame.kind() else {
            self.queue(Frame::nak(DeviceErrorCode(0x0D).code()));
            return;
        };
        if let Some((nak_opcode, code)) = self.nak {
            if nak_opcode == opcode {
                self.queue(Frame::nak(code));
                return;
            }
        }

        match opcode {
            Opcode::Sync => {
                if self.boot_syncs > 0 {
                    self.boot_syncs -= 1;
                    return;
                }
                self.ack(Opcode::Sync);
                self.queue(Frame::sync());
            }
            Opcode::Ack => self.handle_host_ack(frame.package_id()),
            Opcode::PackageSize => {
                let size = LittleEndian::read_u16(&frame.params[1..3]);
                if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
                    self.queue(Frame::nak(DeviceErrorCode::PACKAGE_SIZE_WRONG.code()));
                    return;
                }
                self.packet_size = size;
                self.ack(opcode);
            }
            Opcode::BaudRate => {
                // Acknowledged at the old rate
                self.ack(opcode);
                if let Some(rate) = BaudRate::from_divider(frame.params[0]) {
                    self.baud_rate = rate.bits_per_second();
                }
            }
            Opcode::Snapshot => {
                self.snapshot = Some(if frame.params[0] == SnapshotType::Uncompressed as u8 {
                    SnapshotType::Uncompressed
                } else {
                    SnapshotType::Compressed
                });
                self.ack(opcode);
            }
            Opcode::GetPicture => self.start_picture(frame.params[0]),
            Opcode::Reset => {
                self.streaming = Streaming::None;
                self.snapshot = None;
                self.ack(opcode);
            }
            Opcode::PowerOff => {
                self.ack(opcode);
                self.powered = false;
            }
            Opcode::Initial | Opcode::LightFreq => self.ack(opcode),
            Opcode::Data | Opcode::Nak => {
                self.queue(Frame::nak(DeviceErrorCode(0x06).code()));
            }
        }
    }

    fn start_picture(&mut self, kind: u8) {
        let packetized = if kind == PictureType::Jpeg as u8 {
            true
        } else if kind == PictureType::Snapshot as u8 {
            match self.snapshot {
                Some(SnapshotType::Compressed) => true,
                Some(SnapshotType::Uncompressed) => false,
                None => {
                    self.queue(Frame::nak(DeviceErrorCode::PICTURE_NOT_READY.code()));
                    return;
                }
            }
        } else if kind == PictureType::Preview as u8 {
            false
        } else {
            self.queue(Frame::nak(DeviceErrorCode::PICTURE_TYPE_ERROR.code()));
            return;
        };

        self.ack(Opcode::GetPicture);
        self.queue(Frame::new(
            Opcode::Data,
            [
                kind,
                self.image.len() as u8,
                (self.image.len() >> 8) as u8,
                (self.image.len() >> 16) as u8,
            ],
        ));

        if packetized {
            self.streaming = Streaming::Packets;
        } else {
            self.outbox.extend(self.image.iter().copied());
            self.streaming = Streaming::Raw;
        }
    }

    fn handle_host_ack(&mut self, id: u16) {
        match self.streaming {
            Streaming::None => {}
            Streaming::Raw => self.streaming = Streaming::None,
            Streaming::Packets => {
                let chunk = packet::max_payload(self.packet_size, self.verify_packets);
                let start = id as usize * chunk;
                if chunk == 0 || start >= self.image.len() {
                    // Closing ACK
                    self.streaming = Streaming::None;
                    return;
                }
                if self.drop_once.remove(&id) {
                    return;
                }
                let end = std::cmp::min(start + chunk, self.image.len());
                let bytes = packet::encode(id, &self.image[start..end], self.verify_packets);
                self.outbox.extend(bytes);
            }
        }
    }
}

impl Transport for SimulatedCamera {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(data);
        while self.inbox.len() >= FRAME_SIZE {
            let mut raw = [0u8; FRAME_SIZE];
            raw.copy_from_slice(&self.inbox[..FRAME_SIZE]);
            self.inbox.drain(..FRAME_SIZE);

            let queued = self.outbox.len();
            self.handle(Frame::from_bytes(&raw));
            if self.outbox.len() > queued && !self.noise.is_empty() {
                for (i, byte) in std::mem::take(&mut self.noise).into_iter().enumerate() {
                    self.outbox.insert(queued + i, byte);
                }
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let n = std::cmp::min(buf.len(), self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.outbox.clear();
        Ok(())
    }
}
