//! Camera session
//!
//! Owns the transport and drives the command/acknowledge exchanges:
//! bring-up synchronization, configuration commands and snapshots.
//! Picture retrieval lives in `transfer.rs`.

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{
    commands::{
        BaudRate, ColorType, DeviceErrorCode, JpegResolution, LightFrequency, Opcode,
        PreviewResolution, SnapshotType,
    },
    serial::open_port,
    transfer::{TransferState, TransferStats},
    Frame, ProtocolError, SerialTransport, Transport, FRAME_PREFIX, FRAME_SIZE, MAX_PACKET_SIZE,
    MIN_PACKET_SIZE,
};
use crate::config::CameraConfig;

/// Decoded acknowledgement sent by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Opcode being acknowledged
    pub opcode: u8,
    /// Camera's running ACK counter
    pub counter: u8,
    /// Package id field
    pub package_id: u16,
}

impl From<Frame> for Ack {
    fn from(frame: Frame) -> Self {
        Self {
            opcode: frame.acked_opcode(),
            counter: frame.params[1],
            package_id: frame.package_id(),
        }
    }
}

/// Cumulative traffic counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    /// Bytes written to the transport
    pub tx_bytes: u64,
    /// Bytes read from the transport
    pub rx_bytes: u64,
    /// Frames sent
    pub tx_frames: u64,
    /// Complete frames received
    pub rx_frames: u64,
}

/// One camera attached to one transport.
///
/// Every operation blocks until the camera answers or its timeout elapses.
/// Operations take `&mut self`, so only one exchange is ever in flight.
pub struct Camera<T: Transport> {
    pub(super) transport: T,
    pub(super) config: CameraConfig,
    /// Packet size currently negotiated with the camera
    pub(super) packet_size: u16,
    /// Package id of the next packet to request
    pub(super) sequence: u16,
    /// Packet errors seen during the current transfer
    pub(super) error_count: u32,
    pub(super) state: TransferState,
    pub(super) last_transfer: Option<TransferStats>,
    pub(super) counters: LinkCounters,
}

impl Camera<SerialTransport> {
    /// Open the configured serial port
    pub fn open(config: CameraConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let transport = open_port(&config.port_name, Some(config.baud_rate))?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Camera<T> {
    /// Create a session on an already opened transport
    pub fn new(transport: T, config: CameraConfig) -> Self {
        let packet_size = config.packet_size;
        Self {
            transport,
            config,
            packet_size,
            sequence: 0,
            error_count: 0,
            state: TransferState::Idle,
            last_transfer: None,
            counters: LinkCounters::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the session and hand back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Cumulative tx/rx counters
    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    /// Packet size the camera was last told to use
    pub fn packet_size(&self) -> u16 {
        self.packet_size
    }

    /// Synchronize with the camera.
    ///
    /// Sends SYNC until the camera answers with an ACK for SYNC followed by
    /// its own SYNC, then acknowledges it. Timeouts, NAKs and stale frames
    /// restart the attempt. Returns the attempt number that succeeded.
    pub fn synchronize(&mut self) -> Result<u32, ProtocolError> {
        let sync = Frame::sync();
        let attempts = self.config.sync_attempts;
        let timeout = self.config.ack_timeout();

        for attempt in 1..=attempts {
            self.send_command(&sync)?;

            match self.receive_ack(Opcode::Sync, timeout) {
                Ok(_) => {}
                Err(e) if retries_sync(&e) => {
                    trace!(attempt, error = %e, "sync: no ACK");
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.read_frame(timeout) {
                Ok(frame) if frame == sync => {}
                Ok(frame) => {
                    debug!(attempt, frame = ?frame.to_bytes(), "sync: expected SYNC from camera");
                    if !frame.has_valid_prefix() {
                        self.transport.clear_input()?;
                    }
                    continue;
                }
                Err(ProtocolError::Timeout) => {
                    trace!(attempt, "sync: camera did not send SYNC");
                    continue;
                }
                Err(e) => return Err(e),
            }

            self.send_ack(0)?;
            self.sequence = 0;
            self.error_count = 0;
            self.state = TransferState::Idle;
            info!(attempt, "camera synchronized");
            return Ok(attempt);
        }

        warn!(attempts, "camera did not synchronize");
        Err(ProtocolError::SyncFailed { attempts })
    }

    /// Write one frame and wait the settle interval
    pub fn send_command(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.to_bytes();
        debug!("tx {:02x?}", bytes);

        let written = self.transport.write(&bytes)?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(written as u64);
        self.counters.tx_frames = self.counters.tx_frames.saturating_add(1);

        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }

        if written != FRAME_SIZE {
            warn!(written, "short write");
            return Err(ProtocolError::ShortWrite {
                expected: FRAME_SIZE,
                written,
            });
        }
        Ok(())
    }

    /// Wait for the acknowledgement of `expected`.
    ///
    /// A NAK fails immediately with the camera's error code.
    pub fn receive_ack(&mut self, expected: Opcode, timeout: Duration) -> Result<Ack, ProtocolError> {
        let frame = self.read_frame(timeout)?;

        if !frame.has_valid_prefix() {
            // Out of step with the camera's frames; drop what is buffered
            self.transport.clear_input()?;
            return Err(ProtocolError::Mismatch {
                expected: FRAME_PREFIX,
                actual: frame.prefix,
            });
        }

        if frame.is_nak() {
            let code = DeviceErrorCode(frame.nak_error());
            warn!(command = ?expected, %code, "camera sent NAK");
            return Err(ProtocolError::DeviceError(code));
        }

        if !frame.is_ack() {
            return Err(ProtocolError::Mismatch {
                expected: Opcode::Ack.byte(),
                actual: frame.opcode,
            });
        }

        if frame.acked_opcode() != expected.byte() {
            return Err(ProtocolError::Mismatch {
                expected: expected.byte(),
                actual: frame.acked_opcode(),
            });
        }

        Ok(Ack::from(frame))
    }

    /// Send an ACK carrying a package id
    pub fn send_ack(&mut self, package_id: u16) -> Result<(), ProtocolError> {
        self.send_command(&Frame::ack(package_id))
    }

    /// Set colour type and resolutions, then negotiate the packet size
    pub fn initialize(
        &mut self,
        color: ColorType,
        preview: PreviewResolution,
        jpeg: JpegResolution,
    ) -> Result<(), ProtocolError> {
        self.command(Frame::initial(color, preview, jpeg))?;
        self.set_packet_size(self.config.packet_size)
    }

    /// Negotiate the size of image data packets
    pub fn set_packet_size(&mut self, size: u16) -> Result<(), ProtocolError> {
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(ProtocolError::InvalidParameter(format!(
                "packet size {} outside {}..={}",
                size, MIN_PACKET_SIZE, MAX_PACKET_SIZE
            )));
        }
        self.command(Frame::package_size(size))?;
        self.packet_size = size;
        Ok(())
    }

    /// Switch the camera to another baud rate; the transport follows once
    /// the camera acknowledged at the old rate
    pub fn set_baud_rate(&mut self, rate: BaudRate) -> Result<(), ProtocolError> {
        self.command(Frame::baud_rate(rate))?;
        let bps = rate.bits_per_second();
        self.transport.set_baud_rate(bps)?;
        self.config.baud_rate = bps;
        info!(baud = bps, "baud rate changed");
        Ok(())
    }

    /// Set the mains frequency for flicker suppression
    pub fn set_light_frequency(&mut self, frequency: LightFrequency) -> Result<(), ProtocolError> {
        self.command(Frame::light_frequency(frequency))?;
        Ok(())
    }

    /// Reset the camera state machine, or the whole module when `full`
    pub fn reset(&mut self, full: bool) -> Result<(), ProtocolError> {
        self.command(Frame::reset(full))?;
        self.sequence = 0;
        self.error_count = 0;
        self.state = TransferState::Idle;
        Ok(())
    }

    /// Put the camera into power-saving mode
    pub fn power_off(&mut self) -> Result<(), ProtocolError> {
        self.command(Frame::power_off())?;
        Ok(())
    }

    /// Capture a picture into the camera's buffer after dropping
    /// `skip_frames` frames
    pub fn snapshot(&mut self, kind: SnapshotType, skip_frames: u16) -> Result<(), ProtocolError> {
        self.command(Frame::snapshot(kind, skip_frames))?;
        Ok(())
    }

    /// Send a command and wait for its ACK with the configuration timeout
    fn command(&mut self, frame: Frame) -> Result<Ack, ProtocolError> {
        let opcode = frame.kind().ok_or_else(|| {
            ProtocolError::InvalidParameter(format!("unknown opcode {:#04x}", frame.opcode))
        })?;
        self.send_command(&frame)?;
        self.receive_ack(opcode, self.config.ack_timeout())
    }

    /// Read one frame; nothing or a partial frame within `timeout` is a timeout.
    ///
    /// A partial frame also flushes the input so the next read starts on a
    /// frame boundary.
    pub(super) fn read_frame(&mut self, timeout: Duration) -> Result<Frame, ProtocolError> {
        let mut buf = [0u8; FRAME_SIZE];
        let n = self.read_bytes(&mut buf, timeout)?;
        if n < FRAME_SIZE {
            if n > 0 {
                debug!("rx partial frame {:02x?}", &buf[..n]);
                self.transport.clear_input()?;
            }
            return Err(ProtocolError::Timeout);
        }
        self.counters.rx_frames = self.counters.rx_frames.saturating_add(1);
        debug!("rx {:02x?}", buf);
        Ok(Frame::from_bytes(&buf))
    }

    pub(super) fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let n = self.transport.read(buf, timeout)?;
        self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(n as u64);
        Ok(n)
    }
}

/// Errors that restart a sync attempt instead of aborting it
fn retries_sync(err: &ProtocolError) -> bool {
    matches!(
        err,
        ProtocolError::Timeout | ProtocolError::Mismatch { .. } | ProtocolError::DeviceError(_)
    )
}
