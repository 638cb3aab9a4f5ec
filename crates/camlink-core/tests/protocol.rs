use camlink_core::config::{CameraConfig, IncompleteTransfer};
use camlink_core::protocol::{
    packet, BaudRate, Camera, ColorType, DeviceErrorCode, Frame, JpegResolution, Opcode,
    PictureType, PreviewResolution, ProtocolError, SnapshotType, TransferState, Transport,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// One scripted answer from the camera side of the link
enum Reply {
    Bytes(Vec<u8>),
    /// A read that times out
    Silence,
}

/// Mock serial port replaying a canned sequence of replies
struct MockSerial {
    send_buffer: Vec<u8>,
    replies: VecDeque<Reply>,
    reads: usize,
    accept_limit: Option<usize>,
    baud_changes: Vec<u32>,
    /// The front reply has been partly read
    mid_reply: bool,
}

impl MockSerial {
    fn new() -> Self {
        Self {
            send_buffer: Vec::new(),
            replies: VecDeque::new(),
            reads: 0,
            accept_limit: None,
            baud_changes: Vec::new(),
            mid_reply: false,
        }
    }

    fn frame(mut self, frame: Frame) -> Self {
        self.replies.push_back(Reply::Bytes(frame.to_bytes().to_vec()));
        self
    }

    fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.replies.push_back(Reply::Bytes(bytes));
        self
    }

    fn silence(mut self) -> Self {
        self.replies.push_back(Reply::Silence);
        self
    }

    fn sent_frames(&self) -> Vec<Frame> {
        self.send_buffer
            .chunks(6)
            .map(|chunk| Frame::from_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    fn sent_ack_ids(&self) -> Vec<u16> {
        self.sent_frames()
            .into_iter()
            .filter(|f| f.is_ack())
            .map(|f| f.package_id())
            .collect()
    }
}

impl Transport for MockSerial {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let accepted = self.accept_limit.map_or(data.len(), |l| l.min(data.len()));
        self.send_buffer.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        self.reads += 1;
        match self.replies.front_mut() {
            None => Ok(0),
            Some(Reply::Silence) => {
                self.replies.pop_front();
                Ok(0)
            }
            Some(Reply::Bytes(bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes.drain(..n);
                self.mid_reply = !bytes.is_empty();
                if !self.mid_reply {
                    self.replies.pop_front();
                }
                Ok(n)
            }
        }
    }

    /// Drops the rest of the reply currently being read
    fn clear_input(&mut self) -> io::Result<()> {
        if self.mid_reply {
            self.replies.pop_front();
            self.mid_reply = false;
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.baud_changes.push(baud_rate);
        Ok(())
    }
}

fn test_config() -> CameraConfig {
    CameraConfig::default().without_delays()
}

fn camera(mock: MockSerial) -> Camera<MockSerial> {
    Camera::new(mock, test_config())
}

fn stale_frame() -> Frame {
    Frame::ack_for(Opcode::Initial, 1)
}

/// Canned reply script for GetPicture: ACK, DATA descriptor, then packets
fn picture_script(mock: MockSerial, size: u32, packets: &[Vec<u8>]) -> MockSerial {
    let mut mock = mock
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Jpeg, size));
    for (id, payload) in packets.iter().enumerate() {
        mock = mock.bytes(packet::encode(id as u16, payload, false));
    }
    mock
}

#[test]
fn test_sync_tolerates_mismatches_below_ceiling() {
    for mismatches in [0usize, 1, 7, 59] {
        let mut mock = MockSerial::new();
        for _ in 0..mismatches {
            mock = mock.frame(stale_frame());
        }
        mock = mock.frame(Frame::ack_for(Opcode::Sync, 1)).frame(Frame::sync());

        let mut cam = camera(mock);
        let attempt = cam.synchronize().expect("sync should succeed");
        assert_eq!(attempt as usize, mismatches + 1);

        let sent = cam.transport().sent_frames();
        let syncs = sent.iter().filter(|f| f.is(Opcode::Sync)).count();
        assert_eq!(syncs, mismatches + 1);
        assert_eq!(sent.last().copied(), Some(Frame::ack(0)));
    }
}

#[test]
fn test_sync_fails_after_ceiling() {
    let mut mock = MockSerial::new();
    for _ in 0..60 {
        mock = mock.frame(stale_frame());
    }
    mock = mock.frame(Frame::ack_for(Opcode::Sync, 1)).frame(Frame::sync());

    let mut cam = camera(mock);
    let result = cam.synchronize();
    assert!(matches!(result, Err(ProtocolError::SyncFailed { attempts: 60 })));
    assert!(!cam.transport().sent_frames().iter().any(|f| f.is_ack()));
}

#[test]
fn test_sync_fails_on_silent_link() {
    let mut cam = camera(MockSerial::new());
    assert!(matches!(
        cam.synchronize(),
        Err(ProtocolError::SyncFailed { attempts: 60 })
    ));
    assert_eq!(cam.transport().sent_frames().len(), 60);
}

#[test]
fn test_sync_restarts_when_camera_sync_missing() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::Sync, 1))
        .frame(stale_frame())
        .frame(Frame::ack_for(Opcode::Sync, 2))
        .silence()
        .frame(Frame::nak(0x04))
        .frame(Frame::ack_for(Opcode::Sync, 3))
        .frame(Frame::sync());

    let mut cam = camera(mock);
    assert_eq!(cam.synchronize().unwrap(), 4);
}

#[test]
fn test_sync_realigns_after_noise_byte() {
    let mut noisy = vec![0x00];
    noisy.extend(Frame::ack_for(Opcode::Sync, 1).to_bytes());
    noisy.extend(Frame::sync().to_bytes());
    let mock = MockSerial::new()
        .bytes(noisy)
        .frame(Frame::ack_for(Opcode::Sync, 2))
        .frame(Frame::sync());

    let mut cam = camera(mock);
    assert_eq!(cam.synchronize().unwrap(), 2);
    assert!(cam.transport().replies.is_empty());

    let sent = cam.transport().sent_frames();
    assert_eq!(sent.iter().filter(|f| f.is(Opcode::Sync)).count(), 2);
    assert_eq!(sent.last().copied(), Some(Frame::ack(0)));
}

#[test]
fn test_receive_ack_discards_misaligned_bytes() {
    let mut misaligned = vec![0x00];
    misaligned.extend(Frame::ack_for(Opcode::Initial, 1).to_bytes());
    let mock = MockSerial::new()
        .bytes(misaligned)
        .frame(Frame::ack_for(Opcode::Initial, 2));

    let mut cam = camera(mock);
    assert!(matches!(
        cam.receive_ack(Opcode::Initial, Duration::from_millis(100)),
        Err(ProtocolError::Mismatch {
            expected: 0xAA,
            actual: 0x00
        })
    ));
    let ack = cam
        .receive_ack(Opcode::Initial, Duration::from_millis(100))
        .unwrap();
    assert_eq!(ack.counter, 2);
}

#[test]
fn test_receive_ack_surfaces_nak_immediately() {
    let mock = MockSerial::new()
        .frame(Frame::nak(0x0B))
        .frame(Frame::ack_for(Opcode::Initial, 1));

    let mut cam = camera(mock);
    let result = cam.receive_ack(Opcode::Initial, Duration::from_millis(100));
    match result {
        Err(ProtocolError::DeviceError(code)) => {
            assert_eq!(code, DeviceErrorCode(0x0B));
            assert_eq!(code, DeviceErrorCode::PARAMETER_ERROR);
        }
        other => panic!("expected device error, got {:?}", other),
    }
    assert_eq!(cam.transport().reads, 1);
    assert_eq!(cam.transport().replies.len(), 1);
}

#[test]
fn test_receive_ack_timeout_and_mismatch() {
    let mut cam = camera(MockSerial::new());
    assert!(matches!(
        cam.receive_ack(Opcode::Reset, Duration::from_millis(100)),
        Err(ProtocolError::Timeout)
    ));

    let mut cam = camera(MockSerial::new().frame(Frame::ack_for(Opcode::Snapshot, 1)));
    assert!(matches!(
        cam.receive_ack(Opcode::Initial, Duration::from_millis(100)),
        Err(ProtocolError::Mismatch {
            expected: 0x01,
            actual: 0x05
        })
    ));

    let mut cam = camera(MockSerial::new().frame(Frame::sync()));
    assert!(matches!(
        cam.receive_ack(Opcode::Initial, Duration::from_millis(100)),
        Err(ProtocolError::Mismatch {
            expected: 0x0E,
            actual: 0x0D
        })
    ));
}

#[test]
fn test_receive_ack_partial_frame_is_timeout() {
    let mut cam = camera(MockSerial::new().bytes(vec![0xAA, 0x0E, 0x01]));
    assert!(matches!(
        cam.receive_ack(Opcode::Initial, Duration::from_millis(100)),
        Err(ProtocolError::Timeout)
    ));
}

#[test]
fn test_receive_ack_decodes_fields() {
    let mock = MockSerial::new().bytes(vec![0xAA, 0x0E, 0x04, 0x07, 0x02, 0x00]);
    let mut cam = camera(mock);
    let ack = cam
        .receive_ack(Opcode::GetPicture, Duration::from_millis(100))
        .unwrap();
    assert_eq!(ack.opcode, 0x04);
    assert_eq!(ack.counter, 0x07);
    assert_eq!(ack.package_id, 2);
}

#[test]
fn test_short_write_is_reported() {
    let mut mock = MockSerial::new();
    mock.accept_limit = Some(3);
    let mut cam = camera(mock);
    assert!(matches!(
        cam.send_command(&Frame::power_off()),
        Err(ProtocolError::ShortWrite {
            expected: 6,
            written: 3
        })
    ));
}

#[test]
fn test_initialize_negotiates_packet_size() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::Initial, 1))
        .frame(Frame::ack_for(Opcode::PackageSize, 2));
    let mut cam = camera(mock);
    cam.initialize(
        ColorType::Jpeg,
        PreviewResolution::R160x120,
        JpegResolution::R320x240,
    )
    .unwrap();

    let sent = cam.transport().sent_frames();
    assert_eq!(
        sent,
        vec![
            Frame::initial(
                ColorType::Jpeg,
                PreviewResolution::R160x120,
                JpegResolution::R320x240
            ),
            Frame::package_size(512),
        ]
    );
    assert_eq!(cam.packet_size(), 512);
}

#[test]
fn test_initialize_stops_on_nak() {
    let mock = MockSerial::new().frame(Frame::nak(0x0B));
    let mut cam = camera(mock);
    let result = cam.initialize(
        ColorType::Color16,
        PreviewResolution::R80x60,
        JpegResolution::R640x480,
    );
    assert!(matches!(result, Err(ProtocolError::DeviceError(_))));
    assert_eq!(cam.transport().sent_frames().len(), 1);
}

#[test]
fn test_set_packet_size_range() {
    let mut cam = camera(MockSerial::new());
    assert!(matches!(
        cam.set_packet_size(600),
        Err(ProtocolError::InvalidParameter(_))
    ));
    assert!(cam.transport().sent_frames().is_empty());
}

#[test]
fn test_configuration_commands() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::BaudRate, 1))
        .frame(Frame::ack_for(Opcode::LightFreq, 2))
        .frame(Frame::ack_for(Opcode::Snapshot, 3))
        .frame(Frame::ack_for(Opcode::Reset, 4))
        .frame(Frame::ack_for(Opcode::PowerOff, 5));
    let mut cam = camera(mock);

    cam.set_baud_rate(BaudRate::Baud57600).unwrap();
    cam.set_light_frequency(camlink_core::protocol::LightFrequency::F50Hz)
        .unwrap();
    cam.snapshot(SnapshotType::Compressed, 0x0102).unwrap();
    cam.reset(false).unwrap();
    cam.power_off().unwrap();

    let sent: Vec<[u8; 6]> = cam
        .transport()
        .sent_frames()
        .iter()
        .map(|f| f.to_bytes())
        .collect();
    assert_eq!(
        sent,
        vec![
            [0xAA, 0x07, 0x1F, 0x01, 0x00, 0x00],
            [0xAA, 0x13, 0x00, 0x00, 0x00, 0x00],
            [0xAA, 0x05, 0x00, 0x02, 0x01, 0x00],
            [0xAA, 0x08, 0x01, 0x00, 0x00, 0xFF],
            [0xAA, 0x09, 0x00, 0x00, 0x00, 0x00],
        ]
    );
    assert_eq!(cam.transport().baud_changes, vec![57600]);
    assert_eq!(cam.config().baud_rate, 57600);
}

#[test]
fn test_end_to_end_jpeg_capture() {
    let image: Vec<u8> = (0..1200u32).map(|i| (i * 7 % 251) as u8).collect();
    let packets = vec![
        image[..508].to_vec(),
        image[508..1016].to_vec(),
        image[1016..].to_vec(),
    ];

    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::Initial, 1))
        .frame(Frame::ack_for(Opcode::PackageSize, 2))
        .frame(Frame::ack_for(Opcode::Snapshot, 3));
    let mock = picture_script(mock, 1200, &packets);
    let mut cam = camera(mock);

    cam.initialize(
        ColorType::Jpeg,
        PreviewResolution::R160x120,
        JpegResolution::R320x240,
    )
    .unwrap();
    cam.snapshot(SnapshotType::Compressed, 0).unwrap();
    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::from_millis(800))
        .unwrap();

    assert_eq!(picture.len(), 1200);
    assert_eq!(picture, image);
    assert_eq!(cam.transfer_state(), TransferState::Complete);
    assert_eq!(cam.transport().sent_ack_ids(), vec![0, 1, 2, 3]);

    let stats = cam.last_transfer().unwrap();
    assert_eq!(stats.declared_size, 1200);
    assert_eq!(stats.received, 1200);
    assert_eq!(stats.packets, 3);
    assert_eq!(stats.errors, 0);
}

#[test]
fn test_reassembly_of_uneven_packets() {
    let packets: Vec<Vec<u8>> = [100usize, 7, 300, 93]
        .iter()
        .enumerate()
        .map(|(i, len)| vec![i as u8 + 1; *len])
        .collect();
    let expected: Vec<u8> = packets.concat();

    let mut cam = camera(picture_script(MockSerial::new(), 500, &packets));
    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, expected);
    assert_eq!(cam.sequence(), 4);
}

#[test]
fn test_lost_packet_is_requested_again() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Jpeg, 10))
        .silence()
        .bytes(packet::encode(0, &[9; 10], false));

    let mut cam = camera(mock);
    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, vec![9; 10]);
    assert_eq!(cam.error_count(), 1);
    assert_eq!(cam.transport().sent_ack_ids(), vec![0, 0, 1]);
}

#[test]
fn test_late_duplicate_packet_is_requested_again() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Jpeg, 8))
        .silence()
        .bytes(packet::encode(0, &[0xA0; 4], false))
        .bytes(packet::encode(0, &[0xA0; 4], false))
        .bytes(packet::encode(1, &[0xB1; 4], false));

    let mut cam = camera(mock);
    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, [[0xA0; 4], [0xB1; 4]].concat());
    assert_eq!(cam.error_count(), 2);
    assert_eq!(cam.transport().sent_ack_ids(), vec![0, 0, 1, 1, 2]);
    assert_eq!(cam.last_transfer().unwrap().packets, 2);
}

#[test]
fn test_error_budget_fails_transfer_by_default() {
    let mock = picture_script(MockSerial::new(), 1000, &[vec![5; 200]]);
    let mut cam = camera(mock);

    let result = cam.get_jpeg_picture(PictureType::Jpeg, Duration::ZERO);
    assert!(matches!(
        result,
        Err(ProtocolError::TransferIncomplete {
            received: 200,
            expected: 1000
        })
    ));
    assert_eq!(cam.error_count(), 16);
    assert_eq!(cam.transfer_state(), TransferState::Failed);

    let mut expected_ids = vec![0u16];
    expected_ids.extend(std::iter::repeat(1).take(16));
    expected_ids.push(1);
    assert_eq!(cam.transport().sent_ack_ids(), expected_ids);
}

#[test]
fn test_error_budget_can_return_truncated_picture() {
    let mock = picture_script(MockSerial::new(), 1000, &[vec![5; 200]]);
    let mut config = test_config();
    config.incomplete_transfer = IncompleteTransfer::Accept;
    let mut cam = Camera::new(mock, config);

    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture.len(), 1000);
    assert_eq!(&picture[..200], &[5; 200][..]);
    assert!(picture[200..].iter().all(|b| *b == 0));
    assert_eq!(cam.error_count(), 16);
    assert!(!cam.last_transfer().unwrap().is_complete());
}

#[test]
fn test_oversized_packet_is_rejected() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Jpeg, 8))
        .bytes(packet::encode(0, &[1; 12], false))
        .bytes(packet::encode(0, &[2; 8], false));

    let mut cam = camera(mock);
    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, vec![2; 8]);
    assert_eq!(cam.error_count(), 1);
}

#[test]
fn test_picture_request_rejects_non_data_frame() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::sync());
    let mut cam = camera(mock);

    let result = cam.get_jpeg_picture(PictureType::Jpeg, Duration::ZERO);
    assert!(matches!(
        result,
        Err(ProtocolError::Mismatch {
            expected: 0x0A,
            actual: 0x0D
        })
    ));
    assert_eq!(cam.transfer_state(), TransferState::Failed);
    assert!(cam.last_transfer().is_none());
    assert!(cam.transport().sent_ack_ids().is_empty());
}

#[test]
fn test_picture_request_nak_is_device_error() {
    let mock = MockSerial::new().frame(Frame::nak(0x0F));
    let mut cam = camera(mock);
    let result = cam.get_jpeg_picture(PictureType::Snapshot, Duration::ZERO);
    assert!(matches!(
        result,
        Err(ProtocolError::DeviceError(DeviceErrorCode::PICTURE_NOT_READY))
    ));
}

#[test]
fn test_raw_picture_single_read() {
    let image: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Preview, 300))
        .bytes(image.clone());
    let mut cam = camera(mock);

    let picture = cam
        .get_raw_picture(PictureType::Preview, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, image);
    assert_eq!(cam.transport().sent_ack_ids(), vec![0]);
    assert_eq!(cam.transfer_state(), TransferState::Complete);
}

#[test]
fn test_raw_picture_timeout_and_partial() {
    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Preview, 300));
    let mut cam = camera(mock);
    assert!(matches!(
        cam.get_raw_picture(PictureType::Preview, Duration::ZERO),
        Err(ProtocolError::Timeout)
    ));

    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Preview, 300))
        .bytes(vec![1; 120]);
    let mut cam = camera(mock);
    assert!(matches!(
        cam.get_raw_picture(PictureType::Preview, Duration::ZERO),
        Err(ProtocolError::TransferIncomplete {
            received: 120,
            expected: 300
        })
    ));
    assert!(cam.transport().sent_ack_ids().is_empty());
}

#[test]
fn test_verified_packets() {
    let mut config = test_config();
    config.verify_packets = true;

    let mut corrupted = packet::encode(0, &[3; 4], true);
    let last = corrupted.len() - 2;
    corrupted[last] ^= 0xFF;

    let mock = MockSerial::new()
        .frame(Frame::ack_for(Opcode::GetPicture, 1))
        .frame(Frame::data(PictureType::Jpeg, 4))
        .bytes(corrupted)
        .bytes(packet::encode(0, &[3; 4], true));
    let mut cam = Camera::new(mock, config);

    let picture = cam
        .get_jpeg_picture(PictureType::Jpeg, Duration::ZERO)
        .unwrap();
    assert_eq!(picture, vec![3; 4]);
    assert_eq!(cam.error_count(), 1);
}

#[test]
fn test_link_counters() {
    let mock = MockSerial::new().frame(Frame::ack_for(Opcode::PowerOff, 1));
    let mut cam = camera(mock);
    cam.power_off().unwrap();

    let counters = cam.counters();
    assert_eq!(counters.tx_bytes, 6);
    assert_eq!(counters.tx_frames, 1);
    assert_eq!(counters.rx_bytes, 6);
    assert_eq!(counters.rx_frames, 1);
}

#[test]
fn test_protocol_error_display() {
    let err = ProtocolError::Timeout;
    assert!(!err.to_string().is_empty());
    let err = ProtocolError::SyncFailed { attempts: 60 };
    assert_eq!(
        err.to_string(),
        "Camera did not synchronize after 60 attempts"
    );
}
