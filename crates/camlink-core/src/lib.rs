//! # camlink Core Library
//!
//! Protocol engine for C328-class serial JPEG camera modules.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Fixed 6-byte command frame encoding/decoding
//! - Bring-up synchronization with bounded retries
//! - Command/acknowledge exchanges and camera configuration
//! - Packetized and raw picture transfers with error recovery
//! - Serial and TCP transports, plus a simulated camera
//!
//! ## Example
//!
//! ```rust,ignore
//! use camlink_core::config::CameraConfig;
//! use camlink_core::protocol::{
//!     Camera, ColorType, JpegResolution, PictureType, PreviewResolution, SnapshotType,
//! };
//! use std::time::Duration;
//!
//! let config = CameraConfig { port_name: "/dev/ttyUSB0".into(), ..Default::default() };
//! let mut camera = Camera::open(config)?;
//! camera.synchronize()?;
//! camera.initialize(ColorType::Jpeg, PreviewResolution::R160x120, JpegResolution::R320x240)?;
//! camera.snapshot(SnapshotType::Compressed, 0)?;
//! let jpeg = camera.get_jpeg_picture(PictureType::Snapshot, Duration::from_millis(800))?;
//! ```

pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CameraConfig, IncompleteTransfer};
    pub use crate::demo::SimulatedCamera;
    pub use crate::protocol::{
        Camera, ColorType, JpegResolution, LightFrequency, PictureType, PreviewResolution,
        ProtocolError, SnapshotType, TransferState, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
