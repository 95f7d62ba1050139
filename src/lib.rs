//! # mynteye - session coordinator for MYNT EYE stereo cameras
//!
//! Owns the camera open/close lifecycle on top of a [`Transport`], reads
//! descriptors and IMU calibration from the device flash over the HID side
//! channel, derives per-stream intrinsics/extrinsics, and keeps IMU and
//! image-info tracking running exactly while a consumer has enabled it.
//!
//! ## Quick Start
//! ```no_run
//! use mynteye::{Camera, Descriptor, OpenParams, StreamMode, Transport};
//!
//! fn run(transport: impl Transport + 'static) -> mynteye::Result<()> {
//!     let camera = Camera::new(transport);
//!     camera.enable_motion_datas(1000);
//!     camera.open(&OpenParams::new(0))?;
//!
//!     println!("serial: {}", camera.descriptor(Descriptor::SerialNumber));
//!     println!("{:?}", camera.stream_intrinsics(StreamMode::Stream2560x720));
//!     for sample in camera.motion_datas() {
//!         println!("{:?}", sample);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod diagnostics;
pub mod protocol;
pub mod hid;
pub mod channel;
pub mod calibration;
pub mod features;
pub mod motions;
pub mod streams;
pub mod transport;
pub mod camera;

pub use camera::Camera;
pub use channel::{Callbacks, HidChannel, ImgInfoSink, ImuSink, SideChannel};
pub use config::Config;
pub use diagnostics::{Reporter, Verbosity};
pub use error::MynteyeError;
pub use transport::Transport;
pub use types::*;

/// Result type alias for mynteye operations.
pub type Result<T> = std::result::Result<T, MynteyeError>;
