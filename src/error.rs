/// Errors that can occur when talking to a MYNT EYE device.
///
/// Degraded conditions (missing side channel, missing calibration) are not
/// errors: the camera logs them and falls back to defaults. Only hard
/// failures end up here.
#[derive(Debug, thiserror::Error)]
pub enum MynteyeError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device not found (VID=04B4 PID=00F9)")]
    DeviceNotFound,

    #[error("HID command failed: {0}")]
    HidCommand(String),

    #[error("Invalid response: expected prefix 0x01, got 0x{0:02x}")]
    InvalidResponse(u8),

    #[error("Command echo mismatch")]
    CommandMismatch,

    #[error("Malformed device files: {0}")]
    MalformedFiles(String),

    #[error("Camera open failed")]
    CameraOpenFailed,

    #[error("Camera is not opened")]
    NotOpened,

    #[error("Data channel is unavailable")]
    ChannelUnavailable,
}
