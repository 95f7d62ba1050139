//! The camera collaborator that owns the UVC device: opening, closing and
//! fetching raw stereo calibration. Frame decoding lives behind it.

use crate::types::{DeviceInfo, OpenParams, RawStreamCalibration, StreamInfo, StreamMode};
use crate::Result;
use rusb::UsbContext;
use std::path::Path;
use std::time::Duration;

/// USB vendor id of the camera (UVC) interface.
pub const CAMERA_VID: u16 = 0x1E4E;

const STRING_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens the camera and serves its calibration.
pub trait Transport: Send {
    /// Cameras on the bus.
    fn device_infos(&self) -> Vec<DeviceInfo> {
        match list_devices() {
            Ok(infos) => infos,
            Err(e) => {
                log::warn!("USB enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Color and depth stream configurations of device `dev_index`.
    fn stream_infos(&self, dev_index: i32) -> (Vec<StreamInfo>, Vec<StreamInfo>);

    /// Returns false if the device refused to open.
    fn open(&mut self, params: &OpenParams) -> bool;

    fn close(&mut self);

    fn is_opened(&self) -> bool;

    /// Fresh raw calibration for `mode`, read from the device.
    fn camera_calibration(&self, mode: StreamMode) -> RawStreamCalibration;

    /// Replace the device calibration with the contents of a binary file.
    fn set_camera_calibration_bin_file(&mut self, path: &Path) -> bool;

    /// Dump the calibration for `mode` to a file.
    fn save_camera_calibration_file(&self, mode: StreamMode, path: &Path) -> Result<()>;
}

/// List MYNT EYE cameras on the USB bus.
///
/// Name and serial come from the string descriptors; they are left empty
/// when the device cannot be opened (e.g. missing permissions).
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let context = rusb::Context::new()?;
    let mut infos = Vec::new();

    for device in context.devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Skipping USB device without descriptor: {}", e);
                continue;
            }
        };
        if desc.vendor_id() != CAMERA_VID {
            continue;
        }

        let (name, serial_number) = match device.open() {
            Ok(handle) => {
                let language = handle
                    .read_languages(STRING_TIMEOUT)
                    .ok()
                    .and_then(|langs| langs.first().copied());
                match language {
                    Some(lang) => (
                        handle
                            .read_product_string(lang, &desc, STRING_TIMEOUT)
                            .unwrap_or_default(),
                        handle
                            .read_serial_number_string(lang, &desc, STRING_TIMEOUT)
                            .unwrap_or_default(),
                    ),
                    None => (String::new(), String::new()),
                }
            }
            Err(e) => {
                log::warn!(
                    "Cannot open camera at bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                (String::new(), String::new())
            }
        };

        infos.push(DeviceInfo {
            index: infos.len() as i32,
            name,
            serial_number,
        });
    }

    Ok(infos)
}
