use crate::protocol::{self, PREFIX_DEVICE_TO_HOST, REPORT_SIZE};
use crate::types::{DeviceFiles, Version};
use crate::{MynteyeError, Result};
use hidapi::HidDevice;
use std::time::Duration;

/// Delay between a command write and reading its response.
const RESPONSE_DELAY: Duration = Duration::from_millis(20);

/// Command transport over the HID side channel.
///
/// `write()` uses byte[0] as the report ID. The protocol prefix 0x02
/// (host-to-device) doubles as the output report ID, so `build_command()`
/// output can be passed to `write()` as is.
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self { device }
    }

    fn send(&self, buf: &[u8; REPORT_SIZE]) -> Result<Vec<u8>> {
        self.device
            .write(buf)
            .map_err(|e| MynteyeError::HidCommand(format!("write failed: {}", e)))?;

        std::thread::sleep(RESPONSE_DELAY);

        let mut recv_buf = [0u8; REPORT_SIZE + 1];
        recv_buf[0] = PREFIX_DEVICE_TO_HOST;
        let len = self
            .device
            .get_input_report(&mut recv_buf)
            .map_err(|e| MynteyeError::HidCommand(format!("get_input_report failed: {}", e)))?;

        let response = recv_buf[..len].to_vec();
        if response.first() != Some(&PREFIX_DEVICE_TO_HOST) {
            return Err(MynteyeError::InvalidResponse(
                response.first().copied().unwrap_or(0),
            ));
        }
        Ok(response)
    }

    /// Send a prebuilt command and return the response payload after the echo.
    fn command(&self, buf: &[u8; REPORT_SIZE], echo: &[u8]) -> Result<Vec<u8>> {
        let response = self.send(buf)?;
        let offset = protocol::validate_response(&response, echo)?;
        Ok(response[offset..].to_vec())
    }

    /// Read the firmware version, e.g. "1.2".
    pub fn read_version(&self) -> Result<Version> {
        let payload = self.command(
            &protocol::build_command(protocol::CMD_VERSION),
            protocol::CMD_VERSION,
        )?;
        let text = protocol::extract_string(&payload);
        text.parse()
            .map_err(|_| MynteyeError::HidCommand(format!("unparsable firmware version '{}'", text)))
    }

    /// Read and decode the device files blob chunk by chunk.
    pub fn read_files(&self) -> Result<DeviceFiles> {
        let payload = self.command(
            &protocol::build_command(protocol::CMD_FILES_SIZE),
            protocol::CMD_FILES_SIZE,
        )?;
        if payload.len() < 2 {
            return Err(MynteyeError::MalformedFiles("short size response".into()));
        }
        let total = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        log::debug!("Reading {} bytes of device files", total);

        let mut blob = Vec::with_capacity(total);
        while blob.len() < total {
            let payload = self.command(
                &protocol::build_files_read_cmd(blob.len() as u16),
                protocol::CMD_FILES_READ,
            )?;
            let len = payload.first().copied().unwrap_or(0) as usize;
            if len == 0 || len > protocol::READ_CHUNK || payload.len() < 1 + len {
                return Err(MynteyeError::MalformedFiles(format!(
                    "bad chunk length {} at offset {}",
                    len,
                    blob.len()
                )));
            }
            let take = len.min(total - blob.len());
            blob.extend_from_slice(&payload[1..1 + take]);
        }

        protocol::decode_files(&blob)
    }

    /// Write an encoded files blob and commit it to flash.
    pub fn write_files(&self, blob: &[u8]) -> Result<()> {
        if blob.len() > u16::MAX as usize {
            return Err(MynteyeError::MalformedFiles(format!(
                "blob of {} bytes does not fit",
                blob.len()
            )));
        }
        for (i, chunk) in blob.chunks(protocol::WRITE_CHUNK).enumerate() {
            let offset = (i * protocol::WRITE_CHUNK) as u16;
            let ack = self.command(
                &protocol::build_files_write_cmd(offset, chunk),
                protocol::CMD_FILES_WRITE,
            )?;
            if ack.first() != Some(&0) {
                return Err(MynteyeError::HidCommand(format!(
                    "files write rejected at offset {}",
                    offset
                )));
            }
        }

        let ack = self.command(
            &protocol::build_command(protocol::CMD_FILES_COMMIT),
            protocol::CMD_FILES_COMMIT,
        )?;
        if ack.first() != Some(&0) {
            return Err(MynteyeError::HidCommand("files commit rejected".into()));
        }
        Ok(())
    }

    /// Send the start/stop IMU stream command. The response may be all zeros.
    pub fn imu_stream(&self, start: bool) -> Result<()> {
        let cmd_buf = protocol::build_imu_stream_cmd(start);
        self.device
            .write(&cmd_buf)
            .map_err(|e| MynteyeError::HidCommand(format!("IMU stream cmd failed: {}", e)))?;

        std::thread::sleep(RESPONSE_DELAY);

        let mut recv_buf = [0u8; REPORT_SIZE + 1];
        recv_buf[0] = PREFIX_DEVICE_TO_HOST;
        let _ = self.device.get_input_report(&mut recv_buf);

        Ok(())
    }
}
