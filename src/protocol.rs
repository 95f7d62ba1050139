use crate::types::{
    DeviceFiles, Descriptors, HardwareVersion, ImgInfo, ImuData, ImuFlag, ImuIntrinsics,
    ImuParams, MotionExtrinsics, Type, Version,
};
use crate::{MynteyeError, Result};

// -- USB identifiers of the HID side channel --
pub const VID: u16 = 0x04B4;
pub const PID: u16 = 0x00F9;
pub const HID_INTERFACE: i32 = 1;

// -- Packet geometry --
pub const REPORT_SIZE: usize = 63;

// -- Command direction prefixes --
pub const PREFIX_HOST_TO_DEVICE: u8 = 0x02;
pub const PREFIX_DEVICE_TO_HOST: u8 = 0x01;

// -- Command bytes (after the 0x02 prefix) --
pub const CMD_VERSION: &[u8] = &[0x1C, 0x99];
pub const CMD_FILES_SIZE: &[u8] = &[0xF1, 0x00];
pub const CMD_FILES_READ: &[u8] = &[0xF1, 0x01];
pub const CMD_FILES_WRITE: &[u8] = &[0xF1, 0x02];
pub const CMD_FILES_COMMIT: &[u8] = &[0xF1, 0x03];
pub const CMD_IMU_STREAM: &[u8] = &[0xA3, 0x10];

/// Payload bytes per read chunk: prefix + 2 echo bytes + length byte.
pub const READ_CHUNK: usize = REPORT_SIZE - 4;
/// Payload bytes per write chunk: prefix + 2 cmd bytes + offset(2) + length.
pub const WRITE_CHUNK: usize = REPORT_SIZE - 6;

/// Firmware older than this cannot transfer device files.
pub const MIN_FILES_FIRMWARE: Version = Version::new(1, 0);

// -- Data reports (IMU + image info) --
pub const DATA_HEADER: u8 = 0x5A;
pub const SEGMENT_SIZE: usize = 17;
pub const MAX_SEGMENTS: usize = 3;
/// header + count + segments + checksum
pub const DATA_REPORT_LEN: usize = 2 + SEGMENT_SIZE * MAX_SEGMENTS + 1;

pub const SEGMENT_ACCEL: u8 = 1;
pub const SEGMENT_GYRO: u8 = 2;
pub const SEGMENT_IMG_INFO: u8 = 3;

/// g per LSB at the +/-12 g full-scale range.
pub const ACCEL_SCALE: f64 = 12.0 / 32768.0;
/// deg/s per LSB at the +/-2000 deg/s full-scale range.
pub const GYRO_SCALE: f64 = 2000.0 / 32768.0;

// -- Device file sections --
pub const SECTION_DEVICE_INFO: u8 = 1;
pub const SECTION_IMU_PARAMS: u8 = 2;
const NAME_LEN: usize = 16;
const DEVICE_INFO_LEN: usize = NAME_LEN * 2 + 2 + 3 + 2 + 4 + 4 + 2;
const IMU_INTRINSICS_VALUES: usize = 30;
const IMU_PARAMS_LEN: usize = (IMU_INTRINSICS_VALUES * 2 + 12) * 8;

/// Build a 63-byte HID command buffer.
/// Format: [0x02, cmd_bytes..., 0x00 padding...]
pub fn build_command(cmd: &[u8]) -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = PREFIX_HOST_TO_DEVICE;
    let len = cmd.len().min(REPORT_SIZE - 1);
    buf[1..1 + len].copy_from_slice(&cmd[..len]);
    buf
}

/// Start: [0xA3, 0x10, 0x01], stop: [0xA3, 0x10, 0x00]
pub fn build_imu_stream_cmd(start: bool) -> [u8; REPORT_SIZE] {
    let mut cmd_bytes = [0u8; 3];
    cmd_bytes[0..2].copy_from_slice(CMD_IMU_STREAM);
    cmd_bytes[2] = u8::from(start);
    build_command(&cmd_bytes)
}

/// [0xF1, 0x01, offset_lo, offset_hi]
pub fn build_files_read_cmd(offset: u16) -> [u8; REPORT_SIZE] {
    let mut cmd_bytes = [0u8; 4];
    cmd_bytes[0..2].copy_from_slice(CMD_FILES_READ);
    cmd_bytes[2..4].copy_from_slice(&offset.to_le_bytes());
    build_command(&cmd_bytes)
}

/// [0xF1, 0x02, offset_lo, offset_hi, len, data...]; `data` is truncated to one chunk.
pub fn build_files_write_cmd(offset: u16, data: &[u8]) -> [u8; REPORT_SIZE] {
    let len = data.len().min(WRITE_CHUNK);
    let mut cmd_bytes = [0u8; REPORT_SIZE - 1];
    cmd_bytes[0..2].copy_from_slice(CMD_FILES_WRITE);
    cmd_bytes[2..4].copy_from_slice(&offset.to_le_bytes());
    cmd_bytes[4] = len as u8;
    cmd_bytes[5..5 + len].copy_from_slice(&data[..len]);
    build_command(&cmd_bytes)
}

/// Extract the command echo from a response and return the payload start offset.
/// Response format: [0x01, cmd_echo..., payload...]
pub fn validate_response(response: &[u8], expected_cmd: &[u8]) -> Result<usize> {
    if response.is_empty() || response[0] != PREFIX_DEVICE_TO_HOST {
        return Err(MynteyeError::InvalidResponse(
            response.first().copied().unwrap_or(0),
        ));
    }
    let cmd_len = expected_cmd.len();
    if response.len() < 1 + cmd_len || &response[1..1 + cmd_len] != expected_cmd {
        return Err(MynteyeError::CommandMismatch);
    }
    Ok(1 + cmd_len)
}

/// Extract a null-terminated string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// A decoded entry of a data report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Imu(ImuData),
    ImgInfo(ImgInfo),
}

fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

/// Parse a data report into its segments.
///
/// Report layout:
/// - `[0]`: 0x5A header
/// - `[1]`: segment count (<= 3)
/// - `[2..53]`: three 17-byte segments, unused ones zeroed
/// - `[53]`: XOR of bytes `[0..53]`
///
/// Segment layout, IMU (kind 1 accel, 2 gyro):
/// `[kind][timestamp u64][temperature i16][x i16][y i16][z i16]`
///
/// Segment layout, image info (kind 3):
/// `[kind][frame_id u16][timestamp u64][exposure u16][pad 4]`
///
/// Returns `None` for anything that is not a valid data report. Unknown
/// segment kinds are skipped.
pub fn parse_data_report(data: &[u8]) -> Option<Vec<Segment>> {
    if data.len() < DATA_REPORT_LEN || data[0] != DATA_HEADER {
        return None;
    }
    let count = data[1] as usize;
    if count > MAX_SEGMENTS {
        return None;
    }
    let body_end = DATA_REPORT_LEN - 1;
    if xor_checksum(&data[..body_end]) != data[body_end] {
        return None;
    }

    let mut segments = Vec::with_capacity(count);
    for i in 0..count {
        let start = 2 + i * SEGMENT_SIZE;
        if let Some(seg) = parse_segment(&data[start..start + SEGMENT_SIZE]) {
            segments.push(seg);
        }
    }
    Some(segments)
}

fn parse_segment(seg: &[u8]) -> Option<Segment> {
    let u16_at = |i: usize| u16::from_le_bytes([seg[i], seg[i + 1]]);
    let i16_at = |i: usize| i16::from_le_bytes([seg[i], seg[i + 1]]) as f64;
    let u64_at = |i: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&seg[i..i + 8]);
        u64::from_le_bytes(b)
    };

    match seg[0] {
        SEGMENT_ACCEL | SEGMENT_GYRO => {
            let (flag, scale) = if seg[0] == SEGMENT_ACCEL {
                (ImuFlag::Accel, ACCEL_SCALE)
            } else {
                (ImuFlag::Gyro, GYRO_SCALE)
            };
            let values = [i16_at(11) * scale, i16_at(13) * scale, i16_at(15) * scale];
            let (accel, gyro) = match flag {
                ImuFlag::Accel => (values, [0.0; 3]),
                ImuFlag::Gyro => ([0.0; 3], values),
            };
            Some(Segment::Imu(ImuData {
                flag,
                timestamp_us: u64_at(1),
                accel,
                gyro,
                temperature: i16_at(9) * 0.125 + 23.0,
            }))
        }
        SEGMENT_IMG_INFO => Some(Segment::ImgInfo(ImgInfo {
            frame_id: u16_at(1),
            timestamp_us: u64_at(3),
            exposure_time: u16_at(11),
        })),
        other => {
            log::trace!("Skipping unknown segment kind 0x{:02x}", other);
            None
        }
    }
}

/// Bounds-checked little-endian reader over a files blob.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(MynteyeError::MalformedFiles(format!(
                "need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(8)?);
        Ok(f64::from_le_bytes(b))
    }

    fn f64s<const N: usize>(&mut self) -> Result<[f64; N]> {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.f64()?;
        }
        Ok(out)
    }

    fn mat3(&mut self) -> Result<[[f64; 3]; 3]> {
        Ok([self.f64s()?, self.f64s()?, self.f64s()?])
    }
}

/// Decode the device files blob: a sequence of `[id u8][len u16][payload]`
/// sections. The device info section is mandatory, IMU params are optional.
pub fn decode_files(blob: &[u8]) -> Result<DeviceFiles> {
    let mut cursor = Cursor::new(blob);
    let mut descriptors = None;
    let mut imu_params = ImuParams::default();

    while cursor.remaining() > 0 {
        let id = cursor.u8()?;
        let len = cursor.u16()? as usize;
        let payload = cursor.bytes(len)?;
        match id {
            SECTION_DEVICE_INFO => descriptors = Some(decode_device_info(payload)?),
            SECTION_IMU_PARAMS => imu_params = decode_imu_params(payload)?,
            other => log::debug!("Ignoring device file section {} ({} bytes)", other, len),
        }
    }

    let descriptors =
        descriptors.ok_or_else(|| MynteyeError::MalformedFiles("no device info section".into()))?;
    Ok(DeviceFiles {
        descriptors,
        imu_params,
    })
}

fn decode_device_info(payload: &[u8]) -> Result<Descriptors> {
    let mut c = Cursor::new(payload);
    let name = extract_string(c.bytes(NAME_LEN)?);
    let serial_number = extract_string(c.bytes(NAME_LEN)?);
    let firmware_version = Version::new(c.u8()?, c.u8()?);
    let hardware_version = HardwareVersion {
        major: c.u8()?,
        minor: c.u8()?,
        flag: c.u8()?,
    };
    let spec_version = Version::new(c.u8()?, c.u8()?);
    let lens_type = Type {
        vendor: c.u16()?,
        product: c.u16()?,
    };
    let imu_type = Type {
        vendor: c.u16()?,
        product: c.u16()?,
    };
    let nominal_baseline = c.u16()?;
    Ok(Descriptors {
        name,
        serial_number,
        firmware_version,
        hardware_version,
        spec_version,
        lens_type,
        imu_type,
        nominal_baseline,
    })
}

fn decode_imu_intrinsics(c: &mut Cursor<'_>) -> Result<ImuIntrinsics> {
    Ok(ImuIntrinsics {
        scale: c.mat3()?,
        assembly: c.mat3()?,
        noise: c.f64s()?,
        bias: c.f64s()?,
        x: c.f64s()?,
        y: c.f64s()?,
        z: c.f64s()?,
    })
}

fn decode_imu_params(payload: &[u8]) -> Result<ImuParams> {
    let mut c = Cursor::new(payload);
    Ok(ImuParams {
        ok: true,
        in_accel: decode_imu_intrinsics(&mut c)?,
        in_gyro: decode_imu_intrinsics(&mut c)?,
        ex_left_to_imu: MotionExtrinsics {
            rotation: c.mat3()?,
            translation: c.f64s()?,
        },
    })
}

fn push_section(blob: &mut Vec<u8>, id: u8, payload: &[u8]) {
    blob.push(id);
    blob.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    blob.extend_from_slice(payload);
}

fn push_fixed_string(out: &mut Vec<u8>, s: &str) {
    let mut buf = [0u8; NAME_LEN];
    let bytes = s.as_bytes();
    let len = bytes.len().min(NAME_LEN);
    buf[..len].copy_from_slice(&bytes[..len]);
    out.extend_from_slice(&buf);
}

fn push_f64s(out: &mut Vec<u8>, values: &[f64]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn push_imu_intrinsics(out: &mut Vec<u8>, i: &ImuIntrinsics) {
    for row in i.scale.iter().chain(i.assembly.iter()) {
        push_f64s(out, row);
    }
    push_f64s(out, &i.noise);
    push_f64s(out, &i.bias);
    push_f64s(out, &i.x);
    push_f64s(out, &i.y);
    push_f64s(out, &i.z);
}

/// Encode the sections to write. Missing parts are omitted and the firmware
/// keeps its stored copy. `spec_version` overrides the one in `desc`.
pub fn encode_files(
    desc: Option<&Descriptors>,
    imu_params: Option<&ImuParams>,
    spec_version: Option<&Version>,
) -> Vec<u8> {
    let mut blob = Vec::new();

    if let Some(d) = desc {
        let spec = spec_version.copied().unwrap_or(d.spec_version);
        let mut p = Vec::with_capacity(DEVICE_INFO_LEN);
        push_fixed_string(&mut p, &d.name);
        push_fixed_string(&mut p, &d.serial_number);
        p.extend_from_slice(&[d.firmware_version.major, d.firmware_version.minor]);
        p.extend_from_slice(&[
            d.hardware_version.major,
            d.hardware_version.minor,
            d.hardware_version.flag,
        ]);
        p.extend_from_slice(&[spec.major, spec.minor]);
        for t in [d.lens_type, d.imu_type] {
            p.extend_from_slice(&t.vendor.to_le_bytes());
            p.extend_from_slice(&t.product.to_le_bytes());
        }
        p.extend_from_slice(&d.nominal_baseline.to_le_bytes());
        push_section(&mut blob, SECTION_DEVICE_INFO, &p);
    }

    if let Some(imu) = imu_params.filter(|p| p.ok) {
        let mut p = Vec::with_capacity(IMU_PARAMS_LEN);
        push_imu_intrinsics(&mut p, &imu.in_accel);
        push_imu_intrinsics(&mut p, &imu.in_gyro);
        for row in &imu.ex_left_to_imu.rotation {
            push_f64s(&mut p, row);
        }
        push_f64s(&mut p, &imu.ex_left_to_imu.translation);
        push_section(&mut blob, SECTION_IMU_PARAMS, &p);
    }

    blob
}
