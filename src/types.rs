use std::fmt;
use std::str::FromStr;

/// Two-part version number (firmware, spec).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    /// Parses "major.minor", ignoring any trailing components ("1.2.3" -> 1.2).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts.next().unwrap_or("").parse()?;
        let minor = match parts.next() {
            Some(p) => p.parse()?,
            None => 0,
        };
        Ok(Version { major, minor })
    }
}

/// Hardware version with a revision flag byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareVersion {
    pub major: u8,
    pub minor: u8,
    pub flag: u8,
}

impl fmt::Display for HardwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Component type (lens, IMU) identified by vendor and product codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Type {
    pub vendor: u16,
    pub product: u16,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}-{:04x}", self.vendor, self.product)
    }
}

/// Device identity and version metadata persisted in the device flash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub name: String,
    pub serial_number: String,
    pub firmware_version: Version,
    pub hardware_version: HardwareVersion,
    pub spec_version: Version,
    pub lens_type: Type,
    pub imu_type: Type,
    /// Distance between the two lenses in millimeters.
    pub nominal_baseline: u16,
}

/// A single descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptor {
    DeviceName,
    SerialNumber,
    FirmwareVersion,
    HardwareVersion,
    SpecVersion,
    LensType,
    ImuType,
    NominalBaseline,
}

impl FromStr for Descriptor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "device_name" | "name" => Ok(Descriptor::DeviceName),
            "serial_number" => Ok(Descriptor::SerialNumber),
            "firmware_version" => Ok(Descriptor::FirmwareVersion),
            "hardware_version" => Ok(Descriptor::HardwareVersion),
            "spec_version" => Ok(Descriptor::SpecVersion),
            "lens_type" => Ok(Descriptor::LensType),
            "imu_type" => Ok(Descriptor::ImuType),
            "nominal_baseline" => Ok(Descriptor::NominalBaseline),
            other => Err(other.to_string()),
        }
    }
}

/// Resolution/format configuration of the stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// 640x480, left lens only.
    Stream640x480,
    /// 1280x480, left + right.
    Stream1280x480,
    /// 1280x720, left lens only.
    Stream1280x720,
    /// 2560x720, left + right.
    Stream2560x720,
}

impl Default for StreamMode {
    fn default() -> Self {
        StreamMode::Stream1280x720
    }
}

bitflags::bitflags! {
    /// Image types produced by the camera. Also used as a set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageType: u32 {
        const IMAGE_LEFT_COLOR  = 1 << 0;
        const IMAGE_RIGHT_COLOR = 1 << 1;
        const IMAGE_DEPTH       = 1 << 2;
    }
}

impl Default for ImageType {
    fn default() -> Self {
        ImageType::empty()
    }
}

bitflags::bitflags! {
    /// Corrections applied to IMU samples before delivery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcessMode: u32 {
        const TEMP_DRIFT = 1 << 0;
        const ASSEMBLY   = 1 << 1;
    }
}

/// Device-native stereo calibration record for one stream mode.
///
/// Camera matrices are row-major 3x3. The image width covers both lenses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawStreamCalibration {
    pub in_img_width: u16,
    pub in_img_height: u16,
    pub cam_mat1: [f64; 9],
    pub cam_dist1: [f64; 14],
    pub cam_mat2: [f64; 9],
    pub cam_dist2: [f64; 14],
    pub rota_mat: [f64; 9],
    pub tran_mat: [f64; 3],
}

impl Default for RawStreamCalibration {
    fn default() -> Self {
        Self {
            in_img_width: 0,
            in_img_height: 0,
            cam_mat1: [0.0; 9],
            cam_dist1: [0.0; 14],
            cam_mat2: [0.0; 9],
            cam_dist2: [0.0; 14],
            rota_mat: [0.0; 9],
            tran_mat: [0.0; 3],
        }
    }
}

/// Pinhole intrinsics of one lens with 5 distortion coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraIntrinsics {
    pub width: u16,
    pub height: u16,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// k1, k2, p1, p2, k3
    pub coeffs: [f64; 5],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamIntrinsics {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
}

/// Left-to-right lens transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamExtrinsics {
    /// 3x3 row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

/// Accelerometer or gyroscope calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuIntrinsics {
    pub scale: [[f64; 3]; 3],
    pub assembly: [[f64; 3]; 3],
    pub noise: [f64; 3],
    pub bias: [f64; 3],
    /// Temperature drift coefficients per axis: value -= c[0] + c[1] * temp.
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionIntrinsics {
    pub accel: ImuIntrinsics,
    pub gyro: ImuIntrinsics,
}

/// Left lens to IMU transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionExtrinsics {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

/// Raw inertial calibration as stored in the device flash.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuParams {
    /// False when the flash holds no IMU section.
    pub ok: bool,
    pub in_accel: ImuIntrinsics,
    pub in_gyro: ImuIntrinsics,
    pub ex_left_to_imu: MotionExtrinsics,
}

/// Everything read from the device flash in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFiles {
    pub descriptors: Descriptors,
    pub imu_params: ImuParams,
}

/// Which sensor an IMU sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuFlag {
    Accel,
    Gyro,
}

/// One IMU sample. Only the vector matching `flag` is meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuData {
    pub flag: ImuFlag,
    pub timestamp_us: u64,
    /// Acceleration in g.
    pub accel: [f64; 3],
    /// Angular velocity in deg/s.
    pub gyro: [f64; 3],
    /// Sensor temperature in degrees Celsius.
    pub temperature: f64,
}

/// Per-frame metadata delivered over the side channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImgInfo {
    pub frame_id: u16,
    pub timestamp_us: u64,
    pub exposure_time: u16,
}

/// Parameters handed to the transport when opening the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    pub dev_index: i32,
    pub framerate: u32,
    pub stream_mode: StreamMode,
    /// IR projector intensity, 0 disables it.
    pub ir_intensity: u8,
}

impl OpenParams {
    pub fn new(dev_index: i32) -> Self {
        Self {
            dev_index,
            ..Default::default()
        }
    }
}

impl Default for OpenParams {
    fn default() -> Self {
        Self {
            dev_index: 0,
            framerate: 30,
            stream_mode: StreamMode::default(),
            ir_intensity: 0,
        }
    }
}

/// Camera found on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: i32,
    pub name: String,
    pub serial_number: String,
}

/// One resolution/format a camera can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: i32,
    pub width: u32,
    pub height: u32,
    pub format: StreamFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Mjpg,
    Yuyv,
    Depth,
}
