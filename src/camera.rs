use crate::calibration;
use crate::channel::{lock, HidChannel, SideChannel};
use crate::config::Config;
use crate::diagnostics::Reporter;
use crate::features::FeatureToggles;
use crate::motions::Motions;
use crate::streams::Streams;
use crate::transport::Transport;
use crate::types::{
    Descriptor, Descriptors, DeviceInfo, ImageType, ImgInfo, ImuData, ImuParams,
    MotionExtrinsics, MotionIntrinsics, OpenParams, ProcessMode, StreamExtrinsics,
    StreamInfo, StreamIntrinsics, StreamMode, Version,
};
use crate::{MynteyeError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A MYNT EYE camera session.
///
/// Owns the transport for its whole lifetime and decides when the side
/// channel should be tracking: tracking runs iff IMU data or image infos are
/// enabled and the channel can track. All methods take `&self`; the camera
/// may be shared with the threads that consume its data.
pub struct Camera {
    device: Mutex<Box<dyn Transport>>,
    channel: Arc<dyn SideChannel>,
    streams: Arc<Streams>,
    motions: Arc<Motions>,
    features: Mutex<FeatureToggles>,
    /// Serializes callback registration and tracking start.
    tracking: Mutex<()>,
    descriptors: Option<Descriptors>,
    motion_intrinsics: Option<MotionIntrinsics>,
    motion_extrinsics: Option<MotionExtrinsics>,
    stream_intrinsics: Mutex<HashMap<StreamMode, StreamIntrinsics>>,
    stream_extrinsics: Mutex<HashMap<StreamMode, StreamExtrinsics>>,
    reporter: Reporter,
}

impl Camera {
    /// Camera over `transport`, with the HID data channel and settings from
    /// the environment.
    pub fn new(transport: impl Transport + 'static) -> Camera {
        let config = Config::from_env();
        let channel = Arc::new(HidChannel::open_first(&config));
        Self::with_channel(transport, channel, &config)
    }

    /// Camera over an explicit side channel. Device files are read right
    /// away if the channel is available.
    pub fn with_channel(
        transport: impl Transport + 'static,
        channel: Arc<dyn SideChannel>,
        config: &Config,
    ) -> Camera {
        let mut camera = Camera {
            device: Mutex::new(Box::new(transport)),
            channel,
            streams: Arc::new(Streams::new(config.image_info_capacity)),
            motions: Arc::new(Motions::new()),
            features: Mutex::new(FeatureToggles::new()),
            tracking: Mutex::new(()),
            descriptors: None,
            motion_intrinsics: None,
            motion_extrinsics: None,
            stream_intrinsics: Mutex::new(HashMap::new()),
            stream_extrinsics: Mutex::new(HashMap::new()),
            reporter: Reporter::new(config.verbosity),
        };
        if camera.channel.is_available() {
            camera.read_device_flash();
        }
        camera
    }

    fn read_device_flash(&mut self) {
        if !self.channel.is_available() {
            self.reporter.warn(format_args!(
                "Data channel is unavailable, could not read device datas."
            ));
            return;
        }

        let files = match self.channel.read_files() {
            Ok(files) => files,
            Err(e) => {
                self.reporter.error(format_args!(
                    "Read device descriptors failed ({}). Please upgrade your firmware to the latest version.",
                    e
                ));
                return;
            }
        };

        let d = &files.descriptors;
        self.reporter.info(format_args!(
            "Device descriptors: name={} serial_number={} firmware_version={} \
             hardware_version={} spec_version={} lens_type={} imu_type={} nominal_baseline={}",
            d.name,
            d.serial_number,
            d.firmware_version,
            d.hardware_version,
            d.spec_version,
            d.lens_type,
            d.imu_type,
            d.nominal_baseline
        ));

        match calibration::motion(&files.imu_params) {
            Some((intrinsics, extrinsics)) => {
                self.motions.set_motion_intrinsics(intrinsics);
                self.motion_intrinsics = Some(intrinsics);
                self.motion_extrinsics = Some(extrinsics);
            }
            None => self
                .reporter
                .error(format_args!("Motion intrinsics & extrinsics not exist")),
        }
        self.descriptors = Some(files.descriptors);
    }

    /// Cameras visible to the transport.
    pub fn device_infos(&self) -> Vec<DeviceInfo> {
        lock(&self.device).device_infos()
    }

    /// Color and depth stream configurations of device `dev_index`.
    pub fn stream_infos(&self, dev_index: i32) -> (Vec<StreamInfo>, Vec<StreamInfo>) {
        lock(&self.device).stream_infos(dev_index)
    }

    /// Open the camera. Opening an opened camera succeeds without touching
    /// the device. Failing to start tracking does not fail the open.
    pub fn open(&self, params: &OpenParams) -> Result<()> {
        let mut device = lock(&self.device);
        if device.is_opened() {
            return Ok(());
        }
        if !device.open(params) {
            self.reporter
                .error(format_args!("Open camera {} failed", params.dev_index));
            return Err(MynteyeError::CameraOpenFailed);
        }

        self.start_data_tracking();
        self.streams.on_camera_open();
        Ok(())
    }

    /// Whether the transport reports the camera open.
    pub fn is_opened(&self) -> bool {
        lock(&self.device).is_opened()
    }

    /// `Err(NotOpened)` unless the camera is open.
    pub fn check_opened(&self) -> Result<()> {
        if self.is_opened() {
            Ok(())
        } else {
            Err(MynteyeError::NotOpened)
        }
    }

    /// Stop tracking, then close the device. No-op when not opened.
    ///
    /// No camera lock is held while tracking stops: the notification thread
    /// may be inside a callback that calls back into the camera.
    pub fn close(&self) {
        if !self.is_opened() {
            return;
        }
        self.stop_data_tracking();
        self.streams.on_camera_close();

        let mut device = lock(&self.device);
        if device.is_opened() {
            device.close();
        }
    }

    /// Descriptors read from the device flash, if any.
    pub fn descriptors(&self) -> Option<Descriptors> {
        self.descriptors.clone()
    }

    /// One descriptor field as text; empty if descriptors were never read.
    pub fn descriptor(&self, desc: Descriptor) -> String {
        let Some(d) = &self.descriptors else {
            self.reporter
                .error(format_args!("Device information not found"));
            return String::new();
        };
        match desc {
            Descriptor::DeviceName => d.name.clone(),
            Descriptor::SerialNumber => d.serial_number.clone(),
            Descriptor::FirmwareVersion => d.firmware_version.to_string(),
            Descriptor::HardwareVersion => d.hardware_version.to_string(),
            Descriptor::SpecVersion => d.spec_version.to_string(),
            Descriptor::LensType => d.lens_type.to_string(),
            Descriptor::ImuType => d.imu_type.to_string(),
            Descriptor::NominalBaseline => d.nominal_baseline.to_string(),
        }
    }

    /// Like [`Camera::descriptor`], by name ("serial_number", ...). Unknown
    /// names yield an empty string.
    pub fn descriptor_named(&self, name: &str) -> String {
        match name.parse::<Descriptor>() {
            Ok(desc) => self.descriptor(desc),
            Err(tag) => {
                self.reporter
                    .error(format_args!("Unknown device info '{}'", tag));
                String::new()
            }
        }
    }

    /// Intrinsics for `mode`, always derived from a fresh device read.
    pub fn stream_intrinsics(&self, mode: StreamMode) -> StreamIntrinsics {
        let raw = lock(&self.device).camera_calibration(mode);
        let intrinsics = calibration::stream_intrinsics(&raw);
        lock(&self.stream_intrinsics).insert(mode, intrinsics);
        intrinsics
    }

    /// Extrinsics for `mode`, always derived from a fresh device read.
    pub fn stream_extrinsics(&self, mode: StreamMode) -> StreamExtrinsics {
        let raw = lock(&self.device).camera_calibration(mode);
        let extrinsics = calibration::stream_extrinsics(&raw);
        lock(&self.stream_extrinsics).insert(mode, extrinsics);
        extrinsics
    }

    /// Last intrinsics computed for `mode`, without touching the device.
    pub fn cached_stream_intrinsics(&self, mode: StreamMode) -> Option<StreamIntrinsics> {
        lock(&self.stream_intrinsics).get(&mode).copied()
    }

    /// Last extrinsics computed for `mode`, without touching the device.
    pub fn cached_stream_extrinsics(&self, mode: StreamMode) -> Option<StreamExtrinsics> {
        lock(&self.stream_extrinsics).get(&mode).copied()
    }

    /// Replace the device stereo calibration with a binary file.
    pub fn write_camera_calibration_bin_file(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.device).set_camera_calibration_bin_file(path.as_ref())
    }

    /// Dump the stereo calibration for `mode` to `path`.
    pub fn save_camera_calibration_file(
        &self,
        mode: StreamMode,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        lock(&self.device).save_camera_calibration_file(mode, path.as_ref())
    }

    /// IMU intrinsics from the device flash; defaults if never read.
    pub fn motion_intrinsics(&self) -> MotionIntrinsics {
        self.motion_intrinsics.unwrap_or_else(|| {
            self.reporter
                .error(format_args!("Error: Motion intrinsics not found"));
            MotionIntrinsics::default()
        })
    }

    /// Left camera to IMU extrinsics from the device flash; defaults if never read.
    pub fn motion_extrinsics(&self) -> MotionExtrinsics {
        self.motion_extrinsics.unwrap_or_else(|| {
            self.reporter
                .error(format_args!("Error: Motion extrinsics not found"));
            MotionExtrinsics::default()
        })
    }

    /// Write descriptors and/or IMU params to the device flash.
    pub fn write_device_flash(
        &self,
        desc: Option<&Descriptors>,
        imu_params: Option<&ImuParams>,
        spec_version: Option<&Version>,
    ) -> bool {
        if !self.channel.is_available() {
            self.reporter.warn(format_args!(
                "Data channel is unavailable, could not write device datas."
            ));
            return false;
        }
        self.channel.write_files(desc, imu_params, spec_version)
    }

    /// Corrections applied to IMU samples before delivery.
    pub fn enable_process_mode(&self, mode: ProcessMode) {
        self.motions.enable_process_mode(mode);
    }

    /// Deliver image infos; with `sync` they can be paired with frames by id.
    pub fn enable_image_info(&self, sync: bool) {
        lock(&self.features).enable_image_info(sync);
        self.start_data_tracking();
    }

    /// Whether image infos are being delivered.
    pub fn is_image_info_enabled(&self) -> bool {
        lock(&self.features).is_image_info_enabled()
    }

    /// Request decoded frames of `types`. Does not involve the side channel.
    pub fn enable_stream_data(&self, types: ImageType) {
        lock(&self.features).enable_stream_data(types);
    }

    /// True if every type in `types` has been enabled.
    pub fn is_stream_data_enabled(&self, types: ImageType) -> bool {
        lock(&self.features).is_stream_data_enabled(types)
    }

    /// True if any stream data has been enabled.
    pub fn has_stream_data_enabled(&self) -> bool {
        lock(&self.features).has_stream_data_enabled()
    }

    /// Buffer up to `max_size` IMU samples for [`Camera::motion_datas`].
    pub fn enable_motion_datas(&self, max_size: usize) {
        let capacity = {
            let mut features = lock(&self.features);
            features.enable_motion_datas(max_size);
            features.motion_capacity().unwrap_or(1)
        };
        self.motions.enable_motion_datas(capacity);
        self.start_data_tracking();
    }

    /// Whether IMU samples are being buffered.
    pub fn is_motion_datas_enabled(&self) -> bool {
        lock(&self.features).is_motion_datas_enabled()
    }

    /// Drain buffered IMU samples, oldest first.
    pub fn motion_datas(&self) -> Vec<ImuData> {
        self.motions.motion_datas()
    }

    /// Recently received image infos, oldest first.
    pub fn image_infos(&self) -> Vec<ImgInfo> {
        self.streams.image_infos()
    }

    /// Image info matching a frame id; requires `enable_image_info(true)`.
    pub fn image_info_for(&self, frame_id: u16) -> Option<ImgInfo> {
        if !lock(&self.features).is_image_info_synced() {
            return None;
        }
        self.streams.image_info_for(frame_id)
    }

    /// Called on the notification thread for every image info.
    pub fn set_img_info_callback<F>(&self, callback: F)
    where
        F: Fn(&ImgInfo) + Send + Sync + 'static,
    {
        self.streams.set_img_info_callback(Some(Arc::new(callback)));
    }

    /// Called on the notification thread for every IMU sample, after correction.
    pub fn set_motion_callback<F>(&self, callback: F)
    where
        F: Fn(&ImuData) + Send + Sync + 'static,
    {
        self.motions.set_motion_callback(Some(Arc::new(callback)));
    }

    /// Register the enabled callbacks with the side channel and make sure it
    /// is tracking. Returns whether tracking is active afterwards.
    ///
    /// Callbacks are re-registered on every call; registration replaces the
    /// previous sink, so repeated calls are harmless.
    pub fn start_data_tracking(&self) -> bool {
        let _guard = lock(&self.tracking);
        let features = lock(&self.features).clone();

        if !features.wants_tracking() {
            return false;
        }
        if features.is_motion_datas_enabled() {
            self.channel.set_imu_callback(Some(self.motions.clone()));
        }
        if features.is_image_info_enabled() {
            self.channel.set_img_info_callback(Some(self.streams.clone()));
        }

        if self.channel.is_tracking() {
            return true;
        }
        if !self.channel.is_tracking_available() {
            self.reporter.warn(format_args!(
                "Data channel is unavailable, could not track device datas."
            ));
            return false;
        }
        self.channel.start_tracking()
    }

    /// Stop tracking if it is active. The channel joins its notification
    /// thread here, so no camera lock may be held.
    pub fn stop_data_tracking(&self) {
        if self.channel.is_tracking() {
            self.channel.stop_tracking();
        }
    }

    /// Whether the side channel is delivering data.
    pub fn is_tracking(&self) -> bool {
        self.channel.is_tracking()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
        // Tracking may have been started by an enable call on a camera that
        // was never opened.
        self.stop_data_tracking();
        self.channel.set_imu_callback(None);
        self.channel.set_img_info_callback(None);
    }
}
