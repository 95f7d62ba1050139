//! Mock transport and side channel shared by the integration tests.
#![allow(dead_code)]

use mynteye::protocol::{self, Segment};
use mynteye::{
    Callbacks, Config, DeviceFiles, Descriptors, ImgInfoSink, ImuData, ImuFlag, ImuParams,
    ImuSink, MynteyeError, OpenParams, RawStreamCalibration, SideChannel, StreamInfo, StreamMode,
    Transport, Verbosity, Version,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub fn quiet_config() -> Config {
    Config {
        verbosity: Verbosity::Silent,
        ..Config::default()
    }
}

#[derive(Debug, Default)]
pub struct TransportLog {
    pub opens: usize,
    pub closes: usize,
    pub calibration_reads: usize,
    pub bin_files: Vec<PathBuf>,
}

pub struct MockTransport {
    pub log: Arc<Mutex<TransportLog>>,
    opened: bool,
    accept_open: bool,
    calibrations: HashMap<StreamMode, RawStreamCalibration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            opened: false,
            accept_open: true,
            calibrations: HashMap::new(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept_open: false,
            ..Self::new()
        }
    }

    pub fn with_calibration(mut self, mode: StreamMode, raw: RawStreamCalibration) -> Self {
        self.calibrations.insert(mode, raw);
        self
    }
}

impl Transport for MockTransport {
    fn stream_infos(&self, _dev_index: i32) -> (Vec<StreamInfo>, Vec<StreamInfo>) {
        (Vec::new(), Vec::new())
    }

    fn open(&mut self, _params: &OpenParams) -> bool {
        self.log.lock().unwrap().opens += 1;
        self.opened = self.accept_open;
        self.accept_open
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
        self.opened = false;
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn camera_calibration(&self, mode: StreamMode) -> RawStreamCalibration {
        self.log.lock().unwrap().calibration_reads += 1;
        self.calibrations.get(&mode).copied().unwrap_or_default()
    }

    fn set_camera_calibration_bin_file(&mut self, path: &Path) -> bool {
        self.log.lock().unwrap().bin_files.push(path.to_path_buf());
        true
    }

    fn save_camera_calibration_file(&self, _mode: StreamMode, _path: &Path) -> mynteye::Result<()> {
        Ok(())
    }
}

/// In-memory side channel. Tracking is a flag; tests push data through
/// [`MockChannel::deliver`] as the notification thread would.
pub struct MockChannel {
    available: bool,
    tracking_available: bool,
    files: Option<DeviceFiles>,
    callbacks: Callbacks,
    tracking: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub imu_registrations: AtomicUsize,
    pub img_info_registrations: AtomicUsize,
    pub written: Mutex<Vec<Vec<u8>>>,
}

impl MockChannel {
    /// No device behind the channel at all.
    pub fn absent() -> Self {
        Self {
            available: false,
            tracking_available: false,
            files: None,
            callbacks: Callbacks::default(),
            tracking: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            imu_registrations: AtomicUsize::new(0),
            img_info_registrations: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Present, with `files` readable (`None` makes the read fail).
    pub fn present(files: Option<DeviceFiles>) -> Self {
        Self {
            available: true,
            tracking_available: true,
            files,
            ..Self::absent()
        }
    }

    pub fn deliver(&self, segment: Segment) {
        self.callbacks.dispatch(&segment);
    }

    pub fn has_imu_sink(&self) -> bool {
        self.callbacks.has_imu()
    }

    pub fn has_img_info_sink(&self) -> bool {
        self.callbacks.has_img_info()
    }
}

impl SideChannel for MockChannel {
    fn is_available(&self) -> bool {
        self.available
    }

    fn read_files(&self) -> mynteye::Result<DeviceFiles> {
        self.files
            .clone()
            .ok_or_else(|| MynteyeError::MalformedFiles("no device info section".into()))
    }

    fn write_files(
        &self,
        desc: Option<&Descriptors>,
        imu_params: Option<&ImuParams>,
        spec_version: Option<&Version>,
    ) -> bool {
        let blob = protocol::encode_files(desc, imu_params, spec_version);
        self.written.lock().unwrap().push(blob);
        true
    }

    fn set_imu_callback(&self, sink: Option<Arc<dyn ImuSink>>) {
        if sink.is_some() {
            self.imu_registrations.fetch_add(1, Ordering::SeqCst);
        }
        self.callbacks.set_imu(sink);
    }

    fn set_img_info_callback(&self, sink: Option<Arc<dyn ImgInfoSink>>) {
        if sink.is_some() {
            self.img_info_registrations.fetch_add(1, Ordering::SeqCst);
        }
        self.callbacks.set_img_info(sink);
    }

    fn is_tracking_available(&self) -> bool {
        self.tracking_available
    }

    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    fn start_tracking(&self) -> bool {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.tracking.store(true, Ordering::SeqCst);
        true
    }

    fn stop_tracking(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.tracking.store(false, Ordering::SeqCst);
    }
}

/// Side channel with a real notification thread that delivers an accel
/// sample every millisecond while tracking. Stopping joins that thread.
#[derive(Default)]
pub struct PumpChannel {
    callbacks: Arc<Callbacks>,
    reader: Mutex<Option<(Arc<AtomicBool>, JoinHandle<()>)>>,
}

impl SideChannel for PumpChannel {
    fn is_available(&self) -> bool {
        false
    }

    fn read_files(&self) -> mynteye::Result<DeviceFiles> {
        Err(MynteyeError::ChannelUnavailable)
    }

    fn write_files(
        &self,
        _desc: Option<&Descriptors>,
        _imu_params: Option<&ImuParams>,
        _spec_version: Option<&Version>,
    ) -> bool {
        false
    }

    fn set_imu_callback(&self, sink: Option<Arc<dyn ImuSink>>) {
        self.callbacks.set_imu(sink);
    }

    fn set_img_info_callback(&self, sink: Option<Arc<dyn ImgInfoSink>>) {
        self.callbacks.set_img_info(sink);
    }

    fn is_tracking_available(&self) -> bool {
        true
    }

    fn is_tracking(&self) -> bool {
        self.reader.lock().unwrap().is_some()
    }

    fn start_tracking(&self) -> bool {
        let mut reader = self.reader.lock().unwrap();
        if reader.is_some() {
            return true;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let (flag, callbacks) = (stop.clone(), self.callbacks.clone());
        let handle = std::thread::spawn(move || {
            let mut ts = 0;
            while !flag.load(Ordering::SeqCst) {
                ts += 1;
                callbacks.dispatch(&Segment::Imu(ImuData {
                    flag: ImuFlag::Accel,
                    timestamp_us: ts,
                    accel: [0.0, 0.0, 1.0],
                    gyro: [0.0; 3],
                    temperature: 25.0,
                }));
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        *reader = Some((stop, handle));
        true
    }

    fn stop_tracking(&self) {
        let taken = self.reader.lock().unwrap().take();
        if let Some((stop, handle)) = taken {
            stop.store(true, Ordering::SeqCst);
            handle.join().unwrap();
        }
    }
}
