use crate::config::Config;
use crate::hid::HidTransport;
use crate::protocol::{self, Segment, PID, VID};
use crate::types::{DeviceFiles, Descriptors, ImgInfo, ImuData, ImuParams, Version};
use crate::{MynteyeError, Result};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

/// Pause after a failed read before trying again.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Consecutive failed reads after which the reader gives up (device gone).
const MAX_READ_ERRORS: u32 = 40;

/// Receives IMU samples from the side channel's notification thread.
pub trait ImuSink: Send + Sync {
    fn on_imu_data(&self, data: &ImuData);
}

/// Receives image infos from the side channel's notification thread.
pub trait ImgInfoSink: Send + Sync {
    fn on_img_info(&self, info: &ImgInfo);
}

/// The low-bandwidth auxiliary path to the device.
///
/// Carries the device files (descriptors and IMU calibration) and, while
/// tracking, the IMU and image-info notifications.
pub trait SideChannel: Send + Sync {
    /// Present and new enough to transfer device files.
    fn is_available(&self) -> bool;

    /// Descriptors and IMU params in one transfer. Any failure fails the whole read.
    fn read_files(&self) -> Result<DeviceFiles>;

    fn write_files(
        &self,
        desc: Option<&Descriptors>,
        imu_params: Option<&ImuParams>,
        spec_version: Option<&Version>,
    ) -> bool;

    /// Replaces the IMU slot; the previous sink is released.
    fn set_imu_callback(&self, sink: Option<Arc<dyn ImuSink>>);

    /// Replaces the image-info slot; the previous sink is released.
    fn set_img_info_callback(&self, sink: Option<Arc<dyn ImgInfoSink>>);

    fn is_tracking_available(&self) -> bool;

    fn is_tracking(&self) -> bool;

    /// Returns true if tracking is running afterwards.
    fn start_tracking(&self) -> bool;

    fn stop_tracking(&self);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-slot callback registry shared with a notification thread.
///
/// Slots are swapped under a lock; dispatch clones the sink out and calls it
/// after the lock is released, so a sink may re-register without deadlocking.
#[derive(Default)]
pub struct Callbacks {
    imu: Mutex<Option<Arc<dyn ImuSink>>>,
    img_info: Mutex<Option<Arc<dyn ImgInfoSink>>>,
}

impl Callbacks {
    pub fn set_imu(&self, sink: Option<Arc<dyn ImuSink>>) {
        *lock(&self.imu) = sink;
    }

    pub fn set_img_info(&self, sink: Option<Arc<dyn ImgInfoSink>>) {
        *lock(&self.img_info) = sink;
    }

    pub fn has_imu(&self) -> bool {
        lock(&self.imu).is_some()
    }

    pub fn has_img_info(&self) -> bool {
        lock(&self.img_info).is_some()
    }

    pub fn dispatch(&self, segment: &Segment) {
        match segment {
            Segment::Imu(data) => {
                let sink = lock(&self.imu).clone();
                if let Some(sink) = sink {
                    sink.on_imu_data(data);
                }
            }
            Segment::ImgInfo(info) => {
                let sink = lock(&self.img_info).clone();
                if let Some(sink) = sink {
                    sink.on_img_info(info);
                }
            }
        }
    }
}

/// Check if a hidapi DeviceInfo is the MYNT EYE data channel.
/// -1 is reported by macOS IOKit, where the interface number is unknown.
fn is_mynteye_hid(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == VID
        && d.product_id() == PID
        && (d.interface_number() == protocol::HID_INTERFACE || d.interface_number() == -1)
}

/// Side channel over hidapi.
///
/// Commands go through one handle; tracking opens a second handle owned by a
/// reader thread.
pub struct HidChannel {
    control: Option<Mutex<HidTransport>>,
    device_path: Option<CString>,
    firmware: Option<Version>,
    callbacks: Arc<Callbacks>,
    tracking: Mutex<Option<TrackingThread>>,
    read_timeout_ms: i32,
}

impl HidChannel {
    /// Open the first MYNT EYE data channel. Never fails: if no device is
    /// found the channel reports itself unavailable.
    pub fn open_first(config: &Config) -> HidChannel {
        match Self::try_open(config) {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("HID data channel unavailable: {}", e);
                Self::unavailable(config)
            }
        }
    }

    fn unavailable(config: &Config) -> HidChannel {
        HidChannel {
            control: None,
            device_path: None,
            firmware: None,
            callbacks: Arc::default(),
            tracking: Mutex::new(None),
            read_timeout_ms: config.hid_read_timeout_ms,
        }
    }

    fn try_open(config: &Config) -> Result<HidChannel> {
        let api = HidApi::new()?;
        let hid_info = api
            .device_list()
            .find(|d| is_mynteye_hid(d))
            .ok_or(MynteyeError::DeviceNotFound)?;

        let device_path = hid_info.path().to_owned();
        let control = HidTransport::new(api.open_path(&device_path)?);

        let firmware = match control.read_version() {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("Failed to read firmware version: {}", e);
                None
            }
        };
        log::info!("Opened HID data channel: firmware={:?}", firmware);

        Ok(HidChannel {
            control: Some(Mutex::new(control)),
            device_path: Some(device_path),
            firmware,
            callbacks: Arc::default(),
            tracking: Mutex::new(None),
            read_timeout_ms: config.hid_read_timeout_ms,
        })
    }

    pub fn firmware_version(&self) -> Option<Version> {
        self.firmware
    }

    fn control(&self) -> Result<MutexGuard<'_, HidTransport>> {
        self.control
            .as_ref()
            .map(lock)
            .ok_or(MynteyeError::ChannelUnavailable)
    }

    fn open_reader_handle(&self) -> Result<HidDevice> {
        let path = self
            .device_path
            .as_ref()
            .ok_or(MynteyeError::ChannelUnavailable)?;
        let api = HidApi::new()?;
        Ok(api.open_path(path)?)
    }
}

impl SideChannel for HidChannel {
    fn is_available(&self) -> bool {
        self.control.is_some()
            && self
                .firmware
                .is_some_and(|v| v >= protocol::MIN_FILES_FIRMWARE)
    }

    fn read_files(&self) -> Result<DeviceFiles> {
        if !self.is_available() {
            return Err(MynteyeError::ChannelUnavailable);
        }
        self.control()?.read_files()
    }

    fn write_files(
        &self,
        desc: Option<&Descriptors>,
        imu_params: Option<&ImuParams>,
        spec_version: Option<&Version>,
    ) -> bool {
        let blob = protocol::encode_files(desc, imu_params, spec_version);
        if blob.is_empty() {
            log::warn!("Nothing to write to device flash");
            return false;
        }
        match self.control().and_then(|hid| hid.write_files(&blob)) {
            Ok(()) => {
                log::info!("Wrote {} bytes of device files", blob.len());
                true
            }
            Err(e) => {
                log::error!("Write device files failed: {}", e);
                false
            }
        }
    }

    fn set_imu_callback(&self, sink: Option<Arc<dyn ImuSink>>) {
        self.callbacks.set_imu(sink);
    }

    fn set_img_info_callback(&self, sink: Option<Arc<dyn ImgInfoSink>>) {
        self.callbacks.set_img_info(sink);
    }

    fn is_tracking_available(&self) -> bool {
        self.device_path.is_some()
    }

    fn is_tracking(&self) -> bool {
        lock(&self.tracking).is_some()
    }

    fn start_tracking(&self) -> bool {
        let mut tracking = lock(&self.tracking);
        if tracking.is_some() {
            return true;
        }

        let device = match self.open_reader_handle() {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Failed to open tracking reader: {}", e);
                return false;
            }
        };
        // The stream is switched on before any reader exists, so a failure
        // here never has a thread to join.
        if let Err(e) = self.control().and_then(|hid| hid.imu_stream(true)) {
            log::warn!("Failed to start IMU stream: {}", e);
            return false;
        }

        let callbacks = self.callbacks.clone();
        let timeout_ms = self.read_timeout_ms;
        match TrackingThread::spawn(move |stop_flag| {
            tracking_reader_loop(
                |buf: &mut [u8]| device.read_timeout(buf, timeout_ms),
                callbacks,
                stop_flag,
            )
        }) {
            Ok(thread) => {
                *tracking = Some(thread);
                true
            }
            Err(e) => {
                log::warn!("Failed to start tracking reader: {}", e);
                if let Err(e) = self.control().and_then(|hid| hid.imu_stream(false)) {
                    log::warn!("Failed to stop IMU stream: {}", e);
                }
                false
            }
        }
    }

    fn stop_tracking(&self) {
        // Released before joining: the reader may be inside a callback that
        // queries this channel.
        let Some(thread) = lock(&self.tracking).take() else {
            return;
        };
        if let Err(e) = self.control().and_then(|hid| hid.imu_stream(false)) {
            log::warn!("Failed to stop IMU stream: {}", e);
        }
        thread.stop();
    }
}

impl Drop for HidChannel {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

/// Background reader delivering data reports to the registered callbacks.
struct TrackingThread {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TrackingThread {
    /// Run `body` on the tracking thread. It must return once the flag it is
    /// given is set.
    fn spawn<F>(body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("mynteye-tracking".into())
            .spawn(move || body(stop_clone))
            .map_err(|e| {
                MynteyeError::HidCommand(format!("Failed to spawn tracking thread: {}", e))
            })?;

        Ok(TrackingThread {
            stop_flag,
            thread: Some(thread),
        })
    }

    fn id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Stopped from one of its own callbacks: joining would wait on
        // ourselves, so the thread is detached and exits on the flag.
        if self.id() == Some(std::thread::current().id()) {
            log::debug!("Tracking stopped from its own thread, detaching");
            self.thread = None;
            return;
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TrackingThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Returns when the stop flag is set or the device keeps failing reads.
fn tracking_reader_loop<R>(mut read: R, callbacks: Arc<Callbacks>, stop_flag: Arc<AtomicBool>)
where
    R: FnMut(&mut [u8]) -> hidapi::HidResult<usize>,
{
    let mut buf = [0u8; 64];
    let mut errors = 0u32;

    log::info!("Tracking reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Tracking reader stopping (stop flag set)");
            break;
        }

        let len = match read(&mut buf) {
            Ok(0) => {
                errors = 0;
                continue;
            }
            Ok(n) => {
                errors = 0;
                n
            }
            Err(e) => {
                errors += 1;
                if errors >= MAX_READ_ERRORS {
                    log::error!("Tracking reader giving up after {} failed reads: {}", errors, e);
                    break;
                }
                log::warn!("Tracking read error: {}", e);
                std::thread::sleep(READ_ERROR_BACKOFF);
                continue;
            }
        };

        // Control responses share the endpoint; anything else is skipped.
        let Some(segments) = protocol::parse_data_report(&buf[..len]) else {
            log::trace!("Skipping non-data report ({} bytes)", len);
            continue;
        };
        for segment in &segments {
            callbacks.dispatch(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImuFlag;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        imu: AtomicUsize,
        img: AtomicUsize,
    }

    impl ImuSink for Counter {
        fn on_imu_data(&self, _data: &ImuData) {
            self.imu.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ImgInfoSink for Counter {
        fn on_img_info(&self, _info: &ImgInfo) {
            self.img.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn imu_segment() -> Segment {
        Segment::Imu(ImuData {
            flag: ImuFlag::Gyro,
            timestamp_us: 1,
            accel: [0.0; 3],
            gyro: [1.0, 2.0, 3.0],
            temperature: 30.0,
        })
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let callbacks = Callbacks::default();
        let counter = Arc::new(Counter::default());
        callbacks.set_imu(Some(counter.clone()));
        callbacks.set_img_info(Some(counter.clone()));

        callbacks.dispatch(&imu_segment());
        callbacks.dispatch(&Segment::ImgInfo(ImgInfo::default()));
        callbacks.dispatch(&imu_segment());

        assert_eq!(counter.imu.load(Ordering::SeqCst), 2);
        assert_eq!(counter.img.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_replaces_slot() {
        let callbacks = Callbacks::default();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());

        callbacks.set_imu(Some(first.clone()));
        callbacks.set_imu(Some(second.clone()));
        callbacks.dispatch(&imu_segment());

        assert_eq!(first.imu.load(Ordering::SeqCst), 0);
        assert_eq!(second.imu.load(Ordering::SeqCst), 1);
        // The registry holds one reference to the current sink only.
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(Arc::strong_count(&second), 2);
    }

    #[test]
    fn test_dispatch_without_sink_is_noop() {
        let callbacks = Callbacks::default();
        callbacks.dispatch(&imu_segment());
        assert!(!callbacks.has_imu());
        assert!(!callbacks.has_img_info());
    }

    struct Reentrant {
        callbacks: Arc<Callbacks>,
        hits: AtomicUsize,
    }

    impl ImuSink for Reentrant {
        fn on_imu_data(&self, _data: &ImuData) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            // Re-registering from inside a callback must not deadlock.
            self.callbacks.set_imu(None);
        }
    }

    #[test]
    fn test_sink_may_reregister_during_dispatch() {
        let callbacks = Arc::new(Callbacks::default());
        let sink = Arc::new(Reentrant {
            callbacks: callbacks.clone(),
            hits: AtomicUsize::new(0),
        });
        callbacks.set_imu(Some(sink.clone()));

        callbacks.dispatch(&imu_segment());
        callbacks.dispatch(&imu_segment());

        assert_eq!(sink.hits.load(Ordering::SeqCst), 1);
        assert!(!callbacks.has_imu());
    }

    /// Queries the channel from inside the callback, optionally stopping it.
    struct Querying {
        channel: std::sync::Weak<HidChannel>,
        stop_from_callback: bool,
        hits: AtomicUsize,
    }

    impl ImuSink for Querying {
        fn on_imu_data(&self, _data: &ImuData) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(channel) = self.channel.upgrade() {
                let _ = channel.is_tracking();
                if self.stop_from_callback {
                    channel.stop_tracking();
                }
            }
        }
    }

    /// Channel whose reader dispatches IMU samples until stopped.
    fn pumping_channel(stop_from_callback: bool) -> (Arc<HidChannel>, Arc<Querying>) {
        let channel = Arc::new(HidChannel::unavailable(&Config::default()));
        let sink = Arc::new(Querying {
            channel: Arc::downgrade(&channel),
            stop_from_callback,
            hits: AtomicUsize::new(0),
        });
        channel.set_imu_callback(Some(sink.clone()));

        let callbacks = channel.callbacks.clone();
        let thread = TrackingThread::spawn(move |stop_flag| {
            while !stop_flag.load(Ordering::Relaxed) {
                callbacks.dispatch(&imu_segment());
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        *lock(&channel.tracking) = Some(thread);
        (channel, sink)
    }

    fn wait_for_hits(sink: &Querying) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while sink.hits.load(Ordering::SeqCst) == 0 {
            assert!(std::time::Instant::now() < deadline, "reader never dispatched");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stop_while_callback_queries_channel() {
        let (channel, sink) = pumping_channel(false);
        wait_for_hits(&sink);

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let c = channel.clone();
        std::thread::spawn(move || {
            c.stop_tracking();
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(!channel.is_tracking());
    }

    #[test]
    fn test_stop_from_own_callback_detaches() {
        let (channel, sink) = pumping_channel(true);
        wait_for_hits(&sink);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while channel.is_tracking() {
            assert!(std::time::Instant::now() < deadline, "reader did not stop itself");
            std::thread::sleep(Duration::from_millis(1));
        }
        channel.set_imu_callback(None);
    }

    #[test]
    fn test_reader_gives_up_on_failing_device() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let read = move |_: &mut [u8]| -> hidapi::HidResult<usize> {
            c.fetch_add(1, Ordering::SeqCst);
            Err(hidapi::HidError::HidApiError {
                message: "device disconnected".into(),
            })
        };

        let started = std::time::Instant::now();
        tracking_reader_loop(read, Arc::default(), Arc::new(AtomicBool::new(false)));

        assert_eq!(calls.load(Ordering::SeqCst), MAX_READ_ERRORS as usize);
        // Backed off between attempts instead of spinning.
        assert!(started.elapsed() >= READ_ERROR_BACKOFF * (MAX_READ_ERRORS - 1));
    }

    #[test]
    fn test_reader_dispatches_and_skips_noise() {
        let mut report = [0u8; protocol::DATA_REPORT_LEN];
        report[0] = protocol::DATA_HEADER;
        report[1] = 1;
        report[2] = 3;
        report[3..5].copy_from_slice(&7u16.to_le_bytes());
        let checksum = report[..protocol::DATA_REPORT_LEN - 1]
            .iter()
            .fold(0, |acc, &b| acc ^ b);
        report[protocol::DATA_REPORT_LEN - 1] = checksum;

        let stop = Arc::new(AtomicBool::new(false));
        let s = stop.clone();
        let mut step = 0;
        let read = move |buf: &mut [u8]| -> hidapi::HidResult<usize> {
            step += 1;
            match step {
                1 => Ok(0),
                2 => {
                    buf[..3].copy_from_slice(&[0x01, 0x1C, 0x99]);
                    Ok(3)
                }
                3 => {
                    buf[..report.len()].copy_from_slice(&report);
                    Ok(report.len())
                }
                _ => {
                    s.store(true, Ordering::SeqCst);
                    Ok(0)
                }
            }
        };

        let callbacks = Arc::new(Callbacks::default());
        let counter = Arc::new(Counter::default());
        callbacks.set_img_info(Some(counter.clone()));
        tracking_reader_loop(read, callbacks, stop);

        assert_eq!(counter.img.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unavailable_channel() {
        let channel = HidChannel::unavailable(&Config::default());
        assert!(!channel.is_available());
        assert!(!channel.is_tracking_available());
        assert!(!channel.start_tracking());
        assert!(!channel.is_tracking());
        assert!(matches!(
            channel.read_files(),
            Err(MynteyeError::ChannelUnavailable)
        ));
        assert!(!channel.write_files(Some(&Descriptors::default()), None, None));
        channel.stop_tracking();
    }
}
