//! Stream IMU samples and image infos from the HID data channel to stdout.
//!
//! Usage: cargo run --example motion [seconds]

use mynteye::{Config, HidChannel, ImgInfo, ImgInfoSink, ImuData, ImuSink, SideChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Printer {
    imu: AtomicU64,
    img_info: AtomicU64,
}

impl ImuSink for Printer {
    fn on_imu_data(&self, data: &ImuData) {
        let n = self.imu.fetch_add(1, Ordering::Relaxed);
        if n % 100 == 0 {
            println!(
                "[{:>10}us] {:?}  accel=({:+.3}, {:+.3}, {:+.3})  gyro=({:+.2}, {:+.2}, {:+.2})  T={:.1}",
                data.timestamp_us,
                data.flag,
                data.accel[0],
                data.accel[1],
                data.accel[2],
                data.gyro[0],
                data.gyro[1],
                data.gyro[2],
                data.temperature
            );
        }
    }
}

impl ImgInfoSink for Printer {
    fn on_img_info(&self, info: &ImgInfo) {
        self.img_info.fetch_add(1, Ordering::Relaxed);
        log::debug!("frame {} at {}us", info.frame_id, info.timestamp_us);
    }
}

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let channel = HidChannel::open_first(&Config::from_env());
    if !channel.is_tracking_available() {
        eprintln!("Error: no HID data channel found");
        std::process::exit(1);
    }

    let printer = Arc::new(Printer::default());
    channel.set_imu_callback(Some(printer.clone()));
    channel.set_img_info_callback(Some(printer.clone()));
    if !channel.start_tracking() {
        eprintln!("Error: could not start tracking");
        std::process::exit(1);
    }

    let start = Instant::now();
    let mut last = (0, 0);
    while start.elapsed() < Duration::from_secs(seconds) {
        std::thread::sleep(Duration::from_secs(1));
        let now = (
            printer.imu.load(Ordering::Relaxed),
            printer.img_info.load(Ordering::Relaxed),
        );
        println!(
            "--- {} IMU/s, {} image infos/s",
            now.0 - last.0,
            now.1 - last.1
        );
        last = now;
    }

    channel.stop_tracking();
    println!(
        "Done: {} IMU samples, {} image infos in {:.1}s",
        last.0,
        last.1,
        start.elapsed().as_secs_f64()
    );
}
