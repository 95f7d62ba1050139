//! Print the descriptors and IMU calibration stored in the device flash.

use mynteye::{Config, HidChannel, SideChannel};

fn main() {
    env_logger::init();

    let channel = HidChannel::open_first(&Config::from_env());
    if !channel.is_available() {
        eprintln!("Error: no HID data channel (device missing or firmware too old)");
        std::process::exit(1);
    }

    match channel.read_files() {
        Ok(files) => {
            let d = &files.descriptors;
            println!("Name:      {}", d.name);
            println!("Serial:    {}", d.serial_number);
            println!("Firmware:  {}", d.firmware_version);
            println!("Hardware:  {}", d.hardware_version);
            println!("Spec:      {}", d.spec_version);
            println!("Lens:      {}", d.lens_type);
            println!("IMU:       {}", d.imu_type);
            println!("Baseline:  {}", d.nominal_baseline);
            if files.imu_params.ok {
                println!("Accel:     {:?}", files.imu_params.in_accel);
                println!("Gyro:      {:?}", files.imu_params.in_gyro);
                println!("Left->IMU: {:?}", files.imu_params.ex_left_to_imu);
            } else {
                println!("IMU params: not stored");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
