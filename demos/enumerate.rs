//! List all connected MYNT EYE cameras.

fn main() {
    env_logger::init();

    match mynteye::transport::list_devices() {
        Ok(devices) => {
            println!("Found {} MYNT EYE camera(s):", devices.len());
            for dev in &devices {
                println!(
                    "  [{}] name={}  serial={}",
                    dev.index, dev.name, dev.serial_number
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
