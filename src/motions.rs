use crate::channel::{lock, ImuSink};
use crate::types::{ImuData, ImuFlag, ImuIntrinsics, MotionIntrinsics, ProcessMode};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// User callback invoked for every IMU sample, on the notification thread.
pub type MotionCallback = Arc<dyn Fn(&ImuData) + Send + Sync>;

/// IMU sample collaborator: corrects samples, forwards them to the user
/// callback and optionally retains the newest ones.
pub struct Motions {
    state: Mutex<MotionsState>,
}

struct MotionsState {
    process_mode: ProcessMode,
    intrinsics: Option<MotionIntrinsics>,
    callback: Option<MotionCallback>,
    buffer: Option<(Sender<ImuData>, Receiver<ImuData>)>,
}

impl Default for Motions {
    fn default() -> Self {
        Self::new()
    }
}

impl Motions {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MotionsState {
                process_mode: ProcessMode::empty(),
                intrinsics: None,
                callback: None,
                buffer: None,
            }),
        }
    }

    pub fn enable_process_mode(&self, mode: ProcessMode) {
        lock(&self.state).process_mode = mode;
    }

    pub fn set_motion_intrinsics(&self, intrinsics: MotionIntrinsics) {
        lock(&self.state).intrinsics = Some(intrinsics);
    }

    pub fn set_motion_callback(&self, callback: Option<MotionCallback>) {
        lock(&self.state).callback = callback;
    }

    /// Start retaining at most `max_size` samples. Changing the size keeps
    /// the newest samples already buffered.
    pub fn enable_motion_datas(&self, max_size: usize) {
        let max_size = max_size.max(1);
        let mut state = lock(&self.state);
        if let Some((tx, _)) = &state.buffer {
            if tx.capacity() == Some(max_size) {
                return;
            }
        }

        let (tx, rx) = crossbeam_channel::bounded(max_size);
        if let Some((_, old_rx)) = state.buffer.take() {
            for data in old_rx.try_iter() {
                push_bounded(&tx, &rx, data);
            }
        }
        state.buffer = Some((tx, rx));
    }

    /// Drain the retained samples, oldest first.
    pub fn motion_datas(&self) -> Vec<ImuData> {
        let rx = lock(&self.state).buffer.as_ref().map(|(_, rx)| rx.clone());
        match rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl ImuSink for Motions {
    fn on_imu_data(&self, data: &ImuData) {
        let (mode, intrinsics, callback) = {
            let state = lock(&self.state);
            (state.process_mode, state.intrinsics, state.callback.clone())
        };

        let data = process(*data, mode, intrinsics.as_ref());
        if let Some(callback) = callback {
            callback(&data);
        }
        // Pushed under the lock so a concurrent resize cannot swap the
        // buffer out between lookup and send.
        if let Some((tx, rx)) = &lock(&self.state).buffer {
            push_bounded(tx, rx, data);
        }
    }
}

/// Send, evicting the oldest sample while the channel is full.
fn push_bounded(tx: &Sender<ImuData>, rx: &Receiver<ImuData>, mut data: ImuData) {
    loop {
        match tx.try_send(data) {
            Ok(()) => return,
            Err(TrySendError::Full(back)) => {
                log::trace!("Motion buffer full, dropping oldest sample");
                let _ = rx.try_recv();
                data = back;
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

/// Apply the requested corrections. Without intrinsics the sample is untouched.
pub fn process(
    mut data: ImuData,
    mode: ProcessMode,
    intrinsics: Option<&MotionIntrinsics>,
) -> ImuData {
    let Some(intrinsics) = intrinsics else {
        return data;
    };
    let temperature = data.temperature;
    let (values, imu) = match data.flag {
        ImuFlag::Accel => (&mut data.accel, &intrinsics.accel),
        ImuFlag::Gyro => (&mut data.gyro, &intrinsics.gyro),
    };
    if mode.contains(ProcessMode::TEMP_DRIFT) {
        compensate_temperature(values, imu, temperature);
    }
    if mode.contains(ProcessMode::ASSEMBLY) {
        *values = apply_assembly(values, imu);
    }
    data
}

fn compensate_temperature(values: &mut [f64; 3], imu: &ImuIntrinsics, temperature: f64) {
    for (v, c) in values.iter_mut().zip([imu.x, imu.y, imu.z]) {
        *v -= c[0] + c[1] * temperature;
    }
}

fn apply_assembly(values: &[f64; 3], imu: &ImuIntrinsics) -> [f64; 3] {
    let mut m = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            m[i][j] = (0..3).map(|k| imu.assembly[i][k] * imu.scale[k][j]).sum();
        }
    }
    let mut out = [0.0; 3];
    for (i, row) in m.iter().enumerate() {
        out[i] = row.iter().zip(values).map(|(a, b)| a * b).sum();
    }
    out
}
