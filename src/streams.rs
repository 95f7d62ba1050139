use crate::channel::{lock, ImgInfoSink};
use crate::types::ImgInfo;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// User callback invoked for every image info, on the notification thread.
pub type ImgInfoCallback = Arc<dyn Fn(&ImgInfo) + Send + Sync>;

/// Stream collaborator, image-info side: follows the camera lifecycle and
/// keeps the most recent image infos for pairing with frames.
pub struct Streams {
    capacity: usize,
    state: Mutex<StreamsState>,
}

#[derive(Default)]
struct StreamsState {
    camera_active: bool,
    infos: VecDeque<ImgInfo>,
    callback: Option<ImgInfoCallback>,
}

impl Streams {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(StreamsState::default()),
        }
    }

    pub fn on_camera_open(&self) {
        let mut state = lock(&self.state);
        state.camera_active = true;
        state.infos.clear();
    }

    pub fn on_camera_close(&self) {
        let mut state = lock(&self.state);
        state.camera_active = false;
        state.infos.clear();
    }

    pub fn set_img_info_callback(&self, callback: Option<ImgInfoCallback>) {
        lock(&self.state).callback = callback;
    }

    /// Retained image infos, oldest first.
    pub fn image_infos(&self) -> Vec<ImgInfo> {
        lock(&self.state).infos.iter().copied().collect()
    }

    /// Most recent retained image info for `frame_id`.
    pub fn image_info_for(&self, frame_id: u16) -> Option<ImgInfo> {
        lock(&self.state)
            .infos
            .iter()
            .rev()
            .find(|i| i.frame_id == frame_id)
            .copied()
    }
}

impl ImgInfoSink for Streams {
    fn on_img_info(&self, info: &ImgInfo) {
        let callback = {
            let mut state = lock(&self.state);
            // History only covers the current open session.
            if state.camera_active {
                if state.infos.len() == self.capacity {
                    state.infos.pop_front();
                }
                state.infos.push_back(*info);
            }
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(info);
        }
    }
}
