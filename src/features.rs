use crate::types::ImageType;

/// How image infos are delivered once enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfoMode {
    /// Pair each frame with the image info of the same frame id.
    pub sync: bool,
}

/// Consumer-facing features enabled on a camera.
///
/// Enable-only: nothing is ever switched off again for the lifetime of the
/// camera. Re-enabling updates the parameters (sync mode, capacity).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureToggles {
    image_info: Option<ImageInfoMode>,
    stream_data: ImageType,
    motion_capacity: Option<usize>,
}

impl FeatureToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_image_info(&mut self, sync: bool) {
        self.image_info = Some(ImageInfoMode { sync });
    }

    pub fn enable_stream_data(&mut self, types: ImageType) {
        self.stream_data |= types;
    }

    /// A capacity of 0 is treated as 1: an enabled buffer holds at least one sample.
    pub fn enable_motion_datas(&mut self, max_size: usize) {
        self.motion_capacity = Some(max_size.max(1));
    }

    pub fn is_image_info_enabled(&self) -> bool {
        self.image_info.is_some()
    }

    pub fn is_image_info_synced(&self) -> bool {
        self.image_info.is_some_and(|m| m.sync)
    }

    /// True if every type in `types` is enabled (and `types` is not empty).
    pub fn is_stream_data_enabled(&self, types: ImageType) -> bool {
        !types.is_empty() && self.stream_data.contains(types)
    }

    pub fn has_stream_data_enabled(&self) -> bool {
        !self.stream_data.is_empty()
    }

    pub fn is_motion_datas_enabled(&self) -> bool {
        self.motion_capacity.is_some()
    }

    pub fn motion_capacity(&self) -> Option<usize> {
        self.motion_capacity
    }

    /// Tracking is wanted iff IMU data or image infos are enabled.
    pub fn wants_tracking(&self) -> bool {
        self.is_motion_datas_enabled() || self.is_image_info_enabled()
    }
}
