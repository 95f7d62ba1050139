use crate::diagnostics::Verbosity;

/// Runtime knobs, read from `MYNTEYE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `MYNTEYE_VERBOSITY`: silent | errors | verbose
    pub verbosity: Verbosity,
    /// `MYNTEYE_HID_READ_TIMEOUT_MS`: poll interval of the tracking reader,
    /// also how long a stop request may wait for the reader to notice.
    pub hid_read_timeout_ms: i32,
    /// `MYNTEYE_IMAGE_INFO_CAPACITY`: image infos retained for frame pairing.
    pub image_info_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Errors,
            hid_read_timeout_ms: 100,
            image_info_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: read_parsed(&lookup, "MYNTEYE_VERBOSITY", defaults.verbosity),
            hid_read_timeout_ms: read_parsed(
                &lookup,
                "MYNTEYE_HID_READ_TIMEOUT_MS",
                defaults.hid_read_timeout_ms,
            )
            .max(1),
            image_info_capacity: read_parsed(
                &lookup,
                "MYNTEYE_IMAGE_INFO_CAPACITY",
                defaults.image_info_capacity,
            )
            .max(1),
        }
    }
}

fn read_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("Ignoring invalid {}='{}'", name, raw);
                default
            }
        },
        None => default,
    }
}
