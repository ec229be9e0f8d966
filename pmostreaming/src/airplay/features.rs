use tracing::warn;

use crate::model::DeviceFeatures;

const VIDEO_BIT: u32 = 0;
const IMAGE_BIT: u32 = 1;
const SLIDESHOW_BIT: u32 = 5;
const AUDIO_BIT: u32 = 9;

/// Capability mask advertised by an AirPlay receiver, e.g. `0x5A7FFFF7`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AirplayFeatures {
    mask: u64,
}

impl AirplayFeatures {
    /// Missing or unparsable masks advertise nothing.
    ///
    /// Newer receivers append a second word (`0x5A7FFFF7,0x1E`); only the
    /// first one carries the bits read here. Digits beyond the low 64 bits
    /// are ignored.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let first = raw.split(',').next().unwrap_or_default().trim();
        let digits = first
            .strip_prefix("0x")
            .or_else(|| first.strip_prefix("0X"))
            .unwrap_or(first);
        let digits = digits
            .char_indices()
            .rev()
            .nth(15)
            .map_or(digits, |(start, _)| &digits[start..]);

        match u64::from_str_radix(digits, 16) {
            Ok(mask) => Self { mask },
            Err(err) => {
                warn!(features = raw, error = %err, "Invalid AirPlay features mask");
                Self::default()
            }
        }
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    fn has(&self, bit: u32) -> bool {
        self.mask & (1 << bit) != 0
    }

    pub fn device_features(&self) -> DeviceFeatures {
        DeviceFeatures {
            video: self.has(VIDEO_BIT),
            audio: self.has(AUDIO_BIT),
            image: self.has(IMAGE_BIT),
            slideshow: self.has(SLIDESHOW_BIT),
        }
    }
}
