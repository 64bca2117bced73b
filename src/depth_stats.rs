//! Sorting depth samples into usable readings and the device's error codes,
//! and summarising a point cloud.

use std::fmt;

/// Closest distance the D1 measures reliably, in millimetres.
pub const MIN_VALID_DEPTH: u16 = 51;
/// Furthest distance the D1 measures reliably, in millimetres.
pub const MAX_VALID_DEPTH: u16 = 3000;

/// What a single sample means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthCode {
    /// A distance within the valid range, in millimetres
    Valid(u16),
    /// A number that is neither a usable distance nor an error code
    OutOfRange(u16),
    /// Too little light came back (4081)
    LowAmplitude,
    /// The converter overflowed (4082)
    AdcOverflow,
    /// The sensor was saturated (4083)
    Saturation,
}

impl DepthCode {
    #[allow(missing_docs)]
    pub fn classify(sample: u16) -> Self {
        match sample {
            4081 => DepthCode::LowAmplitude,
            4082 => DepthCode::AdcOverflow,
            4083 => DepthCode::Saturation,
            MIN_VALID_DEPTH..=MAX_VALID_DEPTH => DepthCode::Valid(sample),
            other => DepthCode::OutOfRange(other),
        }
    }
}

/// Counts per [`DepthCode`] plus min / max / mean over the valid samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthStats {
    #[allow(missing_docs)]
    pub valid: usize,
    #[allow(missing_docs)]
    pub out_of_range: usize,
    #[allow(missing_docs)]
    pub low_amplitude: usize,
    #[allow(missing_docs)]
    pub adc_overflow: usize,
    #[allow(missing_docs)]
    pub saturation: usize,
    /// Nearest valid sample
    pub min: Option<u16>,
    /// Furthest valid sample
    pub max: Option<u16>,
    sum: u64,
}

impl DepthStats {
    /// Summarise one point cloud.
    pub fn from_samples(samples: &[u16]) -> Self {
        let mut stats = Self::default();
        stats.add_samples(samples);
        stats
    }

    /// Fold more samples in, for example the next frame of a recording.
    pub fn add_samples(&mut self, samples: &[u16]) {
        for &sample in samples {
            match DepthCode::classify(sample) {
                DepthCode::Valid(depth) => {
                    self.valid += 1;
                    self.sum += depth as u64;
                    self.min = Some(self.min.map_or(depth, |min| min.min(depth)));
                    self.max = Some(self.max.map_or(depth, |max| max.max(depth)));
                }
                DepthCode::OutOfRange(_) => self.out_of_range += 1,
                DepthCode::LowAmplitude => self.low_amplitude += 1,
                DepthCode::AdcOverflow => self.adc_overflow += 1,
                DepthCode::Saturation => self.saturation += 1,
            }
        }
    }

    /// Mean of the valid samples.
    pub fn mean(&self) -> Option<f64> {
        (self.valid > 0).then(|| self.sum as f64 / self.valid as f64)
    }

    /// Samples seen in total.
    pub fn total(&self) -> usize {
        self.valid + self.out_of_range + self.low_amplitude + self.adc_overflow + self.saturation
    }
}

impl fmt::Display for DepthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max, self.mean()) {
            (Some(min), Some(max), Some(mean)) => write!(
                f,
                "{}/{} valid, {}..{} mm, mean {:.0} mm",
                self.valid,
                self.total(),
                min,
                max,
                mean
            )?,
            _ => write!(f, "0/{} valid", self.total())?,
        }
        write!(
            f,
            " (low amplitude {}, adc overflow {}, saturation {}, out of range {})",
            self.low_amplitude, self.adc_overflow, self.saturation, self.out_of_range
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_codes_and_range() {
        assert_eq!(DepthCode::classify(4081), DepthCode::LowAmplitude);
        assert_eq!(DepthCode::classify(4082), DepthCode::AdcOverflow);
        assert_eq!(DepthCode::classify(4083), DepthCode::Saturation);
        assert_eq!(DepthCode::classify(51), DepthCode::Valid(51));
        assert_eq!(DepthCode::classify(3000), DepthCode::Valid(3000));
        assert_eq!(DepthCode::classify(50), DepthCode::OutOfRange(50));
        assert_eq!(DepthCode::classify(3001), DepthCode::OutOfRange(3001));
    }

    #[test]
    fn stats_over_a_mixed_cloud() {
        let stats = DepthStats::from_samples(&[100, 300, 4081, 4081, 4083, 0, 200]);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.low_amplitude, 2);
        assert_eq!(stats.saturation, 1);
        assert_eq!(stats.adc_overflow, 0);
        assert_eq!(stats.out_of_range, 1);
        assert_eq!(stats.min, Some(100));
        assert_eq!(stats.max, Some(300));
        assert_eq!(stats.mean(), Some(200.0));
        assert_eq!(stats.total(), 7);
    }

    #[test]
    fn nothing_valid_has_no_mean() {
        let stats = DepthStats::from_samples(&[0; 16]);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.min, None);
        assert!(stats.to_string().starts_with("0/16 valid"));
    }

    #[test]
    fn adding_frames_accumulates() {
        let mut stats = DepthStats::from_samples(&[1000]);
        stats.add_samples(&[2000, 4082]);
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.adc_overflow, 1);
        assert_eq!(stats.mean(), Some(1500.0));
    }
}
