use serde::{Deserialize, Serialize};

/// Lower bound of the plausible heart-rate band (BPM).
pub const MIN_BPM: f64 = 45.0;
/// Upper bound of the plausible heart-rate band (BPM).
pub const MAX_BPM: f64 = 180.0;

/// One brightness reading from the camera, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in milliseconds
    pub timestamp_ms: i64,
    /// Mean frame brightness
    pub brightness: f64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, brightness: f64) -> Self {
        Self {
            timestamp_ms,
            brightness,
        }
    }
}

/// Raw per-frame payload delivered by the camera collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameReading {
    pub timestamp_ms: i64,
    pub brightness: f64,
    /// Native (coarse) finger detection flag.
    #[serde(default)]
    pub finger_detected: bool,
}

impl FrameReading {
    /// Effective finger presence, overriding unreliable native detection.
    pub fn finger_present(&self, brightness_threshold: f64) -> bool {
        self.finger_detected || self.brightness > brightness_threshold
    }

    pub fn sample(&self) -> Sample {
        Sample::new(self.timestamp_ms, self.brightness)
    }
}

/// Heart-rate estimate from a single method. `confidence == 0` means unusable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateEstimate {
    pub heart_rate_bpm: f64,
    pub confidence: f64,
}

impl RateEstimate {
    pub fn new(heart_rate_bpm: f64, confidence: f64) -> Self {
        Self {
            heart_rate_bpm,
            confidence,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn in_band(&self) -> bool {
        in_band(self.heart_rate_bpm, MIN_BPM, MAX_BPM)
    }

    pub fn is_usable(&self) -> bool {
        self.confidence > 0.0 && self.in_band()
    }

    /// Zero the confidence when the rate left the physiological band, keeping
    /// the raw rate for fallback averaging.
    pub(crate) fn banded(self) -> Self {
        if self.in_band() {
            self
        } else {
            Self {
                heart_rate_bpm: self.heart_rate_bpm,
                confidence: 0.0,
            }
        }
    }
}

pub(crate) fn in_band(bpm: f64, low: f64, high: f64) -> bool {
    bpm.is_finite() && bpm >= low && bpm <= high
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Fair,
    Poor,
}

impl Quality {
    /// Map a quality grade onto a [0,1] score for metrics that have no direct measure.
    pub fn score(&self) -> f64 {
        match self {
            Quality::Good => 0.9,
            Quality::Fair => 0.7,
            Quality::Poor => 0.4,
        }
    }
}

/// Inter-beat intervals (milliseconds)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSeries {
    pub intervals_ms: Vec<f64>,
}

impl IntervalSeries {
    pub fn from_peak_times(peak_timestamps_ms: &[i64]) -> Self {
        let intervals_ms = peak_timestamps_ms
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64)
            .collect();
        Self { intervals_ms }
    }

    pub fn len(&self) -> usize {
        self.intervals_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals_ms.is_empty()
    }

    /// Keep only intervals in `[min_ms, max_ms]`.
    pub fn retain_range(&self, min_ms: f64, max_ms: f64) -> Self {
        Self {
            intervals_ms: self
                .intervals_ms
                .iter()
                .copied()
                .filter(|iv| *iv >= min_ms && *iv <= max_ms)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finger_presence_overrides_native_flag() {
        let dim = FrameReading {
            timestamp_ms: 0,
            brightness: 20.0,
            finger_detected: false,
        };
        let bright = FrameReading {
            brightness: 51.0,
            ..dim
        };
        let flagged = FrameReading {
            finger_detected: true,
            ..dim
        };
        assert!(!dim.finger_present(50.0));
        assert!(bright.finger_present(50.0));
        assert!(flagged.finger_present(50.0));
    }

    #[test]
    fn out_of_band_estimate_loses_confidence() {
        let est = RateEstimate::new(200.0, 0.9).banded();
        assert_eq!(est.confidence, 0.0);
        assert_eq!(est.heart_rate_bpm, 200.0);
        assert!(RateEstimate::new(72.0, 0.5).banded().is_usable());
    }

    #[test]
    fn intervals_from_peak_times() {
        let series = IntervalSeries::from_peak_times(&[0, 800, 1650, 3400]);
        assert_eq!(series.intervals_ms, vec![800.0, 850.0, 1750.0]);
        assert_eq!(series.retain_range(333.0, 1500.0).len(), 2);
    }
}
