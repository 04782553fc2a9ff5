use super::{Method, RateEstimator};
use crate::conditioning::{mean, ConditionedWindow};
use crate::metrics::hrv::interval_stats;
use crate::signal::{in_band, IntervalSeries, Quality, RateEstimate};
use serde::{Deserialize, Serialize};

/// Configurable parameters for time-domain beat picking.
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    /// Samples on each side a peak must strictly exceed.
    pub neighbours: usize,
    /// Threshold = median + fraction * (max - median).
    pub threshold_fraction: f64,
    /// Refractory period between accepted peaks (ms), the 180 BPM period.
    pub min_separation_ms: i64,
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    /// Survival ratio at or above which the trace counts as good.
    pub good_survival: f64,
    /// Survival ratio below which the trace counts as poor.
    pub poor_survival: f64,
    /// Rate band required for a good grade.
    pub good_bpm: (f64, f64),
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            neighbours: 2,
            threshold_fraction: 0.3,
            min_separation_ms: 333,
            min_interval_ms: 333.0,
            max_interval_ms: 1500.0,
            good_survival: 0.7,
            poor_survival: 0.4,
            good_bpm: (50.0, 150.0),
        }
    }
}

/// Output of the peak detector, richer than a bare [`RateEstimate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakAnalysis {
    pub estimate: RateEstimate,
    pub quality: Quality,
    /// Standard deviation of the surviving intervals (ms).
    pub hrv_ms: f64,
    pub peak_timestamps_ms: Vec<i64>,
    /// Surviving inter-beat intervals.
    pub intervals: IntervalSeries,
    /// Fraction of raw intervals that survived range filtering.
    pub survival_ratio: f64,
}

impl PeakAnalysis {
    fn empty() -> Self {
        Self {
            estimate: RateEstimate::none(),
            quality: Quality::Poor,
            hrv_ms: 0.0,
            peak_timestamps_ms: Vec::new(),
            intervals: IntervalSeries::default(),
            survival_ratio: 0.0,
        }
    }
}

impl PeakDetector {
    pub fn analyze(&self, window: &ConditionedWindow) -> PeakAnalysis {
        let peaks = self.pick_peaks(window);
        let peak_timestamps_ms: Vec<i64> = peaks.iter().map(|&i| window.timestamps_ms[i]).collect();
        let raw = IntervalSeries::from_peak_times(&peak_timestamps_ms);
        if raw.is_empty() {
            return PeakAnalysis {
                peak_timestamps_ms,
                ..PeakAnalysis::empty()
            };
        }
        let intervals = raw.retain_range(self.min_interval_ms, self.max_interval_ms);
        let survival_ratio = intervals.len() as f64 / raw.len() as f64;
        if intervals.is_empty() {
            return PeakAnalysis {
                peak_timestamps_ms,
                survival_ratio,
                ..PeakAnalysis::empty()
            };
        }

        let stats = interval_stats(&intervals);
        let bpm = 60_000.0 / stats.mean_ms;
        let quality = self.grade(survival_ratio, bpm);
        PeakAnalysis {
            estimate: RateEstimate::new(bpm, survival_ratio).banded(),
            quality,
            hrv_ms: stats.sdnn_ms,
            peak_timestamps_ms,
            intervals,
            survival_ratio,
        }
    }

    fn grade(&self, survival_ratio: f64, bpm: f64) -> Quality {
        if survival_ratio >= self.good_survival && in_band(bpm, self.good_bpm.0, self.good_bpm.1) {
            Quality::Good
        } else if survival_ratio < self.poor_survival {
            Quality::Poor
        } else {
            Quality::Fair
        }
    }

    /// Indices of accepted local maxima.
    pub fn pick_peaks(&self, window: &ConditionedWindow) -> Vec<usize> {
        let data = &window.values;
        let k = self.neighbours.max(1);
        if data.len() < 2 * k + 1 || window.timestamps_ms.len() != data.len() {
            return Vec::new();
        }
        let threshold = self.adaptive_threshold(data);

        let mut peaks: Vec<usize> = Vec::new();
        for i in k..data.len() - k {
            let y = data[i];
            if y <= threshold {
                continue;
            }
            let is_max = (1..=k).all(|d| y > data[i - d] && y > data[i + d]);
            if !is_max {
                continue;
            }
            let spaced = match peaks.last() {
                Some(&last) => {
                    window.timestamps_ms[i] - window.timestamps_ms[last] >= self.min_separation_ms
                }
                None => true,
            };
            if spaced {
                peaks.push(i);
            }
        }
        peaks
    }

    fn adaptive_threshold(&self, data: &[f64]) -> f64 {
        let median = median(data);
        let max = data.iter().copied().fold(f64::MIN, f64::max);
        median + self.threshold_fraction * (max - median)
    }
}

impl RateEstimator for PeakDetector {
    fn method(&self) -> Method {
        Method::PeakDetection
    }

    fn estimate(&self, window: &ConditionedWindow) -> RateEstimate {
        self.analyze(window).estimate
    }
}

pub(crate) fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        mean(&sorted[mid - 1..=mid])
    } else {
        sorted[mid]
    }
}
