use crate::signal::Sample;
use serde::{Deserialize, Serialize};

/// DC-free, smoothed brightness trace with its timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionedWindow {
    /// Empirical sample rate in Hz
    pub sample_rate: f64,
    pub values: Vec<f64>,
    pub timestamps_ms: Vec<i64>,
}

impl ConditionedWindow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.timestamps_ms.first(), self.timestamps_ms.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

/// Sample rate measured from the timestamps rather than assumed from the
/// camera's nominal frame rate. Falls back to `nominal_hz` when the samples
/// span no time.
pub fn empirical_sample_rate(samples: &[Sample], nominal_hz: f64) -> f64 {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return nominal_hz,
    };
    let span_s = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0;
    if span_s <= 0.0 {
        return nominal_hz;
    }
    samples.len() as f64 / span_s
}

/// Remove the window mean, then smooth with a centred moving average.
pub fn condition(samples: &[Sample], nominal_hz: f64) -> ConditionedWindow {
    let sample_rate = empirical_sample_rate(samples, nominal_hz);
    let raw: Vec<f64> = samples.iter().map(|s| s.brightness).collect();
    let centred = remove_dc(&raw);
    let values = centred_moving_average(&centred, smoothing_width(sample_rate));
    ConditionedWindow {
        sample_rate,
        values,
        timestamps_ms: samples.iter().map(|s| s.timestamp_ms).collect(),
    }
}

/// Moving-average width for a given sample rate, never below 3 samples.
pub fn smoothing_width(sample_rate: f64) -> usize {
    ((sample_rate / 10.0).floor().max(0.0) as usize).max(3)
}

pub fn remove_dc(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mean = mean(data);
    data.iter().map(|x| x - mean).collect()
}

/// Centred moving average; edge samples average only the neighbours that exist.
pub fn centred_moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let back = win / 2;
    let ahead = win - 1 - back;
    let mut prefix = Vec::with_capacity(data.len() + 1);
    let mut acc = 0.0;
    prefix.push(acc);
    for &x in data {
        acc += x;
        prefix.push(acc);
    }
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(back);
            let end = (i + ahead).min(data.len() - 1);
            (prefix[end + 1] - prefix[start]) / (end + 1 - start) as f64
        })
        .collect()
}

pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}
