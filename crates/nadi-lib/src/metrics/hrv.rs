use crate::signal::IntervalSeries;
use serde::{Deserialize, Serialize};

/// Time-domain statistics over inter-beat intervals (milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalStats {
    pub n: usize,
    pub mean_ms: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub pnn50: f64,
    /// Coefficient of variation (sdnn / mean).
    pub cv: f64,
}

pub fn interval_stats(series: &IntervalSeries) -> IntervalStats {
    let iv = &series.intervals_ms;
    let n = iv.len();
    let mean_ms = if n > 0 {
        iv.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let sdnn_ms = if n > 1 {
        (iv.iter().map(|x| (x - mean_ms).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let rmssd_ms = if n > 1 {
        let diffs = iv.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = iv.windows(2).filter(|w| (w[1] - w[0]).abs() > 50.0).count();
        count as f64 / (n as f64 - 1.0)
    } else {
        0.0
    };
    let cv = if mean_ms > 0.0 { sdnn_ms / mean_ms } else { 0.0 };

    IntervalStats {
        n,
        mean_ms,
        sdnn_ms,
        rmssd_ms,
        pnn50,
        cv,
    }
}

/// Beat-to-beat regularity in [0,1]: `1 - cv`, or `None` with fewer than two intervals.
pub fn regularity(series: &IntervalSeries) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    Some((1.0 - interval_stats(series).cv).clamp(0.0, 1.0))
}
