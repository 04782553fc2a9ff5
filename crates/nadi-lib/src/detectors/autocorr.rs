use super::{Method, RateEstimator};
use crate::conditioning::{mean, ConditionedWindow};
use crate::signal::{RateEstimate, MAX_BPM, MIN_BPM};

/// Period search over the autocorrelation of the window, normalised by the
/// zero-lag energy so longer lags carry their natural taper.
#[derive(Debug, Clone, Copy)]
pub struct AutocorrelationSearch {
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub min_samples: usize,
    /// The shortest local maximum reaching this fraction of the strongest
    /// correlation is taken as the period, so subharmonics never win.
    pub peak_fraction: f64,
}

impl Default for AutocorrelationSearch {
    fn default() -> Self {
        Self {
            min_bpm: MIN_BPM,
            max_bpm: MAX_BPM,
            min_samples: 60,
            peak_fraction: 0.9,
        }
    }
}

impl AutocorrelationSearch {
    /// Inclusive lag range (samples) covering the heart-rate band.
    pub fn lag_range(&self, sample_rate: f64) -> (usize, usize) {
        let min_lag = ((sample_rate * 60.0 / self.max_bpm).floor() as usize).max(1);
        let max_lag = (sample_rate * 60.0 / self.min_bpm).ceil() as usize;
        (min_lag, max_lag)
    }
}

impl RateEstimator for AutocorrelationSearch {
    fn method(&self) -> Method {
        Method::Autocorrelation
    }

    fn estimate(&self, window: &ConditionedWindow) -> RateEstimate {
        let n = window.len();
        if n < self.min_samples || window.sample_rate <= 0.0 {
            return RateEstimate::none();
        }
        let mu = mean(&window.values);
        let centred: Vec<f64> = window.values.iter().map(|x| x - mu).collect();
        let energy: f64 = centred.iter().map(|x| x * x).sum();
        if !energy.is_finite() || energy <= f64::EPSILON {
            // degenerate: flat or corrupted input has no period
            return RateEstimate::none();
        }

        let spacing_ms = lag_spacing_ms(window);
        let (min_lag, max_lag) = self.lag_range(1000.0 / spacing_ms);
        let max_lag = max_lag.min(n - 2);
        if min_lag > max_lag {
            return RateEstimate::none();
        }

        let scores: Vec<f64> = (min_lag..=max_lag)
            .map(|lag| autocorrelation(&centred, lag, energy))
            .collect();
        let strongest = scores.iter().copied().fold(f64::MIN, f64::max);
        if strongest <= 0.0 {
            return RateEstimate::none();
        }
        let threshold = self.peak_fraction * strongest;
        let first_peak = (0..scores.len()).find(|&i| {
            let s = scores[i];
            s >= threshold
                && (i == 0 || scores[i - 1] <= s)
                && (i + 1 == scores.len() || scores[i + 1] <= s)
        });
        let idx = match first_peak {
            Some(idx) => idx,
            None => return RateEstimate::none(),
        };

        let lag = min_lag + idx;
        let centre = scores[idx];
        let (offset, local_max) = if lag >= 2 {
            let before = autocorrelation(&centred, lag - 1, energy);
            let after = autocorrelation(&centred, lag + 1, energy);
            (
                parabolic_offset(before, centre, after),
                before <= centre && after <= centre,
            )
        } else {
            (0.0, false)
        };

        let mut bpm = 60_000.0 / ((lag as f64 + offset) * spacing_ms);
        if local_max {
            // a true peak inside the searched lags is a band rate
            bpm = bpm.clamp(self.min_bpm, self.max_bpm);
        }
        RateEstimate::new(bpm, centre.max(0.0)).banded()
    }
}

/// Mean time between consecutive samples, the physical length of one lag.
fn lag_spacing_ms(window: &ConditionedWindow) -> f64 {
    let n = window.len();
    let span = window.duration_ms() as f64;
    if n > 1 && span > 0.0 {
        span / (n - 1) as f64
    } else {
        1000.0 / window.sample_rate
    }
}

/// Lag product summed over the overlap, relative to the zero-lag energy.
fn autocorrelation(centred: &[f64], lag: usize, energy: f64) -> f64 {
    let overlap = centred.len() - lag;
    let sum: f64 = centred[..overlap]
        .iter()
        .zip(&centred[lag..])
        .map(|(a, b)| a * b)
        .sum();
    sum / energy
}

/// Vertex of the parabola through three equally spaced points, in lags.
fn parabolic_offset(before: f64, centre: f64, after: f64) -> f64 {
    let curvature = before - 2.0 * centre + after;
    if curvature.abs() <= f64::EPSILON {
        return 0.0;
    }
    (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
}
