use super::{Method, RateEstimator};
use crate::conditioning::ConditionedWindow;
use crate::signal::RateEstimate;
use std::f64::consts::PI;

/// Direct evaluation of a handful of DFT bins across the cardiac band.
///
/// Only ~57 bins are needed, so each one is correlated against its sine and
/// cosine basis directly instead of running a full FFT.
#[derive(Debug, Clone, Copy)]
pub struct SpectralScan {
    pub min_hz: f64,
    pub max_hz: f64,
    pub step_hz: f64,
    pub min_samples: usize,
    /// Peak-to-mean ratio that maps onto full confidence.
    pub confidence_normalizer: f64,
}

impl Default for SpectralScan {
    fn default() -> Self {
        Self {
            min_hz: 0.7,
            max_hz: 3.5,
            step_hz: 0.05,
            min_samples: 32,
            confidence_normalizer: 5.0,
        }
    }
}

/// Magnitude of one scanned frequency bin.
#[derive(Debug, Clone, Copy)]
pub struct SpectralBin {
    pub freq_hz: f64,
    pub magnitude: f64,
}

impl SpectralScan {
    pub fn bin_frequencies(&self) -> Vec<f64> {
        let steps = ((self.max_hz - self.min_hz) / self.step_hz + 1e-9).floor() as usize;
        (0..=steps)
            .map(|k| self.min_hz + k as f64 * self.step_hz)
            .collect()
    }

    /// Scan every bin. Time is taken from the sample timestamps so irregular
    /// frame delivery does not skew the basis.
    pub fn spectrum(&self, window: &ConditionedWindow) -> Vec<SpectralBin> {
        let times = sample_times_s(window);
        self.bin_frequencies()
            .into_iter()
            .map(|freq_hz| SpectralBin {
                freq_hz,
                magnitude: goertzel_magnitude(&window.values, &times, freq_hz),
            })
            .collect()
    }
}

impl RateEstimator for SpectralScan {
    fn method(&self) -> Method {
        Method::Spectral
    }

    fn estimate(&self, window: &ConditionedWindow) -> RateEstimate {
        if window.len() < self.min_samples {
            return RateEstimate::none();
        }
        let bins = self.spectrum(window);
        if bins.is_empty() {
            return RateEstimate::none();
        }
        let mut peak = bins[0];
        for bin in &bins[1..] {
            if bin.magnitude > peak.magnitude {
                peak = *bin;
            }
        }
        let mean = bins.iter().map(|b| b.magnitude).sum::<f64>() / bins.len() as f64;
        if mean <= 0.0 || !mean.is_finite() {
            return RateEstimate::none();
        }
        let confidence = (peak.magnitude / mean / self.confidence_normalizer).clamp(0.0, 1.0);
        RateEstimate::new(peak.freq_hz * 60.0, confidence).banded()
    }
}

fn sample_times_s(window: &ConditionedWindow) -> Vec<f64> {
    match window.timestamps_ms.first() {
        Some(&t0) if window.timestamps_ms.len() == window.values.len() => window
            .timestamps_ms
            .iter()
            .map(|&t| (t - t0) as f64 / 1000.0)
            .collect(),
        _ => {
            let dt = 1.0 / window.sample_rate.max(1.0);
            (0..window.values.len()).map(|i| i as f64 * dt).collect()
        }
    }
}

fn goertzel_magnitude(values: &[f64], times_s: &[f64], freq_hz: f64) -> f64 {
    let omega = 2.0 * PI * freq_hz;
    let mut re = 0.0;
    let mut im = 0.0;
    for (&x, &t) in values.iter().zip(times_s) {
        let phase = omega * t;
        re += x * phase.cos();
        im += x * phase.sin();
    }
    (re * re + im * im).sqrt()
}
