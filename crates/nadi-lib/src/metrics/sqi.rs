use crate::conditioning::ConditionedWindow;
use crate::detectors::peaks::median;
use crate::detectors::spectral::{SpectralBin, SpectralScan};
use crate::metrics::hrv::interval_stats;
use crate::signal::IntervalSeries;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Robust z-score above which a sample counts as a motion artefact.
pub const ARTEFACT_Z: f64 = 3.5;

/// Signal-quality indicators over a conditioned window. Reported alongside
/// measured results; nothing is gated on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Power at the pulse frequency over the rest of the cardiac band.
    pub snr: f64,
    /// Shannon entropy of the cardiac-band spectrum, normalised to [0,1].
    pub spectral_entropy: f64,
    /// Fraction of samples flagged as artefacts.
    pub spike_ratio: f64,
    pub interval_cv: f64,
}

pub fn evaluate_sqi(
    window: &ConditionedWindow,
    intervals: &IntervalSeries,
    heart_rate_bpm: f64,
) -> SignalQuality {
    let scan = SpectralScan::default();
    SignalQuality {
        snr: cardiac_snr(&scan.spectrum(window), heart_rate_bpm / 60.0),
        spectral_entropy: band_entropy(window, scan.min_hz, scan.max_hz),
        spike_ratio: artefact_ratio(&window.values),
        interval_cv: interval_stats(intervals).cv,
    }
}

/// Power of the bins within one step of `pulse_hz` over the power of every
/// other scanned bin.
pub fn cardiac_snr(bins: &[SpectralBin], pulse_hz: f64) -> f64 {
    let centre = match bins
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (a.freq_hz - pulse_hz)
                .abs()
                .total_cmp(&(b.freq_hz - pulse_hz).abs())
        })
        .map(|(i, _)| i)
    {
        Some(i) => i,
        None => return 0.0,
    };
    let (mut pulse, mut rest) = (0.0, 0.0);
    for (i, bin) in bins.iter().enumerate() {
        let power = bin.magnitude * bin.magnitude;
        if i.abs_diff(centre) <= 1 {
            pulse += power;
        } else {
            rest += power;
        }
    }
    if !pulse.is_finite() || pulse <= 0.0 {
        return 0.0;
    }
    pulse / rest.max(1e-12)
}

/// Entropy of the FFT power between `min_hz` and `max_hz`, divided by the
/// entropy of a flat spectrum over the same bins. A pure pulse is near 0.
pub fn band_entropy(window: &ConditionedWindow, min_hz: f64, max_hz: f64) -> f64 {
    let n = window.len();
    if n < 2 || window.sample_rate <= 0.0 {
        return 0.0;
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut input = window.values.clone();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut input, &mut spectrum).is_err() {
        return 0.0;
    }
    let resolution = window.sample_rate / n as f64;
    let powers: Vec<f64> = spectrum
        .iter()
        .enumerate()
        .filter(|(k, _)| (min_hz..=max_hz).contains(&(*k as f64 * resolution)))
        .map(|(_, c)| c.norm_sqr())
        .collect();
    let total: f64 = powers.iter().sum();
    if powers.len() < 2 || !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = powers
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| {
            let q = p / total;
            -q * q.ln()
        })
        .sum();
    entropy / (powers.len() as f64).ln()
}

/// Fraction of samples whose robust z-score (median / scaled MAD) exceeds
/// [`ARTEFACT_Z`]. A steady pulse never gets near the threshold.
pub fn artefact_ratio(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let centre = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - centre).abs()).collect();
    let mad = 1.4826 * median(&deviations);
    if mad <= f64::EPSILON {
        return 0.0;
    }
    let flagged = deviations.iter().filter(|d| **d / mad > ARTEFACT_Z).count();
    flagged as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::condition;
    use crate::synth::{synthetic_samples, SynthConfig};

    fn noisy() -> ConditionedWindow {
        condition(
            &synthetic_samples(&SynthConfig {
                noise: 2.0,
                seed: 3,
                ..SynthConfig::default()
            }),
            30.0,
        )
    }

    #[test]
    fn clean_pulse_is_concentrated_in_band() {
        let clean = condition(&synthetic_samples(&SynthConfig::default()), 30.0);
        let noisy = noisy();
        let a = band_entropy(&clean, 0.7, 3.5);
        let b = band_entropy(&noisy, 0.7, 3.5);
        assert!(a < b, "clean entropy {a} should be below noisy {b}");
        assert!((0.0..=1.0).contains(&b));

        let scan = SpectralScan::default();
        let clean_snr = cardiac_snr(&scan.spectrum(&clean), 1.2);
        let noisy_snr = cardiac_snr(&scan.spectrum(&noisy), 1.2);
        assert!(clean_snr > noisy_snr, "{clean_snr} vs {noisy_snr}");
        assert!(clean_snr > 10.0);
    }

    #[test]
    fn snr_drops_when_measured_off_the_pulse() {
        let clean = condition(&synthetic_samples(&SynthConfig::default()), 30.0);
        let bins = SpectralScan::default().spectrum(&clean);
        assert!(cardiac_snr(&bins, 1.2) > 10.0 * cardiac_snr(&bins, 2.5));
    }

    #[test]
    fn single_spike_is_flagged() {
        let mut values: Vec<f64> = (0..600)
            .map(|i| (2.0 * std::f64::consts::PI * 1.2 * i as f64 / 30.0).sin())
            .collect();
        assert_eq!(artefact_ratio(&values), 0.0);
        values[300] = 40.0;
        assert_eq!(artefact_ratio(&values), 1.0 / 600.0);
    }

    #[test]
    fn flat_trace_has_no_artefacts_or_entropy() {
        let flat = vec![0.0; 32];
        assert_eq!(artefact_ratio(&flat), 0.0);
        let window = ConditionedWindow {
            sample_rate: 30.0,
            values: flat,
            timestamps_ms: (0..32).map(|i| i * 33).collect(),
        };
        assert_eq!(band_entropy(&window, 0.7, 3.5), 0.0);
    }

    #[test]
    fn regular_intervals_have_zero_cv() {
        let window = condition(&synthetic_samples(&SynthConfig::default()), 30.0);
        let sqi = evaluate_sqi(
            &window,
            &IntervalSeries {
                intervals_ms: vec![833.0; 5],
            },
            72.0,
        );
        assert_eq!(sqi.interval_cv, 0.0);
        assert!(sqi.snr > 1.0);
        assert_eq!(sqi.spike_ratio, 0.0);
    }
}
