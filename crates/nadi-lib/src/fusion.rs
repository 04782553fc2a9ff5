use crate::detectors::{Estimates, Method};
use crate::signal::{in_band, Quality, RateEstimate, MAX_BPM, MIN_BPM};
use log::debug;
use serde::{Deserialize, Serialize};

/// Confidence a frequency-domain estimate needs to be selected.
pub const MIN_SELECT_CONFIDENCE: f64 = 0.3;
/// Confidence above which a selected frequency-domain estimate is graded good.
pub const GOOD_CONFIDENCE: f64 = 0.6;
/// Wider band accepted by the last-resort average.
pub const FALLBACK_BAND: (f64, f64) = (40.0, 200.0);
/// HRV reported when only the fallback average is available.
pub const FALLBACK_HRV_MS: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionSource {
    Spectral,
    Autocorrelation,
    PeakDetection,
    Fallback,
    Failed,
}

impl From<Method> for FusionSource {
    fn from(method: Method) -> Self {
        match method {
            Method::Spectral => FusionSource::Spectral,
            Method::Autocorrelation => FusionSource::Autocorrelation,
            Method::PeakDetection => FusionSource::PeakDetection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    pub heart_rate_bpm: f64,
    pub confidence: f64,
    pub quality: Quality,
    pub hrv_ms: f64,
    pub source: FusionSource,
}

impl FusedEstimate {
    pub fn failed() -> Self {
        Self {
            heart_rate_bpm: 0.0,
            confidence: 0.0,
            quality: Quality::Poor,
            hrv_ms: 0.0,
            source: FusionSource::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.source == FusionSource::Failed
    }

    pub fn as_rate_estimate(&self) -> RateEstimate {
        RateEstimate::new(self.heart_rate_bpm, self.confidence)
    }
}

/// Combine the three strategies. The first satisfied rule wins:
/// spectral, autocorrelation, peak detection, then the fallback average.
pub fn fuse(estimates: &Estimates) -> FusedEstimate {
    if let Some(fused) = select_frequency_domain(estimates.spectral, 20.0, 40.0, Method::Spectral) {
        return fused;
    }
    if let Some(fused) = select_frequency_domain(
        estimates.autocorrelation,
        25.0,
        35.0,
        Method::Autocorrelation,
    ) {
        return fused;
    }

    let peaks = &estimates.peaks;
    if in_band(peaks.estimate.heart_rate_bpm, MIN_BPM, MAX_BPM) {
        debug!(
            "fusion: peak detection {:.1} bpm ({:?})",
            peaks.estimate.heart_rate_bpm, peaks.quality
        );
        return FusedEstimate {
            heart_rate_bpm: peaks.estimate.heart_rate_bpm,
            confidence: peaks.estimate.confidence,
            quality: peaks.quality,
            hrv_ms: peaks.hrv_ms,
            source: FusionSource::PeakDetection,
        };
    }

    fallback_average(estimates)
}

/// HRV here is a proxy derived from confidence, `base + (1 - c) * span`.
fn select_frequency_domain(
    est: RateEstimate,
    hrv_base_ms: f64,
    hrv_span_ms: f64,
    method: Method,
) -> Option<FusedEstimate> {
    if est.confidence <= MIN_SELECT_CONFIDENCE || !est.in_band() {
        return None;
    }
    let quality = if est.confidence > GOOD_CONFIDENCE {
        Quality::Good
    } else {
        Quality::Fair
    };
    debug!(
        "fusion: {:?} {:.1} bpm at confidence {:.2}",
        method, est.heart_rate_bpm, est.confidence
    );
    Some(FusedEstimate {
        heart_rate_bpm: est.heart_rate_bpm,
        confidence: est.confidence,
        quality,
        hrv_ms: hrv_base_ms + (1.0 - est.confidence.min(1.0)) * hrv_span_ms,
        source: method.into(),
    })
}

fn fallback_average(estimates: &Estimates) -> FusedEstimate {
    let plausible: Vec<RateEstimate> = estimates
        .ordered()
        .iter()
        .map(|(_, est)| *est)
        .filter(|est| in_band(est.heart_rate_bpm, FALLBACK_BAND.0, FALLBACK_BAND.1))
        .collect();
    if plausible.is_empty() {
        debug!("fusion: no plausible estimate");
        return FusedEstimate::failed();
    }
    let n = plausible.len() as f64;
    let bpm = plausible.iter().map(|e| e.heart_rate_bpm).sum::<f64>() / n;
    let confidence = plausible.iter().map(|e| e.confidence.clamp(0.0, 1.0)).sum::<f64>() / n;
    debug!("fusion: fallback average {:.1} bpm over {} estimates", bpm, plausible.len());
    FusedEstimate {
        heart_rate_bpm: bpm,
        confidence,
        quality: Quality::Poor,
        hrv_ms: FALLBACK_HRV_MS,
        source: FusionSource::Fallback,
    }
}
