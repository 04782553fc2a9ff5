pub mod autocorr;
pub mod peaks;
pub mod spectral;

use crate::conditioning::ConditionedWindow;
use crate::signal::RateEstimate;
use serde::{Deserialize, Serialize};

pub use autocorr::AutocorrelationSearch;
pub use peaks::{PeakAnalysis, PeakDetector};
pub use spectral::SpectralScan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Spectral,
    Autocorrelation,
    PeakDetection,
}

/// Shared contract of the heart-rate strategies: a pure function of the
/// conditioned window.
pub trait RateEstimator {
    fn method(&self) -> Method;
    fn estimate(&self, window: &ConditionedWindow) -> RateEstimate;
}

/// Raw outputs of all three strategies over one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimates {
    pub spectral: RateEstimate,
    pub autocorrelation: RateEstimate,
    pub peaks: PeakAnalysis,
}

impl Estimates {
    /// Every method's rate estimate, in fusion preference order.
    pub fn ordered(&self) -> [(Method, RateEstimate); 3] {
        [
            (Method::Spectral, self.spectral),
            (Method::Autocorrelation, self.autocorrelation),
            (Method::PeakDetection, self.peaks.estimate),
        ]
    }
}

/// The strategy set run on every analysis pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatorSet {
    pub spectral: SpectralScan,
    pub autocorrelation: AutocorrelationSearch,
    pub peaks: PeakDetector,
}

impl EstimatorSet {
    pub fn run(&self, window: &ConditionedWindow) -> Estimates {
        Estimates {
            spectral: self.spectral.estimate(window),
            autocorrelation: self.autocorrelation.estimate(window),
            peaks: self.peaks.analyze(window),
        }
    }
}

pub fn estimate_all(window: &ConditionedWindow) -> Estimates {
    EstimatorSet::default().run(window)
}
