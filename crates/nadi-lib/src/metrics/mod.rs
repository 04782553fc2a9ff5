pub mod hrv;
pub mod sqi;

pub use hrv::{interval_stats, regularity, IntervalStats};
pub use sqi::{evaluate_sqi, SignalQuality};
