pub mod buffer;
pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod dosha;
pub mod error;
pub mod fusion;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod session;
pub mod signal;
pub mod synth;

pub use buffer::SampleBuffer;
pub use conditioning::{condition, ConditionedWindow};
pub use config::SessionConfig;
pub use detectors::{estimate_all, Estimates, Method, RateEstimator};
pub use dosha::{classify, Dosha, DoshaScore, PulseMetrics};
pub use error::{BufferError, ConfigError};
pub use fusion::{fuse, FusedEstimate, FusionSource};
pub use session::{EstimateReason, MeasurementSession, Provenance, SessionOutcome, SessionState};
pub use signal::*;
