//! Synthetic fingertip brightness traces for tests and offline replay.

use crate::signal::{FrameReading, Sample};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub bpm: f64,
    pub duration_ms: i64,
    pub fps: f64,
    /// Mean brightness of a covered, torch-lit lens.
    pub baseline: f64,
    /// Pulsatile amplitude in brightness units.
    pub amplitude: f64,
    /// Half-width of uniform noise as a fraction of `amplitude`.
    pub noise: f64,
    /// Relative weight of the second harmonic (dicrotic shape); 0 is a pure sinusoid.
    pub harmonic: f64,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            bpm: 72.0,
            duration_ms: 20_000,
            fps: 30.0,
            baseline: 120.0,
            amplitude: 3.0,
            noise: 0.0,
            harmonic: 0.0,
            seed: 0,
        }
    }
}

pub fn synthetic_samples(cfg: &SynthConfig) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let count = (cfg.duration_ms as f64 * cfg.fps / 1000.0).floor().max(0.0) as usize;
    let freq_hz = cfg.bpm / 60.0;
    let noise = cfg.noise.abs() * cfg.amplitude;
    (0..count)
        .map(|i| {
            let timestamp_ms = (i as f64 * 1000.0 / cfg.fps).round() as i64;
            let t = timestamp_ms as f64 / 1000.0;
            let phase = 2.0 * PI * freq_hz * t;
            let mut v = cfg.baseline + cfg.amplitude * (phase.sin() + cfg.harmonic * (2.0 * phase).sin());
            if noise > 0.0 {
                v += rng.gen_range(-noise..=noise);
            }
            Sample::new(timestamp_ms, v)
        })
        .collect()
}

/// Same trace as [`synthetic_samples`], wrapped as camera frames with the
/// native finger flag set.
pub fn synthetic_frames(cfg: &SynthConfig) -> Vec<FrameReading> {
    synthetic_samples(cfg)
        .into_iter()
        .map(|s| FrameReading {
            timestamp_ms: s.timestamp_ms,
            brightness: s.brightness,
            finger_detected: true,
        })
        .collect()
}
