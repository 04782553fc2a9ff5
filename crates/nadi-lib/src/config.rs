use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for one measurement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture window length (ms).
    pub duration_ms: i64,
    /// Cadence of live analysis while measuring (ms).
    pub analysis_interval_ms: i64,
    /// Retention of the sample buffer relative to the newest sample (ms).
    pub window_ms: i64,
    /// Rate assumed when the buffered timestamps span zero time.
    pub nominal_sample_rate_hz: f64,
    /// Below this many samples a completion counts as a failed attempt.
    pub min_usable_samples: usize,
    /// At or above this many samples the full estimation pipeline runs.
    pub min_pipeline_samples: usize,
    /// Completion attempts before a synthetic estimate is forced.
    pub max_attempts: u32,
    /// Synthetic heart rate when no live reading exists.
    pub default_bpm: f64,
    /// Half-width of the uniform jitter applied to the default rate.
    pub bpm_jitter: f64,
    pub finger_brightness_threshold: f64,
    /// Most recent samples considered by live analysis.
    pub live_max_samples: usize,
    /// Seed for synthetic-estimate jitter; entropy-seeded when absent.
    pub jitter_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_ms: 20_000,
            analysis_interval_ms: 500,
            window_ms: 30_000,
            nominal_sample_rate_hz: 30.0,
            min_usable_samples: 10,
            min_pipeline_samples: 30,
            max_attempts: 3,
            default_bpm: 72.0,
            bpm_jitter: 3.0,
            finger_brightness_threshold: 50.0,
            live_max_samples: 900,
            jitter_seed: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("duration_ms", self.duration_ms as f64)?;
        positive("analysis_interval_ms", self.analysis_interval_ms as f64)?;
        positive("window_ms", self.window_ms as f64)?;
        positive("nominal_sample_rate_hz", self.nominal_sample_rate_hz)?;
        positive("default_bpm", self.default_bpm)?;
        positive("live_max_samples", self.live_max_samples as f64)?;
        if self.min_usable_samples > self.min_pipeline_samples {
            return Err(ConfigError::SampleThresholds {
                usable: self.min_usable_samples,
                pipeline: self.min_pipeline_samples,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.window_ms < self.duration_ms {
            return Err(ConfigError::WindowTooShort {
                window_ms: self.window_ms,
                duration_ms: self.duration_ms,
            });
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: SessionConfig = toml::from_str(text).context("parsing session config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}
