use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    #[error("sample at {timestamp_ms} ms is older than newest buffered sample at {newest_ms} ms")]
    OutOfOrder { timestamp_ms: i64, newest_ms: i64 },
    #[error("sample at {timestamp_ms} ms has non-finite brightness")]
    NonFinite { timestamp_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("min_usable_samples ({usable}) must not exceed min_pipeline_samples ({pipeline})")]
    SampleThresholds { usable: usize, pipeline: usize },
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("window_ms ({window_ms}) must cover the session duration ({duration_ms})")]
    WindowTooShort { window_ms: i64, duration_ms: i64 },
}
