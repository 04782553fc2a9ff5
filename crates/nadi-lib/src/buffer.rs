use crate::error::BufferError;
use crate::signal::Sample;
use std::collections::VecDeque;

pub const DEFAULT_WINDOW_MS: i64 = 30_000;

/// Time-windowed ring of samples. Single writer, single reader: callers
/// serialise access.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    window_ms: i64,
    samples: VecDeque<Sample>,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl SampleBuffer {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::with_capacity(1024),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Append a sample and evict everything older than `newest - window_ms`.
    /// Out-of-order and non-finite samples are rejected.
    pub fn insert(&mut self, sample: Sample) -> Result<(), BufferError> {
        if !sample.brightness.is_finite() {
            return Err(BufferError::NonFinite {
                timestamp_ms: sample.timestamp_ms,
            });
        }
        if let Some(newest) = self.samples.back() {
            if sample.timestamp_ms < newest.timestamp_ms {
                return Err(BufferError::OutOfOrder {
                    timestamp_ms: sample.timestamp_ms,
                    newest_ms: newest.timestamp_ms,
                });
            }
        }
        self.samples.push_back(sample);
        let cutoff = sample.timestamp_ms - self.window_ms;
        while let Some(front) = self.samples.front() {
            if front.timestamp_ms < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// The most recent `max_count` samples in chronological order.
    pub fn snapshot(&self, max_count: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(max_count);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Time covered by the buffered samples (ms).
    pub fn span_ms(&self) -> i64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }
}
