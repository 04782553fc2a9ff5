use crate::buffer::SampleBuffer;
use crate::conditioning::condition;
use crate::config::SessionConfig;
use crate::detectors::EstimatorSet;
use crate::dosha::{classify, DoshaScore, PulseMetrics};
use crate::error::ConfigError;
use crate::fusion::{fuse, FusedEstimate, FusionSource};
use crate::metrics::{evaluate_sqi, regularity, SignalQuality};
use crate::signal::{FrameReading, Quality, RateEstimate, Sample};
use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// HRV centre and jitter half-width of a synthetic estimate (ms).
const SYNTHETIC_HRV_MS: (f64, f64) = (40.0, 10.0);
const SYNTHETIC_PULSE_STRENGTH: f64 = 0.7;
const SYNTHETIC_REGULARITY: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Measuring,
    Completed,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateReason {
    /// Enough samples to report, too few for the estimation pipeline.
    SparseSignal,
    /// Every completion attempt lacked usable samples.
    RetryBudgetExhausted,
    /// The pipeline ran but no method produced a plausible rate.
    FusionFailed,
}

/// Whether the reported metrics came from the signal or from policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Measured,
    Estimated { reason: EstimateReason },
}

impl Provenance {
    pub fn is_measured(&self) -> bool {
        matches!(self, Provenance::Measured)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub metrics: Option<PulseMetrics>,
    pub dosha: Option<DoshaScore>,
    pub provenance: Option<Provenance>,
    /// Grade of the measured signal; absent for synthetic results.
    pub quality: Option<Quality>,
    pub source: Option<FusionSource>,
    pub signal_quality: Option<SignalQuality>,
    pub sample_count: usize,
    /// Failed attempts so far; 0 once a session completes.
    pub attempt: u32,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}

/// One finger-over-camera measurement. All time is supplied by the caller, so
/// the session holds no clocks or threads and independent sessions never
/// interact.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    config: SessionConfig,
    estimators: EstimatorSet,
    state: SessionState,
    buffer: SampleBuffer,
    started_at_ms: Option<i64>,
    last_analysis_ms: Option<i64>,
    live: RateEstimate,
    last_live_bpm: Option<f64>,
    attempts: u32,
    finger_present: bool,
    dropped_samples: usize,
    rng: StdRng,
}

impl Default for MeasurementSession {
    fn default() -> Self {
        Self::build(SessionConfig::default())
    }
}

impl MeasurementSession {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SessionConfig) -> Self {
        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            buffer: SampleBuffer::new(config.window_ms),
            config,
            estimators: EstimatorSet::default(),
            state: SessionState::Idle,
            started_at_ms: None,
            last_analysis_ms: None,
            live: RateEstimate::none(),
            last_live_bpm: None,
            attempts: 0,
            finger_present: false,
            dropped_samples: 0,
            rng,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn finger_present(&self) -> bool {
        self.finger_present
    }

    /// Samples rejected for arriving out of order.
    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples
    }

    /// Clear buffered state and open a new capture window at `now_ms`.
    pub fn start_session(&mut self, now_ms: i64) {
        self.clear_measurement();
        self.started_at_ms = Some(now_ms);
        self.state = SessionState::Measuring;
        info!(
            "session started at {} ms (attempt {} of {})",
            now_ms,
            self.attempts + 1,
            self.config.max_attempts
        );
    }

    /// Buffer one sample. No-op unless measuring.
    pub fn ingest(&mut self, brightness: f64, timestamp_ms: i64) {
        if self.state != SessionState::Measuring {
            return;
        }
        if let Err(err) = self.buffer.insert(Sample::new(timestamp_ms, brightness)) {
            self.dropped_samples += 1;
            warn!("dropping sample: {}", err);
        }
    }

    /// Buffer a camera frame when a finger is effectively present.
    pub fn ingest_frame(&mut self, frame: FrameReading) {
        if self.state != SessionState::Measuring {
            return;
        }
        let present = frame.finger_present(self.config.finger_brightness_threshold);
        if present != self.finger_present {
            debug!("finger presence changed to {} at {} ms", present, frame.timestamp_ms);
        }
        self.finger_present = present;
        if present {
            self.ingest(frame.brightness, frame.timestamp_ms);
        }
    }

    pub fn is_window_elapsed(&self, now_ms: i64) -> bool {
        self.remaining_ms(now_ms) == 0 && self.started_at_ms.is_some()
    }

    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        match self.started_at_ms {
            Some(start) => (start + self.config.duration_ms - now_ms).max(0),
            None => self.config.duration_ms,
        }
    }

    /// Run the periodic live analysis if the cadence has elapsed since the
    /// last pass. Returns the refreshed estimate when one was computed.
    pub fn tick(&mut self, now_ms: i64) -> Option<RateEstimate> {
        if self.state != SessionState::Measuring {
            return None;
        }
        if let Some(last) = self.last_analysis_ms {
            if now_ms - last < self.config.analysis_interval_ms {
                return None;
            }
        }
        self.last_analysis_ms = Some(now_ms);
        self.refresh_live();
        Some(self.live)
    }

    /// Estimate from the most recent analysis pass; stable between ticks.
    pub fn current_live_estimate(&self) -> RateEstimate {
        self.live
    }

    fn refresh_live(&mut self) {
        let samples = self.buffer.snapshot(self.config.live_max_samples);
        let window = condition(&samples, self.config.nominal_sample_rate_hz);
        let fused = fuse(&self.estimators.run(&window));
        if fused.is_failed() {
            self.live = RateEstimate::none();
        } else {
            self.live = fused.as_rate_estimate();
            self.last_live_bpm = Some(fused.heart_rate_bpm);
        }
        debug!(
            "live estimate over {} samples: {:.1} bpm ({:?}, confidence {:.2})",
            samples.len(),
            self.live.heart_rate_bpm,
            fused.source,
            self.live.confidence
        );
    }

    /// Close the capture window and report. A completed outcome always
    /// carries metrics and a dosha score.
    ///
    /// Only a capture that was started counts against the retry budget; an
    /// idle or already completed session reports InsufficientData unchanged.
    pub fn complete_session(&mut self) -> SessionOutcome {
        let count = self.buffer.len();
        if !matches!(
            self.state,
            SessionState::Measuring | SessionState::InsufficientData
        ) {
            warn!("complete_session while {:?}: no capture to close", self.state);
            return self.without_metrics(SessionState::InsufficientData);
        }
        if count < self.config.min_usable_samples {
            self.attempts += 1;
            if self.attempts >= self.config.max_attempts {
                warn!(
                    "{} samples after {} attempts: forcing a synthetic estimate",
                    count, self.attempts
                );
                return self.complete_estimated(EstimateReason::RetryBudgetExhausted);
            }
            self.state = SessionState::InsufficientData;
            info!(
                "insufficient data: {} samples (attempt {} of {})",
                count, self.attempts, self.config.max_attempts
            );
            return self.without_metrics(self.state);
        }
        if count < self.config.min_pipeline_samples {
            warn!("only {} samples: reporting a synthetic estimate", count);
            return self.complete_estimated(EstimateReason::SparseSignal);
        }
        self.complete_measured()
    }

    fn without_metrics(&self, state: SessionState) -> SessionOutcome {
        SessionOutcome {
            state,
            metrics: None,
            dosha: None,
            provenance: None,
            quality: None,
            source: None,
            signal_quality: None,
            sample_count: self.buffer.len(),
            attempt: self.attempts,
        }
    }

        fn complete_measured(&mut self) -> SessionOutcome {
        let samples = self.buffer.snapshot(usize::MAX);
        let window = condition(&samples, self.config.nominal_sample_rate_hz);
        let estimates = self.estimators.run(&window);
        let fused = fuse(&estimates);
        if fused.is_failed() {
            warn!("no plausible rate from {} samples", samples.len());
            return self.complete_estimated(EstimateReason::FusionFailed);
        }

        let metrics = measured_metrics(&fused, regularity(&estimates.peaks.intervals));
        let dosha = classify(&metrics);
        self.finish();
        info!(
            "session completed: {} bpm, hrv {:.1} ms via {:?} ({:?})",
            metrics.heart_rate_bpm, metrics.hrv_ms, fused.source, fused.quality
        );
        SessionOutcome {
            state: self.state,
            metrics: Some(metrics),
            dosha: Some(dosha),
            provenance: Some(Provenance::Measured),
            quality: Some(fused.quality),
            source: Some(fused.source),
            signal_quality: Some(evaluate_sqi(
                &window,
                &estimates.peaks.intervals,
                fused.heart_rate_bpm,
            )),
            sample_count: samples.len(),
            attempt: 0,
        }
    }

    fn complete_estimated(&mut self, reason: EstimateReason) -> SessionOutcome {
        let metrics = self.synthetic_metrics();
        let dosha = classify(&metrics);
        let sample_count = self.buffer.len();
        self.finish();
        info!(
            "session completed with estimate ({:?}): {} bpm",
            reason, metrics.heart_rate_bpm
        );
        SessionOutcome {
            state: self.state,
            metrics: Some(metrics),
            dosha: Some(dosha),
            provenance: Some(Provenance::Estimated { reason }),
            quality: None,
            source: None,
            signal_quality: None,
            sample_count,
            attempt: 0,
        }
    }

    /// Policy fallback: anchored to the last live reading when there is one,
    /// otherwise the default rate with uniform jitter.
    fn synthetic_metrics(&mut self) -> PulseMetrics {
        let bpm = match self.last_live_bpm {
            Some(bpm) => bpm,
            None => self.config.default_bpm + self.jitter(self.config.bpm_jitter),
        };
        let hrv_ms = SYNTHETIC_HRV_MS.0 + self.jitter(SYNTHETIC_HRV_MS.1);
        PulseMetrics {
            heart_rate_bpm: bpm.round().max(0.0) as u32,
            hrv_ms,
            pulse_strength: SYNTHETIC_PULSE_STRENGTH,
            regularity: SYNTHETIC_REGULARITY,
        }
    }

    fn jitter(&mut self, half_width: f64) -> f64 {
        if half_width > 0.0 {
            self.rng.gen_range(-half_width..=half_width)
        } else {
            0.0
        }
    }

    fn finish(&mut self) {
        self.state = SessionState::Completed;
        self.attempts = 0;
    }

    /// Discard buffered state and return to idle.
    pub fn reset_session(&mut self, preserve_retry_count: bool) {
        self.clear_measurement();
        self.started_at_ms = None;
        self.state = SessionState::Idle;
        if !preserve_retry_count {
            self.attempts = 0;
        }
        info!("session reset (attempts kept: {})", self.attempts);
    }

    fn clear_measurement(&mut self) {
        self.buffer.clear();
        self.last_analysis_ms = None;
        self.live = RateEstimate::none();
        self.last_live_bpm = None;
        self.finger_present = false;
        self.dropped_samples = 0;
    }
}

/// Metrics from a successful fusion. Strength comes from the selected
/// method's confidence when it has a spectral meaning, otherwise from the grade.
fn measured_metrics(fused: &FusedEstimate, regularity: Option<f64>) -> PulseMetrics {
    let pulse_strength = match fused.source {
        FusionSource::Spectral | FusionSource::Autocorrelation => fused.confidence.clamp(0.0, 1.0),
        _ => fused.quality.score(),
    };
    PulseMetrics {
        heart_rate_bpm: fused.heart_rate_bpm.round().max(0.0) as u32,
        hrv_ms: fused.hrv_ms,
        pulse_strength,
        regularity: regularity.unwrap_or_else(|| fused.quality.score()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dosha::Dosha;
    use crate::synth::{synthetic_frames, synthetic_samples, SynthConfig};

    fn seeded() -> MeasurementSession {
        MeasurementSession::new(SessionConfig {
            jitter_seed: Some(5),
            ..SessionConfig::default()
        })
        .unwrap()
    }

    /// Feed samples and run the live analysis at the configured cadence.
    fn feed(session: &mut MeasurementSession, samples: &[Sample]) {
        for s in samples {
            session.ingest(s.brightness, s.timestamp_ms);
            session.tick(s.timestamp_ms);
        }
    }

    #[test]
    fn lifecycle_transitions() {
        let mut session = seeded();
        assert_eq!(session.state(), SessionState::Idle);
        session.ingest(100.0, 0);
        assert_eq!(session.sample_count(), 0);
        assert_eq!(session.tick(0), None);

        session.start_session(1_000);
        assert_eq!(session.state(), SessionState::Measuring);
        assert_eq!(session.remaining_ms(11_000), 10_000);
        assert!(!session.is_window_elapsed(20_999));
        assert!(session.is_window_elapsed(21_000));

        feed(&mut session, &synthetic_samples(&SynthConfig::default()));
        let outcome = session.complete_session();
        assert!(outcome.is_completed());
        session.ingest(100.0, 30_000);
        assert_eq!(session.sample_count(), 600);

        session.reset_session(false);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.sample_count(), 0);
        assert_eq!(session.current_live_estimate(), RateEstimate::none());
    }

    #[test]
    fn clean_72_bpm_end_to_end() {
        let samples = synthetic_samples(&SynthConfig::default());
        assert_eq!(samples.len(), 600);
        let mut session = seeded();
        session.start_session(0);
        feed(&mut session, &samples);
        assert!(session.is_window_elapsed(20_000));

        let outcome = session.complete_session();
        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.provenance, Some(Provenance::Measured));
        assert_eq!(outcome.quality, Some(Quality::Good));
        assert_eq!(outcome.source, Some(FusionSource::Spectral));
        let metrics = outcome.metrics.unwrap();
        assert!((69..=75).contains(&metrics.heart_rate_bpm), "{metrics:?}");
        assert!(metrics.regularity > 0.95);
        assert!(outcome.signal_quality.is_some());

        let dosha = outcome.dosha.unwrap();
        assert_eq!(dosha.dominant, Dosha::Kapha);
        assert_eq!(dosha.total(), 100);

        let mut again = seeded();
        again.start_session(0);
        feed(&mut again, &samples);
        assert_eq!(again.complete_session().dosha, Some(dosha));
    }

    #[test]
    fn retry_budget_then_forced_estimate() {
        let mut session = seeded();
        for attempt in 1..=2 {
            session.start_session(0);
            for i in 0..5 {
                session.ingest(120.0, i * 33);
            }
            let outcome = session.complete_session();
            assert_eq!(outcome.state, SessionState::InsufficientData);
            assert_eq!(outcome.attempt, attempt);
            assert!(outcome.metrics.is_none());
            session.reset_session(true);
        }
        session.start_session(0);
        let outcome = session.complete_session();
        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(
            outcome.provenance,
            Some(Provenance::Estimated {
                reason: EstimateReason::RetryBudgetExhausted
            })
        );
        let metrics = outcome.metrics.unwrap();
        assert!((69..=75).contains(&metrics.heart_rate_bpm));
        assert!(outcome.dosha.is_some());
        assert_eq!(session.attempts(), 0);
    }

    #[test]
    fn repeated_completion_without_restart_counts_attempts() {
        let mut session = seeded();
        session.start_session(0);
        session.ingest(120.0, 0);
        assert_eq!(session.complete_session().state, SessionState::InsufficientData);
        assert_eq!(session.complete_session().state, SessionState::InsufficientData);
        assert!(session.complete_session().is_completed());
    }

    #[test]
    fn reset_without_preserve_restores_full_budget() {
        let mut session = seeded();
        session.start_session(0);
        session.complete_session();
        session.complete_session();
        assert_eq!(session.attempts(), 2);
        session.reset_session(false);
        assert_eq!(session.attempts(), 0);
        session.start_session(0);
        assert_eq!(session.complete_session().state, SessionState::InsufficientData);
    }

    #[test]
    fn sparse_signal_without_live_reading_uses_default() {
        let mut session = seeded();
        session.start_session(0);
        for i in 0..20 {
            session.ingest(120.0, i * 33);
        }
        let outcome = session.complete_session();
        assert!(outcome.is_completed());
        assert_eq!(
            outcome.provenance,
            Some(Provenance::Estimated {
                reason: EstimateReason::SparseSignal
            })
        );
        let metrics = outcome.metrics.unwrap();
        assert!((69..=75).contains(&metrics.heart_rate_bpm));
        assert!((30.0..=50.0).contains(&metrics.hrv_ms));
        assert_eq!(metrics.pulse_strength, SYNTHETIC_PULSE_STRENGTH);
        assert_eq!(outcome.quality, None);
    }

    #[test]
    fn sparse_signal_anchors_to_live_reading() {
        // 29 frames at 10 fps: enough beats for peak picking, too few for the pipeline
        let samples = synthetic_samples(&SynthConfig {
            fps: 10.0,
            duration_ms: 2_900,
            ..SynthConfig::default()
        });
        assert_eq!(samples.len(), 29);
        let mut session = seeded();
        session.start_session(0);
        for s in &samples {
            session.ingest(s.brightness, s.timestamp_ms);
        }
        let live = session.tick(2_900).unwrap();
        assert!(live.in_band(), "{live:?}");

        let outcome = session.complete_session();
        let metrics = outcome.metrics.unwrap();
        assert_eq!(metrics.heart_rate_bpm, live.heart_rate_bpm.round() as u32);
    }

    #[test]
    fn live_estimate_is_idempotent_between_ticks() {
        let samples = synthetic_samples(&SynthConfig::default());
        let mut session = seeded();
        session.start_session(0);
        feed(&mut session, &samples[..300]);
        let first = session.current_live_estimate();
        let second = session.current_live_estimate();
        assert_eq!(first, second);
        assert!(first.is_usable());
        // a tick inside the cadence does not recompute
        let last_ts = samples[299].timestamp_ms;
        assert_eq!(session.tick(last_ts + 1), None);
        assert_eq!(session.current_live_estimate(), first);
    }

    #[test]
    fn live_analysis_follows_cadence() {
        let mut session = MeasurementSession::new(SessionConfig {
            analysis_interval_ms: 1_000,
            ..SessionConfig::default()
        })
        .unwrap();
        session.start_session(0);
        assert!(session.tick(0).is_some());
        assert!(session.tick(999).is_none());
        assert!(session.tick(1_000).is_some());
    }

    #[test]
    fn frames_without_finger_are_skipped() {
        let mut session = seeded();
        session.start_session(0);
        session.ingest_frame(FrameReading {
            timestamp_ms: 0,
            brightness: 20.0,
            finger_detected: false,
        });
        assert!(!session.finger_present());
        assert_eq!(session.sample_count(), 0);
        for frame in synthetic_frames(&SynthConfig::default()).into_iter().take(10) {
            session.ingest_frame(frame);
        }
        assert!(session.finger_present());
        assert_eq!(session.sample_count(), 10);
    }

    #[test]
    fn completing_an_idle_session_keeps_retry_budget() {
        let mut session = seeded();
        let outcome = session.complete_session();
        assert_eq!(outcome.state, SessionState::InsufficientData);
        assert!(outcome.metrics.is_none());
        assert_eq!(session.attempts(), 0);
        assert_eq!(session.state(), SessionState::Idle);

        session.start_session(0);
        feed(&mut session, &synthetic_samples(&SynthConfig::default()));
        assert!(session.complete_session().is_completed());
        let again = session.complete_session();
        assert_eq!(again.state, SessionState::InsufficientData);
        assert_eq!(session.attempts(), 0);
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[test]
    fn non_finite_samples_do_not_reach_the_estimate() {
        let mut session = seeded();
        session.start_session(0);
        feed(&mut session, &synthetic_samples(&SynthConfig::default()));
        session.ingest(f64::NAN, 19_990);
        session.ingest(f64::INFINITY, 19_995);
        assert_eq!(session.dropped_samples(), 2);
        assert_eq!(session.sample_count(), 600);

        let outcome = session.complete_session();
        assert_eq!(outcome.provenance, Some(Provenance::Measured));
        assert_eq!(outcome.source, Some(FusionSource::Spectral));
        let bpm = outcome.metrics.unwrap().heart_rate_bpm;
        assert!((69..=75).contains(&bpm), "bpm {bpm}");
    }

    #[test]
    fn out_of_order_samples_are_dropped() {
        let mut session = seeded();
        session.start_session(0);
        session.ingest(120.0, 100);
        session.ingest(121.0, 50);
        assert_eq!(session.sample_count(), 1);
        assert_eq!(session.dropped_samples(), 1);
    }

    #[test]
    fn flat_signal_falls_back_to_estimate() {
        let mut session = seeded();
        session.start_session(0);
        for i in 0..200 {
            session.ingest(90.0, i * 33);
        }
        let outcome = session.complete_session();
        assert!(outcome.is_completed());
        assert_eq!(
            outcome.provenance,
            Some(Provenance::Estimated {
                reason: EstimateReason::FusionFailed
            })
        );
    }

    #[test]
    fn sessions_are_independent() {
        let mut a = seeded();
        let mut b = seeded();
        a.start_session(0);
        b.start_session(0);
        feed(&mut a, &synthetic_samples(&SynthConfig::default()));
        assert_eq!(b.sample_count(), 0);
        assert_eq!(b.current_live_estimate(), RateEstimate::none());
    }

    #[test]
    fn rejects_invalid_config() {
        let err = MeasurementSession::new(SessionConfig {
            max_attempts: 0,
            ..SessionConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::NoAttempts);
    }

    #[test]
    fn outcome_serialises_tagged_provenance() {
        let mut session = seeded();
        session.start_session(0);
        for i in 0..12 {
            session.ingest(120.0, i * 33);
        }
        let outcome = session.complete_session();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["provenance"]["kind"], "estimated");
        assert_eq!(json["provenance"]["reason"], "sparse_signal");
        assert!(json["quality"].is_null());
        assert_eq!(json["sample_count"], 12);
    }
}
