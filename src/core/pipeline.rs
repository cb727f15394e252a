//! Per-session processing pipeline.
//!
//! Samples go into two window managers: short windows for cognitive load and
//! long windows for drowsiness. Each completed window is turned into
//! features, handed to the inference engine when one is installed, and
//! recorded as a [`SessionSnapshot`].
//!
//! Open windows are closed on the stream's own clock: the timestamp of the
//! newest sample plus the host time elapsed since it was drained. Device
//! clocks that run behind the host therefore never split a window early.

use crate::config::{Config, ConfigError};
use crate::core::features::{compute_features_in, GazeFeatures};
use crate::core::prediction::{
    primary_level, BatchPrediction, CogLoadUpdate, CognitiveLoadLevel, DrowsinessLevel,
    DrowsinessUpdate, InferenceEngine, Prediction,
};
use crate::core::snapshot::{SessionSnapshot, SnapshotBuilder};
use crate::core::windowing::{span, sliding_windows, InvalidSpan, SampleWindow, WindowManager};
use crate::device::GazeSample;
use crate::platform::Platform;
use crate::session::SharedSessionLog;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use uuid::Uuid;

/// Stride between consecutive offline cognitive load results.
pub const COG_LOAD_BATCH_STRIDE: Duration = Duration::from_secs(1);

/// Stream time allowed past a window's end before it is closed without a
/// later sample.
pub const EXPIRY_GRACE: Duration = Duration::from_secs(2);

/// Window and timing settings shared by streaming and offline processing.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cog_load_window: Duration,
    pub drowsiness_window: Duration,
    pub cog_load_warmup: Duration,
    pub session_gap_threshold_secs: u64,
    pub timezone: Tz,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cog_load_window: Duration::from_secs(5),
            drowsiness_window: Duration::from_secs(120),
            cog_load_warmup: Duration::from_secs(20),
            session_gap_threshold_secs: 30,
            timezone: Tz::UTC,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let settings = Self {
            cog_load_window: config.cog_load_window,
            drowsiness_window: config.drowsiness_window,
            cog_load_warmup: config.cog_load_warmup,
            session_gap_threshold_secs: config.session_gap_threshold_secs,
            timezone: config.tz()?,
        };
        settings.spans()?;
        Ok(settings)
    }

    /// Check that every window length and threshold can be used.
    pub fn validate(&self) -> Result<(), InvalidSpan> {
        self.spans().map(|_| ())
    }

    fn spans(&self) -> Result<Spans, InvalidSpan> {
        ChronoDuration::from_std(self.cog_load_warmup).map_err(|_| InvalidSpan {
            name: "cognitive load warmup",
            value: self.cog_load_warmup,
        })?;
        Ok(Spans {
            cog_load_window: span("cognitive load window", self.cog_load_window)?,
            drowsiness_window: span("drowsiness window", self.drowsiness_window)?,
            session_gap: span(
                "session gap threshold",
                Duration::from_secs(self.session_gap_threshold_secs),
            )?,
        })
    }
}

struct Spans {
    cog_load_window: ChronoDuration,
    drowsiness_window: ChronoDuration,
    session_gap: ChronoDuration,
}

/// Maps host time onto the timestamps of the incoming stream.
#[derive(Debug, Default)]
struct StreamClock {
    newest_sample: Option<DateTime<Utc>>,
    offset: Option<ChronoDuration>,
    fresh: bool,
}

impl StreamClock {
    fn observe(&mut self, timestamp: DateTime<Utc>) {
        if self.newest_sample.map_or(true, |newest| timestamp > newest) {
            self.newest_sample = Some(timestamp);
        }
        self.fresh = true;
    }

    /// Stream time corresponding to the host time `now`.
    fn now(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let newest = self.newest_sample?;
        if self.fresh || self.offset.is_none() {
            self.offset = Some(now.signed_duration_since(newest));
            self.fresh = false;
        }
        now.checked_sub_signed(self.offset?)
    }
}

/// Windowing, features and predictions for one streaming session.
pub struct Pipeline {
    settings: PipelineSettings,
    cog_windows: WindowManager,
    drowsy_windows: WindowManager,
    snapshots: SnapshotBuilder,
    cog_batch: u64,
    drowsy_batch: u64,
    latest_cog_load: Option<CogLoadUpdate>,
    latest_drowsiness: Option<DrowsinessUpdate>,
    latest_features: Option<GazeFeatures>,
    collected: Vec<SessionSnapshot>,
    clock: StreamClock,
    log: SharedSessionLog,
}

impl Pipeline {
    /// Create the pipeline for one session.
    ///
    /// Fails when a window length or the gap threshold is zero or too long
    /// to represent.
    pub fn new(
        session_id: Uuid,
        platform: Platform,
        settings: PipelineSettings,
        log: SharedSessionLog,
    ) -> Result<Self, InvalidSpan> {
        let spans = settings.spans()?;
        Ok(Self {
            cog_windows: WindowManager::new(spans.cog_load_window, spans.session_gap),
            drowsy_windows: WindowManager::new(spans.drowsiness_window, spans.session_gap),
            snapshots: SnapshotBuilder::new(session_id, platform),
            settings,
            cog_batch: 0,
            drowsy_batch: 0,
            latest_cog_load: None,
            latest_drowsiness: None,
            latest_features: None,
            collected: Vec::new(),
            clock: StreamClock::default(),
            log,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.snapshots.session_id()
    }

    pub fn push_sample(&mut self, sample: GazeSample) {
        self.clock.observe(sample.timestamp);
        self.cog_windows.process_sample(sample.clone());
        self.drowsy_windows.process_sample(sample);
    }

    /// Close windows the stream has moved past and process everything
    /// completed so far.
    ///
    /// `now` is the host time at which the queued samples were drained.
    pub fn process(&mut self, now: DateTime<Utc>, engine: Option<&mut dyn InferenceEngine>) {
        let grace = ChronoDuration::from_std(EXPIRY_GRACE).unwrap_or_default();
        let expired_before = self
            .clock
            .now(now)
            .and_then(|stream_now| stream_now.checked_sub_signed(grace));
        if let Some(expired_before) = expired_before {
            self.cog_windows.check_window_expiry(expired_before);
            self.drowsy_windows.check_window_expiry(expired_before);
        }
        self.process_completed(engine);
    }

    /// Flush partial windows and return every snapshot of the session.
    pub fn finish(&mut self, engine: Option<&mut dyn InferenceEngine>) -> Vec<SessionSnapshot> {
        self.cog_windows.flush();
        self.drowsy_windows.flush();
        self.process_completed(engine);
        std::mem::take(&mut self.collected)
    }

    pub fn latest_cog_load(&self) -> Option<&CogLoadUpdate> {
        self.latest_cog_load.as_ref()
    }

    pub fn latest_drowsiness(&self) -> Option<&DrowsinessUpdate> {
        self.latest_drowsiness.as_ref()
    }

    /// Features of the most recent cognitive load window.
    pub fn latest_features(&self) -> Option<&GazeFeatures> {
        self.latest_features.as_ref()
    }

    pub fn snapshot_count(&self) -> usize {
        self.collected.len()
    }

    fn process_completed(&mut self, mut engine: Option<&mut dyn InferenceEngine>) {
        for window in self.cog_windows.take_completed_windows() {
            self.cog_batch += 1;
            self.log.record_window_completed();

            let features = compute_features_in(&window, self.settings.timezone);
            let levels = match engine.as_mut() {
                Some(engine) => engine.cognitive_load(&features, window.end),
                None => None,
            };

            if let Some(ref levels) = levels {
                self.log.record_cog_load_prediction();
                if let Some(primary) = primary_level(levels) {
                    tracing::debug!(
                        batch = self.cog_batch,
                        level = %primary.level,
                        confidence = primary.confidence,
                        "Cognitive load window processed"
                    );
                }
                self.latest_cog_load = Some(CogLoadUpdate {
                    levels: levels.clone(),
                    batch: self.cog_batch,
                });
            }

            self.collected.push(self.snapshots.cognitive_load(
                self.cog_batch,
                &window,
                &features,
                levels,
            ));
            self.latest_features = Some(features);
        }

        for window in self.drowsy_windows.take_completed_windows() {
            self.drowsy_batch += 1;
            self.log.record_window_completed();

            let features = compute_features_in(&window, self.settings.timezone);
            let prediction = match engine.as_mut() {
                Some(engine) => engine.drowsiness(&features, window.end),
                None => None,
            };

            if let Some(ref prediction) = prediction {
                self.log.record_drowsiness_prediction();
                tracing::debug!(
                    batch = self.drowsy_batch,
                    level = %prediction.level,
                    "Drowsiness window processed"
                );
                self.latest_drowsiness = Some(DrowsinessUpdate {
                    prediction: prediction.clone(),
                    batch: self.drowsy_batch,
                });
            }

            self.collected.push(self.snapshots.drowsiness(
                self.drowsy_batch,
                &window,
                &features,
                prediction,
            ));
        }
    }
}

/// Cognitive load over a recording, one result per second after the warmup.
pub fn predict_cog_load_batch(
    samples: &[GazeSample],
    settings: &PipelineSettings,
    engine: &mut dyn InferenceEngine,
) -> Result<Vec<BatchPrediction<CognitiveLoadLevel>>, InvalidSpan> {
    let windows = sliding_windows(
        samples,
        settings.cog_load_window,
        COG_LOAD_BATCH_STRIDE,
        settings.cog_load_warmup,
    )?;

    Ok(run_batch(samples, &windows, settings.timezone, |features, at| {
        engine
            .cognitive_load(features, at)
            .and_then(|levels| primary_level(&levels).cloned())
    }))
}

/// Drowsiness over a recording, one result every `stride`.
///
/// The first result covers the first full drowsiness window.
pub fn predict_drowsiness_batch(
    samples: &[GazeSample],
    settings: &PipelineSettings,
    timezone: Tz,
    stride: Duration,
    engine: &mut dyn InferenceEngine,
) -> Result<Vec<BatchPrediction<DrowsinessLevel>>, InvalidSpan> {
    let windows = sliding_windows(
        samples,
        settings.drowsiness_window,
        stride,
        settings.drowsiness_window,
    )?;

    Ok(run_batch(samples, &windows, timezone, |features, at| {
        engine.drowsiness(features, at)
    }))
}

fn run_batch<L, F>(
    samples: &[GazeSample],
    windows: &[SampleWindow],
    timezone: Tz,
    mut predict: F,
) -> Vec<BatchPrediction<L>>
where
    F: FnMut(&GazeFeatures, DateTime<Utc>) -> Option<Prediction<L>>,
{
    // Offsets count from the earliest sample of the recording
    let origin = match samples.iter().map(|s| s.timestamp).min() {
        Some(first) => first,
        None => return Vec::new(),
    };

    let results: Vec<BatchPrediction<L>> = windows
        .iter()
        .filter_map(|window| {
            let features = compute_features_in(window, timezone);
            predict(&features, window.end).map(|prediction| BatchPrediction {
                offset_secs: (window.end - origin).num_milliseconds() as f64 / 1000.0,
                prediction,
            })
        })
        .collect();

    tracing::info!(
        windows = windows.len(),
        predictions = results.len(),
        "Batch prediction complete"
    );

    results
}
