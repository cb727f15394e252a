//! The SDK handle.
//!
//! [`TheiaSdk`] binds a license key to a platform and its connection
//! settings. The expected call sequence is construct, configure (Ganzin
//! only), [`TheiaSdk::start_new_session`], [`TheiaSdk::start_realtime_data`],
//! then poll for predictions until [`TheiaSdk::stop_processing`].
//!
//! The handle is single-threaded. Device backends capture on their own
//! threads; samples are processed on the caller's thread during polling.

use crate::config::{Config, ConfigError};
use crate::core::{
    predict_cog_load_batch, predict_drowsiness_batch, span, BatchPrediction, CogLoadUpdate,
    CognitiveLoadLevel, DrowsinessLevel, DrowsinessUpdate, GazeFeatures, InferenceEngine,
    Pipeline, PipelineSettings, SessionSnapshot,
};
use crate::device::{open_source, GazeSample, GazeSource, SourceOptions};
use crate::error::{SdkError, SdkResult};
use crate::license::{resolve_license_key, FormatValidator, LicenseKey, LicenseValidator};
use crate::platform::{GanzinConfig, Platform, PlatformConfig};
use crate::session::{
    create_shared_log, create_shared_log_with_persistence, SessionStats, SharedSessionLog,
};
use chrono::Utc;
use chrono_tz::Tz;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Anything that names a platform: a [`Platform`] or its tag (`"PL"`, `"Ganzin"`).
pub trait PlatformSelector {
    fn into_platform(self) -> SdkResult<Platform>;
}

impl PlatformSelector for Platform {
    fn into_platform(self) -> SdkResult<Platform> {
        Ok(self)
    }
}

impl PlatformSelector for &str {
    fn into_platform(self) -> SdkResult<Platform> {
        self.parse()
    }
}

impl PlatformSelector for String {
    fn into_platform(self) -> SdkResult<Platform> {
        self.as_str().parse()
    }
}

/// Processing and transport settings applied to each session.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub pipeline: PipelineSettings,
    pub source: SourceOptions,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> SdkResult<Self> {
        Ok(Self {
            pipeline: PipelineSettings::from_config(config)?,
            source: SourceOptions {
                reconnect: config.reconnect,
                connect_timeout: config.connect_timeout,
            },
        })
    }
}

/// Caller-facing handle of the SDK.
pub struct TheiaSdk {
    license: LicenseKey,
    connection: PlatformConfig,
    settings: SessionSettings,
    engine: Option<Box<dyn InferenceEngine>>,
    session: Option<Pipeline>,
    source: Option<Box<dyn GazeSource>>,
    next_source: Option<Box<dyn GazeSource>>,
    dropped_seen: u64,
    log: SharedSessionLog,
}

impl TheiaSdk {
    /// Create a handle, checking the license key offline.
    ///
    /// Ganzin Sol starts with the default endpoint `192.168.1.100:8080`.
    pub fn new(license_key: &str, platform: impl PlatformSelector) -> SdkResult<Self> {
        Self::with_validator(license_key, platform, &FormatValidator)
    }

    /// Create a handle, checking the license key with `validator`.
    ///
    /// The license is checked before the platform.
    pub fn with_validator(
        license_key: &str,
        platform: impl PlatformSelector,
        validator: &dyn LicenseValidator,
    ) -> SdkResult<Self> {
        let license = LicenseKey::parse(license_key)?;
        validator.validate(&license)?;
        let platform = platform.into_platform()?;

        tracing::info!(%platform, license = %license, "Theia SDK initialized");

        Ok(Self::assemble(
            license,
            PlatformConfig::for_platform(platform),
            SessionSettings::default(),
            create_shared_log(),
        ))
    }

    /// Create a handle from the persisted configuration.
    ///
    /// The license key is taken from `license_override`, then
    /// `THEIA_LICENSE_KEY`, then the config file.
    pub fn from_config(config: &Config, license_override: Option<&str>) -> SdkResult<Self> {
        let raw = resolve_license_key(license_override, config.license_key.as_deref())
            .ok_or_else(|| SdkError::InvalidLicense("no license key provided".to_string()))?;
        let license = LicenseKey::parse(&raw)?;
        FormatValidator.validate(&license)?;

        let settings = SessionSettings::from_config(config)?;
        let log = create_shared_log_with_persistence(config.stats_path());

        tracing::info!(
            platform = %config.device.platform(),
            license = %license,
            "Theia SDK initialized from config"
        );

        Ok(Self::assemble(license, config.device.clone(), settings, log))
    }

    fn assemble(
        license: LicenseKey,
        connection: PlatformConfig,
        settings: SessionSettings,
        log: SharedSessionLog,
    ) -> Self {
        Self {
            license,
            connection,
            settings,
            engine: None,
            session: None,
            source: None,
            next_source: None,
            dropped_seen: 0,
            log,
        }
    }

    /// Install the inference engine used for predictions.
    pub fn with_engine(mut self, engine: Box<dyn InferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn set_engine(&mut self, engine: Box<dyn InferenceEngine>) {
        self.engine = Some(engine);
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_log(mut self, log: SharedSessionLog) -> Self {
        self.log = log;
        self
    }

    /// Use `source` instead of the platform backend for the next stream.
    pub fn with_source(mut self, source: Box<dyn GazeSource>) -> Self {
        self.next_source = Some(source);
        self
    }

    pub fn platform(&self) -> Platform {
        self.connection.platform()
    }

    pub fn connection(&self) -> &PlatformConfig {
        &self.connection
    }

    pub fn license_key(&self) -> &LicenseKey {
        &self.license
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn log(&self) -> &SharedSessionLog {
        &self.log
    }

    /// Counts of the current session. [`SessionLog::stats`] keeps the totals.
    ///
    /// [`SessionLog::stats`]: crate::session::SessionLog::stats
    pub fn session_stats(&self) -> SessionStats {
        self.log.session_stats()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(Pipeline::session_id)
    }

    pub fn is_streaming(&self) -> bool {
        self.source.is_some()
    }

    /// Device IP address (Ganzin Sol only).
    pub fn ip(&self) -> SdkResult<Ipv4Addr> {
        self.ganzin("ip").map(|ganzin| ganzin.ip)
    }

    /// Device port (Ganzin Sol only).
    pub fn port(&self) -> SdkResult<u16> {
        self.ganzin("port").map(|ganzin| ganzin.port)
    }

    /// Set the device IP address. Only IPv4 literals are accepted.
    pub fn set_ip(&mut self, ip: &str) -> SdkResult<()> {
        self.ganzin("ip")?;
        self.ensure_unlocked()?;
        self.connection.set_ip(ip)?;
        tracing::debug!(ip = %ip.trim(), "Device IP updated");
        Ok(())
    }

    /// Set the device port. Port 0 is rejected.
    pub fn set_port(&mut self, port: u16) -> SdkResult<()> {
        self.ganzin("port")?;
        self.ensure_unlocked()?;
        self.connection.set_port(port)?;
        tracing::debug!(port, "Device port updated");
        Ok(())
    }

    /// Read Pupil Labs Neon samples from a file instead of standard input.
    pub fn set_capture_path(&mut self, path: Option<PathBuf>) -> SdkResult<()> {
        self.ensure_unlocked()?;
        self.connection.set_capture_path(path)
    }

    fn ganzin(&self, setting: &'static str) -> SdkResult<&GanzinConfig> {
        self.connection
            .ganzin()
            .ok_or(SdkError::UnsupportedForPlatform {
                setting,
                platform: self.platform(),
            })
    }

    fn ensure_unlocked(&self) -> SdkResult<()> {
        if self.is_streaming() {
            return Err(SdkError::ConfigurationLocked);
        }
        Ok(())
    }

    /// Begin a new session, discarding windows and predictions of the
    /// previous one. Returns the session id.
    pub fn start_new_session(&mut self, session_uuid: Option<Uuid>) -> SdkResult<Uuid> {
        if self.is_streaming() {
            return Err(SdkError::AlreadyStreaming);
        }

        let session_id = session_uuid.unwrap_or_else(Uuid::new_v4);
        let pipeline = Pipeline::new(
            session_id,
            self.platform(),
            self.settings.pipeline.clone(),
            self.log.clone(),
        )
        .map_err(ConfigError::from)?;
        self.session = Some(pipeline);
        self.log.begin_session();

        tracing::info!(%session_id, "Session started");
        Ok(session_id)
    }

    /// Open the device and start streaming samples into the session.
    pub fn start_realtime_data(&mut self) -> SdkResult<()> {
        if self.session.is_none() {
            return Err(SdkError::SessionNotStarted);
        }
        if self.is_streaming() {
            return Err(SdkError::AlreadyStreaming);
        }

        let mut source = match self.next_source.take() {
            Some(source) => source,
            None => open_source(&self.connection, &self.settings.source),
        };
        source.start()?;

        tracing::info!(source = %source.describe(), "Realtime data started");
        self.dropped_seen = 0;
        self.source = Some(source);
        Ok(())
    }

    /// Latest cognitive load levels, after processing queued samples.
    ///
    /// Returns `None` until the first window has been predicted, and always
    /// when no inference engine is installed.
    pub fn get_cog_load_levels(&mut self) -> Option<CogLoadUpdate> {
        self.pump();
        self.session.as_ref()?.latest_cog_load().cloned()
    }

    /// Latest drowsiness level, after processing queued samples.
    pub fn get_drowsiness_level(&mut self) -> Option<DrowsinessUpdate> {
        self.pump();
        self.session.as_ref()?.latest_drowsiness().cloned()
    }

    /// Features of the most recent cognitive load window.
    pub fn latest_features(&self) -> Option<&GazeFeatures> {
        self.session.as_ref()?.latest_features()
    }

    /// Stop streaming and return the snapshots of every window processed
    /// since the stream started, including partial windows.
    pub fn stop_processing(&mut self) -> SdkResult<Vec<SessionSnapshot>> {
        let mut source = self.source.take().ok_or(SdkError::NotStreaming)?;
        source.stop();
        let description = source.describe();

        let snapshots = match self.session.as_mut() {
            Some(pipeline) => {
                Self::drain(&*source, pipeline, &self.log, &mut self.dropped_seen);
                pipeline.finish(engine_slot(&mut self.engine))
            }
            None => Vec::new(),
        };

        if let Err(e) = self.log.save() {
            tracing::warn!("Could not save session stats: {}", e);
        }

        tracing::info!(
            source = %description,
            snapshots = snapshots.len(),
            "Realtime data stopped"
        );
        Ok(snapshots)
    }

    /// Cognitive load over recorded samples, one result per second after
    /// the warmup period.
    pub fn predict_cog_load_batch(
        &mut self,
        samples: &[GazeSample],
    ) -> SdkResult<Vec<BatchPrediction<CognitiveLoadLevel>>> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(SdkError::NoInferenceEngine)?;
        let predictions = predict_cog_load_batch(samples, &self.settings.pipeline, engine)
            .map_err(ConfigError::from)?;
        Ok(predictions)
    }

    /// Drowsiness over recorded samples, one result every `stride`, with
    /// time of day taken in `timezone`.
    pub fn predict_drowsiness_batch(
        &mut self,
        samples: &[GazeSample],
        timezone: Tz,
        stride: Duration,
    ) -> SdkResult<Vec<BatchPrediction<DrowsinessLevel>>> {
        span("stride", stride).map_err(|_| SdkError::InvalidStride)?;
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(SdkError::NoInferenceEngine)?;
        let predictions =
            predict_drowsiness_batch(samples, &self.settings.pipeline, timezone, stride, engine)
                .map_err(ConfigError::from)?;
        Ok(predictions)
    }

    fn pump(&mut self) {
        let (Some(source), Some(pipeline)) = (self.source.as_ref(), self.session.as_mut()) else {
            return;
        };

        Self::drain(&**source, pipeline, &self.log, &mut self.dropped_seen);
        pipeline.process(Utc::now(), engine_slot(&mut self.engine));

        if !source.is_running() {
            tracing::debug!(source = %source.describe(), "Device stream has ended");
        }
    }

    fn drain(
        source: &dyn GazeSource,
        pipeline: &mut Pipeline,
        log: &SharedSessionLog,
        dropped_seen: &mut u64,
    ) {
        let mut received = 0u64;
        for sample in source.receiver().try_iter() {
            pipeline.push_sample(sample);
            received += 1;
        }
        if received > 0 {
            log.record_samples(received);
        }

        let dropped = source.dropped();
        if dropped > *dropped_seen {
            log.record_dropped(dropped - *dropped_seen);
            *dropped_seen = dropped;
        }
    }
}

impl Drop for TheiaSdk {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}

fn engine_slot(engine: &mut Option<Box<dyn InferenceEngine>>) -> Option<&mut dyn InferenceEngine> {
    match engine {
        Some(engine) => {
            let engine: &mut dyn InferenceEngine = engine.as_mut();
            Some(engine)
        }
        None => None,
    }
}
