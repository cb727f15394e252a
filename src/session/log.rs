//! Session statistics log.
//!
//! Counts what the SDK has processed. Every count is kept twice: once for
//! the current session, cleared by [`SessionLog::begin_session`], and once
//! as a running total that is persisted for `theia status`. Counters are
//! atomic so a capture thread and the caller can share one log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// One set of processing counters.
#[derive(Debug, Default)]
struct Counters {
    /// Number of gaze samples taken from the device
    samples_received: AtomicU64,
    /// Number of samples lost to a full channel
    samples_dropped: AtomicU64,
    /// Number of windows completed
    windows_completed: AtomicU64,
    /// Number of cognitive load predictions made
    cog_load_predictions: AtomicU64,
    /// Number of drowsiness predictions made
    drowsiness_predictions: AtomicU64,
    /// Number of session snapshots exported
    snapshots_exported: AtomicU64,
}

impl Counters {
    fn clear(&self) {
        for counter in [
            &self.samples_received,
            &self.samples_dropped,
            &self.windows_completed,
            &self.cog_load_predictions,
            &self.drowsiness_predictions,
            &self.snapshots_exported,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Session and cumulative processing statistics.
#[derive(Debug)]
pub struct SessionLog {
    /// Counts since the current session began
    session: Counters,
    /// Counts across every session, including persisted ones
    total: Counters,
    /// Number of sessions started
    sessions_started: AtomicU64,
    /// Start of the current session, in Unix milliseconds
    session_start_ms: AtomicI64,
    /// Creation time of this log
    log_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionLog {
    /// Create a new session log.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session: Counters::default(),
            total: Counters::default(),
            sessions_started: AtomicU64::new(0),
            session_start_ms: AtomicI64::new(now.timestamp_millis()),
            log_start: now,
            persist_path: None,
        }
    }

    /// Create a session log that loads its totals from and saves them to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous session stats: {}", e);
        }

        log
    }

    fn record(&self, counter: impl Fn(&Counters) -> &AtomicU64, count: u64) {
        counter(&self.session).fetch_add(count, Ordering::Relaxed);
        counter(&self.total).fetch_add(count, Ordering::Relaxed);
    }

    /// Start counting a new session.
    pub fn begin_session(&self) {
        self.session.clear();
        self.session_start_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record received samples.
    pub fn record_samples(&self, count: u64) {
        self.record(|c| &c.samples_received, count);
    }

    /// Record samples dropped on a full channel.
    pub fn record_dropped(&self, count: u64) {
        self.record(|c| &c.samples_dropped, count);
    }

    /// Record a completed window.
    pub fn record_window_completed(&self) {
        self.record(|c| &c.windows_completed, 1);
    }

    /// Record a cognitive load prediction.
    pub fn record_cog_load_prediction(&self) {
        self.record(|c| &c.cog_load_predictions, 1);
    }

    /// Record a drowsiness prediction.
    pub fn record_drowsiness_prediction(&self) {
        self.record(|c| &c.drowsiness_predictions, 1);
    }

    /// Record exported snapshots.
    pub fn record_snapshots_exported(&self, count: u64) {
        self.record(|c| &c.snapshots_exported, count);
    }

    /// Get the cumulative statistics.
    pub fn stats(&self) -> SessionStats {
        self.snapshot(&self.total, self.log_start)
    }

    /// Get the statistics of the current session.
    pub fn session_stats(&self) -> SessionStats {
        let started_ms = self.session_start_ms.load(Ordering::Relaxed);
        let started = DateTime::<Utc>::from_timestamp_millis(started_ms).unwrap_or(self.log_start);
        self.snapshot(&self.session, started)
    }

    fn snapshot(&self, counters: &Counters, since: DateTime<Utc>) -> SessionStats {
        SessionStats {
            samples_received: counters.samples_received.load(Ordering::Relaxed),
            samples_dropped: counters.samples_dropped.load(Ordering::Relaxed),
            windows_completed: counters.windows_completed.load(Ordering::Relaxed),
            cog_load_predictions: counters.cog_load_predictions.load(Ordering::Relaxed),
            drowsiness_predictions: counters.drowsiness_predictions.load(Ordering::Relaxed),
            snapshots_exported: counters.snapshots_exported.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            log_start: since,
            uptime_secs: (Utc::now() - since).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string of the cumulative statistics.
    pub fn summary(&self) -> String {
        self.stats().summary("Cumulative Statistics")
    }

    /// Get a summary string of the current session.
    pub fn session_summary(&self) -> String {
        self.session_stats().summary("Session Statistics")
    }

    /// Save cumulative stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_received: stats.samples_received,
                samples_dropped: stats.samples_dropped,
                windows_completed: stats.windows_completed,
                cog_load_predictions: stats.cog_load_predictions,
                drowsiness_predictions: stats.drowsiness_predictions,
                snapshots_exported: stats.snapshots_exported,
                sessions_started: stats.sessions_started,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load cumulative stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                let total = &self.total;
                total
                    .samples_received
                    .store(persisted.samples_received, Ordering::Relaxed);
                total
                    .samples_dropped
                    .store(persisted.samples_dropped, Ordering::Relaxed);
                total
                    .windows_completed
                    .store(persisted.windows_completed, Ordering::Relaxed);
                total
                    .cog_load_predictions
                    .store(persisted.cog_load_predictions, Ordering::Relaxed);
                total
                    .drowsiness_predictions
                    .store(persisted.drowsiness_predictions, Ordering::Relaxed);
                total
                    .snapshots_exported
                    .store(persisted.snapshots_exported, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub samples_received: u64,
    pub samples_dropped: u64,
    pub windows_completed: u64,
    pub cog_load_predictions: u64,
    pub drowsiness_predictions: u64,
    pub snapshots_exported: u64,
    /// Sessions started so far, including the current one
    pub sessions_started: u64,
    /// Start of the counted period
    pub log_start: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl SessionStats {
    fn summary(&self, title: &str) -> String {
        format!(
            "{title}:\n\
             - Sessions started: {}\n\
             - Samples received: {}\n\
             - Samples dropped: {}\n\
             - Windows completed: {}\n\
             - Cognitive load predictions: {}\n\
             - Drowsiness predictions: {}\n\
             - Snapshots exported: {}\n\
             - Uptime: {} seconds",
            self.sessions_started,
            self.samples_received,
            self.samples_dropped,
            self.windows_completed,
            self.cog_load_predictions,
            self.drowsiness_predictions,
            self.snapshots_exported,
            self.uptime_secs
        )
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_received: u64,
    samples_dropped: u64,
    windows_completed: u64,
    cog_load_predictions: u64,
    drowsiness_predictions: u64,
    snapshots_exported: u64,
    #[serde(default)]
    sessions_started: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared session log.
pub type SharedSessionLog = Arc<SessionLog>;

/// Create a new shared session log.
pub fn create_shared_log() -> SharedSessionLog {
    Arc::new(SessionLog::new())
}

/// Create a new shared session log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedSessionLog {
    Arc::new(SessionLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_log_counting() {
        let log = SessionLog::new();

        log.record_samples(200);
        log.record_samples(50);
        log.record_dropped(3);
        log.record_window_completed();

        let stats = log.stats();
        assert_eq!(stats.samples_received, 250);
        assert_eq!(stats.samples_dropped, 3);
        assert_eq!(stats.windows_completed, 1);
        assert_eq!(log.session_stats().samples_received, 250);
    }

    #[test]
    fn test_new_session_clears_session_counts_only() {
        let log = SessionLog::new();
        log.begin_session();
        log.record_samples(100);
        log.record_cog_load_prediction();

        log.begin_session();
        log.record_samples(5);

        let session = log.session_stats();
        assert_eq!(session.samples_received, 5);
        assert_eq!(session.cog_load_predictions, 0);
        assert_eq!(session.sessions_started, 2);

        let total = log.stats();
        assert_eq!(total.samples_received, 105);
        assert_eq!(total.cog_load_predictions, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("theia-stats-{}.json", uuid::Uuid::new_v4()));

        let log = SessionLog::with_persistence(path.clone());
        log.begin_session();
        log.record_samples(42);
        log.save().unwrap();

        let reloaded = SessionLog::with_persistence(path.clone());
        assert_eq!(reloaded.stats().samples_received, 42);
        assert_eq!(reloaded.stats().sessions_started, 1);
        // Only totals are persisted
        assert_eq!(reloaded.session_stats().samples_received, 0);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_summary_format() {
        let log = SessionLog::new();
        assert!(log.summary().starts_with("Cumulative Statistics"));
        assert!(log.summary().contains("Samples received"));
        assert!(log.session_summary().starts_with("Session Statistics"));
        assert!(log.session_summary().contains("Drowsiness predictions"));
    }
}
