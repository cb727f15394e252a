//! Device backends producing gaze samples.
//!
//! Each backend implements [`GazeSource`]: it runs its own capture thread and
//! hands samples to the caller over a bounded channel. Live sources drop and
//! count new samples when the channel is full; recorded files wait for room.

pub mod ganzin;
pub mod local;
pub mod recording;
pub mod replay;
pub mod types;

use crate::platform::PlatformConfig;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

pub use ganzin::GanzinSource;
pub use local::LocalCaptureSource;
pub use recording::{load_recording, RecordingError, SceneCamera};
pub use replay::ReplaySource;
pub use types::{decode_samples, GazeSample};

/// Capacity of the sample channel between a capture thread and the caller.
pub const CHANNEL_CAPACITY: usize = 10_000;

/// Errors that can occur while opening or running a device backend.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Source is already running")]
    AlreadyRunning,

    #[error("Device unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Capture source unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Failed to start capture worker: {0}")]
    Worker(String),
}

/// Transport options shared by the backends.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Reconnect after the stream drops
    pub reconnect: bool,
    /// Time allowed for the initial connection
    pub connect_timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A running (or startable) producer of gaze samples.
pub trait GazeSource {
    /// Open the device and begin capturing.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop capturing. Samples already queued stay readable.
    fn stop(&mut self);

    /// Whether the capture thread is still producing samples.
    fn is_running(&self) -> bool;

    /// Receiver for captured samples.
    fn receiver(&self) -> &Receiver<GazeSample>;

    /// Number of samples dropped because the channel was full.
    fn dropped(&self) -> u64;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Build the backend matching the platform selection.
pub fn open_source(config: &PlatformConfig, options: &SourceOptions) -> Box<dyn GazeSource> {
    match config {
        PlatformConfig::GanzinSol(ganzin) => Box::new(GanzinSource::new(*ganzin, options.clone())),
        PlatformConfig::PupilLabsNeon(local) => Box::new(LocalCaptureSource::new(local.clone())),
    }
}

/// Hand a sample to the consumer. Returns `false` once the consumer is gone.
pub(crate) fn forward(sender: &Sender<GazeSample>, sample: GazeSample, dropped: &AtomicU64) -> bool {
    match sender.try_send(sample) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            if dropped.fetch_add(1, Ordering::Relaxed) % 1_000 == 0 {
                tracing::warn!("Sample channel full, dropping samples");
            }
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
