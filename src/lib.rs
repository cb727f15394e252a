//! Theia SDK - license-gated eye-tracking analysis.
//!
//! This library connects to an eye tracker, groups its gaze samples into
//! time windows and turns each window into cognitive load and drowsiness
//! predictions through a pluggable inference engine.
//!
//! # Supported Platforms
//!
//! - **Pupil Labs Neon** (`PL`): local capture, no network configuration
//! - **Ganzin Sol** (`Ganzin`): networked, streams over WebSocket from a
//!   configurable IP address and port (default `192.168.1.100:8080`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Theia SDK                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Device    │──▶│  Windowing  │──▶│  Features   │       │
//! │  │ (PL/Ganzin) │   │ (5s / 120s) │   │ (compute)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │  Session    │                     │  Inference  │       │
//! │  │    Log      │                     │   Engine    │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use theia_sdk::TheiaSdk;
//!
//! let mut sdk = TheiaSdk::new("YOUR-LICENSE-KEY", "Ganzin")?;
//! sdk.set_ip("192.168.1.50")?;
//! sdk.set_port(8080)?;
//!
//! sdk.start_new_session(None)?;
//! sdk.start_realtime_data()?;
//!
//! if let Some(update) = sdk.get_cog_load_levels() {
//!     println!("batch {}: {:?}", update.batch, update.primary());
//! }
//!
//! let snapshots = sdk.stop_processing()?;
//! println!("{} windows processed", snapshots.len());
//! # Ok::<(), theia_sdk::SdkError>(())
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod license;
pub mod platform;
pub mod sdk;
pub mod session;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    BatchPrediction, CogLoadUpdate, CognitiveLoadLevel, DrowsinessLevel, DrowsinessUpdate,
    GazeFeatures, InferenceEngine, Prediction, SessionSnapshot,
};
pub use device::{load_recording, GazeSample, GazeSource, ReplaySource, SceneCamera};
pub use error::{SdkError, SdkResult};
pub use license::{FormatValidator, LicenseKey, LicenseValidator};
pub use platform::{GanzinConfig, LocalCaptureConfig, Platform, PlatformConfig};
pub use sdk::{PlatformSelector, SessionSettings, TheiaSdk};
pub use session::{SessionLog, SessionStats, SharedSessionLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Licensing notice that can be displayed to users.
pub const LICENSE_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                  THEIA SDK - LICENSING NOTICE                    ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  The Theia SDK requires a valid license key.                     ║
║                                                                  ║
║  Provide it in one of these ways:                                ║
║    • the --license-key flag                                      ║
║    • the THEIA_LICENSE_KEY environment variable                  ║
║    • theia config --set-license-key <KEY>                        ║
║                                                                  ║
║  Without a valid key the SDK will not start a session.           ║
║                                                                  ║
║  Supported platforms:                                            ║
║    • PL      Pupil Labs Neon (local capture)                     ║
║    • Ganzin  Ganzin Sol (WebSocket, default 192.168.1.100:8080)  ║
║                                                                  ║
║  Gaze data is processed locally. Only window features and        ║
║  predictions are exported.                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

/// Host details reported by `theia status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub os: &'static str,
    pub arch: &'static str,
}

pub fn host_info() -> HostInfo {
    HostInfo {
        hostname: hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().to_string()),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
    }
}
