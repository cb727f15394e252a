//! Error types for the Theia SDK.

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::platform::Platform;
use thiserror::Error;

/// Errors surfaced by the SDK handle.
///
/// Every failure mode is a distinct variant so callers can tell a rejected
/// license apart from a bad platform tag or an unreachable device.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Invalid license key: {0}")]
    InvalidLicense(String),

    #[error("Invalid platform '{0}': expected one of PL, Ganzin")]
    InvalidPlatform(String),

    #[error("Invalid device address '{0}': expected an IPv4 literal")]
    InvalidAddress(String),

    #[error("Invalid device port {0}")]
    InvalidPort(u16),

    #[error("'{setting}' is not available on platform {platform}")]
    UnsupportedForPlatform {
        setting: &'static str,
        platform: Platform,
    },

    #[error("Connection settings cannot be changed while streaming")]
    ConfigurationLocked,

    #[error("No session started; call start_new_session first")]
    SessionNotStarted,

    #[error("Realtime data is already streaming")]
    AlreadyStreaming,

    #[error("Realtime data is not streaming")]
    NotStreaming,

    #[error("No inference engine installed")]
    NoInferenceEngine,

    #[error("Prediction stride must be greater than zero")]
    InvalidStride,

    #[error("Device unreachable at {endpoint}: {reason}")]
    UnreachableDevice { endpoint: String, reason: String },

    #[error("Device error: {0}")]
    Device(DeviceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<DeviceError> for SdkError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Unreachable { endpoint, reason } => {
                SdkError::UnreachableDevice { endpoint, reason }
            }
            other => SdkError::Device(other),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
