//! Platform selection and per-platform connection settings.
//!
//! The platform choice is a tagged variant: the Ganzin Sol variant carries its
//! network endpoint, the Pupil Labs Neon variant carries only its local
//! capture settings. Network fields therefore do not exist on a Neon handle.

use crate::error::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

/// Default address of a Ganzin Sol device on its access-point network.
pub const DEFAULT_GANZIN_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

/// Default WebSocket port exposed by a Ganzin Sol device.
pub const DEFAULT_GANZIN_PORT: u16 = 8080;

/// Supported eye-tracking hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Pupil Labs Neon (local capture)
    #[serde(rename = "PL")]
    PupilLabsNeon,
    /// Ganzin Sol (networked)
    #[serde(rename = "Ganzin")]
    GanzinSol,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::PupilLabsNeon, Platform::GanzinSol];

    /// The selector tag callers pass at construction.
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::PupilLabsNeon => "PL",
            Platform::GanzinSol => "Ganzin",
        }
    }

    /// Human-readable device name.
    pub fn device_name(&self) -> &'static str {
        match self {
            Platform::PupilLabsNeon => "Pupil Labs Neon",
            Platform::GanzinSol => "Ganzin Sol",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Platform {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| SdkError::InvalidPlatform(s.to_string()))
    }
}

/// Network endpoint of a Ganzin Sol device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GanzinConfig {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Default for GanzinConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_GANZIN_IP,
            port: DEFAULT_GANZIN_PORT,
        }
    }
}

impl GanzinConfig {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// WebSocket URL of the device's gaze stream.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.ip, self.port)
    }
}

/// Local capture settings for a Pupil Labs Neon.
///
/// Samples are read as newline-delimited JSON from `capture_path`, or from
/// standard input when no path is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCaptureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<PathBuf>,
}

/// Platform selection together with the settings that only apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform")]
pub enum PlatformConfig {
    #[serde(rename = "PL")]
    PupilLabsNeon(LocalCaptureConfig),
    #[serde(rename = "Ganzin")]
    GanzinSol(GanzinConfig),
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::for_platform(Platform::PupilLabsNeon)
    }
}

impl PlatformConfig {
    /// Default settings for the given platform.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::PupilLabsNeon => PlatformConfig::PupilLabsNeon(LocalCaptureConfig::default()),
            Platform::GanzinSol => PlatformConfig::GanzinSol(GanzinConfig::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformConfig::PupilLabsNeon(_) => Platform::PupilLabsNeon,
            PlatformConfig::GanzinSol(_) => Platform::GanzinSol,
        }
    }

    pub fn ganzin(&self) -> Option<&GanzinConfig> {
        match self {
            PlatformConfig::GanzinSol(config) => Some(config),
            PlatformConfig::PupilLabsNeon(_) => None,
        }
    }

    fn ganzin_mut(&mut self, setting: &'static str) -> SdkResult<&mut GanzinConfig> {
        let platform = self.platform();
        match self {
            PlatformConfig::GanzinSol(config) => Ok(config),
            PlatformConfig::PupilLabsNeon(_) => {
                Err(SdkError::UnsupportedForPlatform { setting, platform })
            }
        }
    }

    pub fn local_capture(&self) -> Option<&LocalCaptureConfig> {
        match self {
            PlatformConfig::PupilLabsNeon(config) => Some(config),
            PlatformConfig::GanzinSol(_) => None,
        }
    }

    /// Switch to `platform`, keeping the current settings if it is already selected.
    pub fn switch_platform(&mut self, platform: Platform) {
        if self.platform() != platform {
            *self = Self::for_platform(platform);
        }
    }

    /// Set the Ganzin Sol address. Only IPv4 literals are accepted.
    pub fn set_ip(&mut self, ip: &str) -> SdkResult<()> {
        let ganzin = self.ganzin_mut("ip")?;
        ganzin.ip = ip
            .trim()
            .parse()
            .map_err(|_| SdkError::InvalidAddress(ip.to_string()))?;
        Ok(())
    }

    /// Set the Ganzin Sol port. Port 0 is rejected.
    pub fn set_port(&mut self, port: u16) -> SdkResult<()> {
        let ganzin = self.ganzin_mut("port")?;
        if port == 0 {
            return Err(SdkError::InvalidPort(port));
        }
        ganzin.port = port;
        Ok(())
    }

    /// Set the Pupil Labs Neon capture path (`None` reads standard input).
    pub fn set_capture_path(&mut self, path: Option<PathBuf>) -> SdkResult<()> {
        let platform = self.platform();
        match self {
            PlatformConfig::PupilLabsNeon(local) => {
                local.capture_path = path;
                Ok(())
            }
            PlatformConfig::GanzinSol(_) => Err(SdkError::UnsupportedForPlatform {
                setting: "capture_path",
                platform,
            }),
        }
    }

    /// One-line description for status output.
    pub fn describe(&self) -> String {
        let name = self.platform().device_name();
        match self {
            PlatformConfig::PupilLabsNeon(local) => match &local.capture_path {
                Some(path) => format!("{name} (capture: {})", path.display()),
                None => format!("{name} (capture: stdin)"),
            },
            PlatformConfig::GanzinSol(ganzin) => format!("{name} ({})", ganzin.ws_url()),
        }
    }
}
