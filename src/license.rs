//! License key handling.
//!
//! A [`LicenseKey`] can only be built from a non-empty credential. Whether the
//! credential is actually entitled to use the SDK is decided by a
//! [`LicenseValidator`]; the bundled [`FormatValidator`] only checks the key's
//! shape offline, remote validation plugs in through the same trait.

use crate::error::{SdkError, SdkResult};
use std::fmt;

/// Environment variable consulted when no license key is passed explicitly.
pub const LICENSE_ENV_VAR: &str = "THEIA_LICENSE_KEY";

/// An opaque, non-empty license credential.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parse a raw credential. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> SdkResult<Self> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(SdkError::InvalidLicense("license key is empty".to_string()));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SdkError::InvalidLicense(
                "license key contains whitespace or control characters".to_string(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    /// The raw credential, for handing to a validation service.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The key with everything but its last four characters masked.
    pub fn redacted(&self) -> String {
        let count = self.0.chars().count();
        if count <= 4 {
            return "*".repeat(count);
        }
        let tail: String = self.0.chars().skip(count - 4).collect();
        format!("{}{tail}", "*".repeat(count - 4))
    }
}

impl fmt::Debug for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LicenseKey").field(&self.redacted()).finish()
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Decides whether a license key unlocks the SDK.
pub trait LicenseValidator {
    fn validate(&self, key: &LicenseKey) -> SdkResult<()>;
}

impl<F> LicenseValidator for F
where
    F: Fn(&LicenseKey) -> SdkResult<()>,
{
    fn validate(&self, key: &LicenseKey) -> SdkResult<()> {
        self(key)
    }
}

/// Offline shape check: printable ASCII only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatValidator;

impl LicenseValidator for FormatValidator {
    fn validate(&self, key: &LicenseKey) -> SdkResult<()> {
        if key.expose().chars().all(|c| c.is_ascii_graphic()) {
            Ok(())
        } else {
            Err(SdkError::InvalidLicense(
                "license key must be printable ASCII".to_string(),
            ))
        }
    }
}

/// Pick the license key to use: explicit value, then `THEIA_LICENSE_KEY`,
/// then the configured one.
pub fn resolve_license_key(explicit: Option<&str>, configured: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(LICENSE_ENV_VAR).ok())
        .or_else(|| configured.map(str::to_string))
        .filter(|key| !key.trim().is_empty())
}
