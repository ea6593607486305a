//! Configuration options and builder pattern for the permission engine
//!
//! This module provides [`PermitOptions`] for configuring the engine: which
//! platform it runs on, how long to wait for a native answer, when an abandoned
//! request is considered stale, and how request history keys are named.
//!
//! # Example
//!
//! ```
//! use rusty_permit::options::{PermitOptions, Platform};
//! use std::time::Duration;
//!
//! let options = PermitOptions::builder()
//!     .platform(Platform::android("13.0.0").unwrap())
//!     .request_timeout(Duration::from_secs(30))
//!     .build();
//! ```
//!
//! # Builder Pattern
//!
//! All fields have sensible defaults (Android 14, 60 s timeout, 120 s
//! staleness threshold, `permission_requested_` history prefix).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::PermitError;

/// Default time to wait for a native permission answer
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default age after which an unanswered pending request is discarded
pub const DEFAULT_STALE_REQUEST_AFTER: Duration = Duration::from_secs(120);

/// Default key prefix for the request history ledger
pub const DEFAULT_HISTORY_PREFIX: &str = "permission_requested_";

/// Operating system family the engine is reconciling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    /// Binary grants, a "should show rationale" flag, two-stage background location
    Android,
    /// Atomic authorization, first denial is permanent, no rationale flag
    Ios,
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::Android => f.write_str("android"),
            PlatformFamily::Ios => f.write_str("ios"),
        }
    }
}

/// Running platform: family plus OS release version
///
/// The version gates the permission catalog, e.g. Android only has a runtime
/// notification permission from 13 onwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    family: PlatformFamily,
    version: semver::Version,
}

impl Platform {
    /// Create a platform from a family and an already parsed version
    pub fn new(family: PlatformFamily, version: semver::Version) -> Self {
        Self { family, version }
    }

    /// Android with the given release version (e.g. `"13"`, `"12.1"`, `"14.0.0"`)
    pub fn android(version: &str) -> Result<Self, PermitError> {
        Ok(Self::new(PlatformFamily::Android, parse_os_version(version)?))
    }

    /// iOS with the given release version (e.g. `"17.4"`)
    pub fn ios(version: &str) -> Result<Self, PermitError> {
        Ok(Self::new(PlatformFamily::Ios, parse_os_version(version)?))
    }

    /// Platform family
    pub fn family(&self) -> PlatformFamily {
        self.family
    }

    /// OS release version
    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    /// Whether the OS major version is at least `major`
    pub fn at_least(&self, major: u64) -> bool {
        self.version >= semver::Version::new(major, 0, 0)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(PlatformFamily::Android, semver::Version::new(14, 0, 0))
    }
}

/// Parse an OS release string, padding missing minor/patch components
///
/// OS versions are routinely reported as `"14"` or `"17.4"`, which strict
/// semver rejects.
fn parse_os_version(raw: &str) -> Result<semver::Version, PermitError> {
    let trimmed = raw.trim();
    let padded = match trimmed.matches('.').count() {
        0 => format!("{}.0.0", trimmed),
        1 => format!("{}.0", trimmed),
        _ => trimmed.to_string(),
    };

    semver::Version::parse(&padded).map_err(|_| PermitError::InvalidPlatformVersion {
        version: raw.to_string(),
    })
}

/// Configuration options for the permission engine
///
/// # Example
///
/// ```
/// use rusty_permit::options::{PermitOptions, Platform};
///
/// let options = PermitOptions::builder()
///     .platform(Platform::ios("17.4").unwrap())
///     .build();
/// assert_eq!(options.history_prefix, "permission_requested_");
/// ```
#[derive(Debug, Clone)]
pub struct PermitOptions {
    /// Platform the engine runs on
    pub platform: Platform,
    /// Maximum time to wait for a native answer before resolving to `Denied`
    pub request_timeout: Duration,
    /// Age after which an unanswered pending request is swept
    pub stale_request_after: Duration,
    /// Key prefix for request history entries
    pub history_prefix: String,
}

impl Default for PermitOptions {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stale_request_after: DEFAULT_STALE_REQUEST_AFTER,
            history_prefix: DEFAULT_HISTORY_PREFIX.to_string(),
        }
    }
}

impl PermitOptions {
    /// Create a new options builder
    pub fn builder() -> PermitOptionsBuilder {
        PermitOptionsBuilder::default()
    }
}

/// Builder for [`PermitOptions`]
///
/// Provides a fluent interface for constructing options with chainable setters.
#[derive(Debug, Default)]
pub struct PermitOptionsBuilder {
    inner: PermitOptions,
}

impl PermitOptionsBuilder {
    /// Set the running platform
    pub fn platform(mut self, platform: Platform) -> Self {
        self.inner.platform = platform;
        self
    }

    /// Set the native request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.inner.request_timeout = timeout;
        self
    }

    /// Set the staleness threshold for abandoned pending requests
    pub fn stale_request_after(mut self, age: Duration) -> Self {
        self.inner.stale_request_after = age;
        self
    }

    /// Set the request history key prefix
    pub fn history_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner.history_prefix = prefix.into();
        self
    }

    /// Build the options
    pub fn build(self) -> PermitOptions {
        self.inner
    }
}
