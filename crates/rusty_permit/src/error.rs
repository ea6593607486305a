//! Error types for the rusty_permit engine
//!
//! This module defines the error hierarchy for the rusty_permit crate using `thiserror`.
//! Collaborator calls (native backend, key/value stores) return `Result<T, PermitError>`.
//! The engine itself never surfaces these errors to callers of the public permission
//! API: they are downgraded to a [`PermissionStatus`](crate::status::PermissionStatus)
//! at the coordinator boundary.
//!
//! # Error Variants
//!
//! - [`PermitError::Backend`]: The native permission backend failed
//! - [`PermitError::Timeout`]: No native answer arrived within the request timeout
//! - [`PermitError::ReplyDropped`]: The backend dropped its reply handle without answering
//! - [`PermitError::MissingDeclaration`]: A capability is not declared in the app manifest/plist
//! - [`PermitError::Storage`]: A key/value store failed
//! - [`PermitError::InvalidPlatformVersion`]: A platform version string is not semver
//! - [`PermitError::JsonDecode`]: Snapshot or store JSON is malformed (auto-converts from `serde_json::Error`)
//! - [`PermitError::Io`]: Filesystem operations (auto-converts from `std::io::Error`)
//!
//! # Example
//!
//! ```rust
//! use rusty_permit::error::PermitError;
//!
//! fn example() -> Result<(), PermitError> {
//!     // Auto-conversion from std::io::Error
//!     let _file = std::fs::read_to_string("/nonexistent")?;
//!
//!     // Manual construction
//!     return Err(PermitError::Backend("activity detached".to_string()));
//! }
//! ```

use thiserror::Error;

/// The main error type for all rusty_permit collaborator operations
///
/// Two variants support automatic conversion via the `?` operator:
/// - `JsonDecode` from `serde_json::Error`
/// - `Io` from `std::io::Error`
#[derive(Error, Debug)]
pub enum PermitError {
    /// The native permission backend reported a failure
    ///
    /// Typical causes are a detached activity/view controller or a platform
    /// API throwing while the request is dispatched.
    #[error("Native permission backend failed: {0}")]
    Backend(String),

    /// The native request was not answered in time
    #[error("Native permission request for {permission} timed out")]
    Timeout {
        /// Identity id of the request that timed out (e.g., "camera")
        permission: String,
    },

    /// The backend dropped the reply handle without completing it
    #[error("Native reply for request {request_id} was dropped without a result")]
    ReplyDropped {
        /// Correlation id of the abandoned request
        request_id: String,
    },

    /// A capability is missing from the application's platform declarations
    ///
    /// On Android this is a `<uses-permission>` entry missing from
    /// `AndroidManifest.xml`; on iOS a usage-description key missing from
    /// `Info.plist`. Requesting such a capability would crash the host process.
    #[error("{entry} is not declared for permission {permission}")]
    MissingDeclaration {
        /// Identity id being requested
        permission: String,
        /// The native entry that is not declared
        entry: String,
    },

    /// A key/value store failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// A platform version string could not be parsed
    #[error("Invalid platform version: {version}")]
    InvalidPlatformVersion {
        /// The rejected version string
        version: String,
    },

    /// Failed to parse or produce JSON
    #[error("Failed to process JSON: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PermitError {
    /// Whether this failure is transient and the request may simply be retried
    ///
    /// Configuration faults are the only non-transient failures: retrying a
    /// request for an undeclared capability can never succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PermitError::MissingDeclaration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_message() {
        let err = PermitError::Backend("activity detached".to_string());
        assert_eq!(
            err.to_string(),
            "Native permission backend failed: activity detached"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = PermitError::Timeout {
            permission: "camera".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Native permission request for camera timed out"
        );
    }

    #[test]
    fn test_missing_declaration_message() {
        let err = PermitError::MissingDeclaration {
            permission: "camera".to_string(),
            entry: "android.permission.CAMERA".to_string(),
        };
        assert!(err.to_string().contains("android.permission.CAMERA"));
        assert!(err.to_string().contains("camera"));
    }

    #[test]
    fn test_reply_dropped_message() {
        let err = PermitError::ReplyDropped {
            request_id: "req_1".to_string(),
        };
        assert!(err.to_string().contains("req_1"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(PermitError::Backend("x".to_string()).is_transient());
        assert!(
            PermitError::Timeout {
                permission: "camera".to_string()
            }
            .is_transient()
        );
        assert!(
            !PermitError::MissingDeclaration {
                permission: "camera".to_string(),
                entry: "NSCameraUsageDescription".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PermitError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_result_with_question_mark_json() {
        fn parse_json() -> Result<serde_json::Value, PermitError> {
            Ok(serde_json::from_str("{ invalid }")?)
        }

        let result = parse_json();
        assert!(matches!(result, Err(PermitError::JsonDecode(_))));
    }
}
