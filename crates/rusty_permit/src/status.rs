//! The four-state permission status shared by every platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reconciled status of a permission identity
///
/// Every platform-specific signal is folded into exactly one of these values
/// before it leaves the resolver. Callers never see raw native results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The identity has never been requested, so a native prompt is still possible
    NotDetermined,
    /// Soft denial: asking again (after a rationale) is meaningful
    Denied,
    /// Hard denial: only the OS settings screen can change the outcome
    DeniedForever,
    /// Access is granted
    Granted,
}

impl PermissionStatus {
    /// Returns `true` for [`PermissionStatus::Granted`]
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    /// Returns `true` for both soft and hard denials
    pub fn is_denied(self) -> bool {
        matches!(self, PermissionStatus::Denied | PermissionStatus::DeniedForever)
    }

    /// Whether no further native request can change this status
    ///
    /// The coordinator returns these without touching the native layer.
    pub fn is_resolved(self) -> bool {
        matches!(self, PermissionStatus::Granted | PermissionStatus::DeniedForever)
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionStatus::NotDetermined => "not_determined",
            PermissionStatus::Denied => "denied",
            PermissionStatus::DeniedForever => "denied_forever",
            PermissionStatus::Granted => "granted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(PermissionStatus::Granted.is_granted());
        assert!(!PermissionStatus::Denied.is_granted());
        assert!(PermissionStatus::Denied.is_denied());
        assert!(PermissionStatus::DeniedForever.is_denied());
        assert!(!PermissionStatus::NotDetermined.is_denied());
    }

    #[test]
    fn test_resolved_statuses() {
        assert!(PermissionStatus::Granted.is_resolved());
        assert!(PermissionStatus::DeniedForever.is_resolved());
        assert!(!PermissionStatus::Denied.is_resolved());
        assert!(!PermissionStatus::NotDetermined.is_resolved());
    }

    #[test]
    fn test_serde_names_match_display() {
        for status in [
            PermissionStatus::NotDetermined,
            PermissionStatus::Denied,
            PermissionStatus::DeniedForever,
            PermissionStatus::Granted,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}
