//! Status reconciliation
//!
//! [`StatusResolver`] folds the platform's native signal, the in-process
//! [`NegativeResultCache`] and the durable [`RequestHistory`] into one
//! [`PermissionStatus`]. The platform families disagree on almost everything,
//! so each has its own branch module:
//!
//! - [`android`] - rationale flag, soft vs permanent denial, cached negatives
//! - [`ios`] - first denial is permanent, no rationale flag, no cache
//!
//! Nothing outside this module ever sees a [`NativeSignal`].
//!
//! # Resolution order
//!
//! ```text
//! capabilities ──ImplicitlyGranted──→ Granted
//!      │        ──Unsupported───────→ Denied (warn)
//!      ↓
//! check_native ──authorized─────────→ Granted (cache cleared)
//!      │
//!      ├─ android: cache → two-stage → rationale flag → history → NotDetermined
//!      └─ ios:            two-stage →           denial marker → history → NotDetermined
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::backend::{NativeSignal, PermissionBackend};
use crate::history::RequestHistory;
use crate::identity::{Capabilities, CapabilitySet, Permission, RequestStage};
use crate::options::{Platform, PlatformFamily};
use crate::status::PermissionStatus;

pub mod android;
pub mod ios;

/// Last negative result per identity, process lifetime only
///
/// Reads run concurrently; writes only happen from the coordinator's critical
/// section or when a check observes a grant.
#[derive(Debug, Default)]
pub struct NegativeResultCache {
    entries: RwLock<HashMap<String, PermissionStatus>>,
}

impl NegativeResultCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached negative result for `permission`
    pub fn get(&self, permission: &Permission) -> Option<PermissionStatus> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(permission.id()).copied()
    }

    /// Remember a negative result; non-negative statuses are ignored
    pub fn record(&self, permission: &Permission, status: PermissionStatus) {
        if !status.is_denied() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(permission.id().to_string(), status);
    }

    /// Forget the cached result for `permission`
    pub fn clear(&self, permission: &Permission) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(permission.id());
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns native signals into a [`PermissionStatus`]
pub struct StatusResolver {
    platform: Platform,
    backend: Arc<dyn PermissionBackend>,
    history: RequestHistory,
    negatives: NegativeResultCache,
}

impl StatusResolver {
    /// Create a resolver for `platform`
    pub fn new(
        platform: Platform,
        backend: Arc<dyn PermissionBackend>,
        history: RequestHistory,
    ) -> Self {
        Self {
            platform,
            backend,
            history,
            negatives: NegativeResultCache::new(),
        }
    }

    /// Running platform
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Request history ledger
    pub fn history(&self) -> &RequestHistory {
        &self.history
    }

    /// Native backend
    pub fn backend(&self) -> &Arc<dyn PermissionBackend> {
        &self.backend
    }

    /// Negative result cache
    pub fn negatives(&self) -> &NegativeResultCache {
        &self.negatives
    }

    /// Current status of `permission`
    ///
    /// Read-only apart from clearing the negative cache on a grant; safe to
    /// call concurrently with itself and with an in-flight request.
    pub async fn check(&self, permission: &Permission) -> PermissionStatus {
        let set = match permission.capabilities(&self.platform) {
            Capabilities::ImplicitlyGranted => return PermissionStatus::Granted,
            Capabilities::Unsupported => {
                warn!(
                    permission = %permission,
                    platform = %self.platform.family(),
                    "no platform mapping for permission, reporting denied"
                );
                return PermissionStatus::Denied;
            }
            Capabilities::Native(set) => set,
        };

        let signal = match self.backend.check_native(permission, &set).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(permission = %permission, error = %e, "native status check failed");
                NativeSignal::Binary(false)
            }
        };

        if signal.is_authorized() {
            self.negatives.clear(permission);
            return PermissionStatus::Granted;
        }

        let status = match self.platform.family() {
            PlatformFamily::Android => android::resolve_check(self, permission, &set, signal).await,
            PlatformFamily::Ios => ios::resolve_check(self, permission, &set, signal).await,
        };
        debug!(permission = %permission, %status, "resolved permission status");
        status
    }

    /// Classify the native answer to a request for `stage`
    ///
    /// Called by the coordinator inside its critical section. Negative results
    /// land in the cache (Android only); a grant clears it.
    pub async fn classify_response(
        &self,
        permission: &Permission,
        set: &CapabilitySet,
        stage: RequestStage,
        signal: NativeSignal,
    ) -> PermissionStatus {
        let granted = match stage {
            RequestStage::Full => signal.is_authorized(),
            RequestStage::Foreground => signal.foreground(),
            RequestStage::Background => signal.background(),
        };

        if granted {
            self.negatives.clear(permission);
            // Foreground granted: a background request is still meaningful.
            return if stage == RequestStage::Foreground {
                PermissionStatus::NotDetermined
            } else {
                PermissionStatus::Granted
            };
        }

        let status = match self.platform.family() {
            PlatformFamily::Android => android::classify_denial(self, permission, set).await,
            PlatformFamily::Ios => ios::classify_denial(self, permission).await,
        };
        debug!(permission = %permission, ?stage, %status, "classified native denial");
        status
    }
}

impl std::fmt::Debug for StatusResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusResolver")
            .field("platform", &self.platform)
            .field("negatives", &self.negatives)
            .finish_non_exhaustive()
    }
}

/// Whether `signal` reports a two-stage identity stuck between its stages
fn between_stages(set: &CapabilitySet, signal: NativeSignal) -> bool {
    set.is_two_stage() && signal.foreground() && !signal.background()
}
