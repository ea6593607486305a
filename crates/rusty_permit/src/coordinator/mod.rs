//! Serialized native request orchestration
//!
//! [`RequestCoordinator`] is the only component that talks to
//! [`PermissionBackend::request_native`](crate::backend::PermissionBackend::request_native).
//! It turns the callback-driven native flow into one awaitable call:
//!
//! ```text
//! request(permission)
//!   │  gate.lock()                 one native request in flight, others suspend
//!   │  resolver.check()            already Granted / DeniedForever → return
//!   │  verify_declarations()       missing entry → DeniedForever
//!   │  history.mark_requested()    before the prompt, survives process death
//!   │  pending.sweep_stale()
//!   │  pending.register() ──────── NativeReply ──→ backend.request_native()
//!   │                                                   │ (user answers)
//!   │  timeout(slot) ←───────────── reply.resolve() ────┘
//!   │  resolver.classify_response()
//!   ↓
//! PermissionStatus
//! ```
//!
//! Every failure below this boundary (dispatch error, timeout, dropped reply)
//! resolves to [`PermissionStatus::Denied`]: retryable, never a lock-out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::backend::{NativeReply, NativeRequest, NativeSignal};
use crate::coordinator::pending::{PendingGuard, PendingRequests};
use crate::error::PermitError;
use crate::identity::{Capabilities, CapabilitySet, Permission, RequestStage};
use crate::options::PermitOptions;
use crate::resolver::StatusResolver;
use crate::status::PermissionStatus;

pub mod pending;

/// Serializes native permission requests and awaits their answers
pub struct RequestCoordinator {
    resolver: Arc<StatusResolver>,
    pending: PendingRequests,
    /// Held for the whole request; guarantees no overlapping native dialogs
    gate: Mutex<()>,
    request_timeout: Duration,
    stale_request_after: Duration,
}

impl RequestCoordinator {
    /// Create a coordinator dispatching through `resolver`'s backend
    pub fn new(resolver: Arc<StatusResolver>, options: &PermitOptions) -> Self {
        Self {
            resolver,
            pending: PendingRequests::new(),
            gate: Mutex::new(()),
            request_timeout: options.request_timeout,
            stale_request_after: options.stale_request_after,
        }
    }

    /// Pending request tracker
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Request `permission` from the user if a native prompt can still change it
    ///
    /// Concurrent callers are served one at a time. If the awaiting task is
    /// cancelled, its pending entry is removed all the same.
    pub async fn request(&self, permission: &Permission) -> PermissionStatus {
        let _serial = self.gate.lock().await;

        // Re-check under the lock: a concurrent request may have settled it.
        let current = self.resolver.check(permission).await;
        if current.is_resolved() {
            debug!(permission = %permission, status = %current, "request skipped, already resolved");
            return current;
        }

        let set = match permission.capabilities(self.resolver.platform()) {
            Capabilities::Native(set) => set,
            // check() already reported these; nothing to dispatch.
            Capabilities::ImplicitlyGranted | Capabilities::Unsupported => return current,
        };

        let backend = self.resolver.backend();
        if let Err(e) = backend.verify_declarations(permission, &set).await {
            return Self::failure_status(permission, &e);
        }

        let stage = self.stage_for(permission, &set).await;
        let history = self.resolver.history();
        history.mark_requested(permission).await;
        if stage == RequestStage::Background {
            history.mark_background_requested(permission).await;
        }

        let swept = self.pending.sweep_stale(self.stale_request_after);
        if swept > 0 {
            debug!(swept, "discarded stale native requests");
        }

        let (request_id, slot) = self.pending.register(permission.id());
        let _entry = PendingGuard::new(self.pending.clone(), request_id.clone());
        let request = NativeRequest {
            request_id: request_id.clone(),
            permission: permission.clone(),
            stage,
            entries: set.entries_for(stage),
        };
        let reply = NativeReply::new(request_id.clone(), self.pending.clone());

        debug!(permission = %permission, request_id = %request_id, ?stage, "dispatching native request");
        if let Err(e) = backend.request_native(request, reply).await {
            return Self::failure_status(permission, &e);
        }

        let signal = match tokio::time::timeout(self.request_timeout, slot).await {
            Ok(Ok(Ok(signal))) => signal,
            Ok(Ok(Err(e))) => return Self::failure_status(permission, &e),
            Ok(Err(_)) => {
                let e = PermitError::ReplyDropped { request_id };
                return Self::failure_status(permission, &e);
            }
            Err(_) => {
                let e = PermitError::Timeout {
                    permission: permission.id().to_string(),
                };
                return Self::failure_status(permission, &e);
            }
        };

        let status = self
            .resolver
            .classify_response(permission, &set, stage, signal)
            .await;
        debug!(permission = %permission, %status, "native request finished");
        status
    }

    /// Which part of `set` the next native request covers
    async fn stage_for(&self, permission: &Permission, set: &CapabilitySet) -> RequestStage {
        if !set.is_two_stage() {
            return RequestStage::Full;
        }

        let signal = self
            .resolver
            .backend()
            .check_native(permission, set)
            .await
            .unwrap_or(NativeSignal::Binary(false));
        if signal.foreground() {
            RequestStage::Background
        } else {
            RequestStage::Foreground
        }
    }

    fn failure_status(permission: &Permission, e: &PermitError) -> PermissionStatus {
        if e.is_transient() {
            warn!(permission = %permission, error = %e, "native request failed, reporting denied");
            PermissionStatus::Denied
        } else {
            error!(permission = %permission, error = %e, "permission misconfigured, reporting denied forever");
            PermissionStatus::DeniedForever
        }
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("pending", &self.pending.len())
            .field("request_timeout", &self.request_timeout)
            .field("stale_request_after", &self.stale_request_after)
            .finish_non_exhaustive()
    }
}
