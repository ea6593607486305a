//! Native permission backend abstraction
//!
//! The engine never talks to platform APIs directly. A host application
//! implements [`PermissionBackend`] on top of its activity/view-controller
//! plumbing and hands it to the [`PermissionManager`](crate::manager::PermissionManager).
//!
//! Native requests are callback-driven on both platforms. The backend receives
//! a [`NativeReply`] together with each [`NativeRequest`] and completes it
//! exactly once, from whatever thread or task the platform callback fires on.
//!
//! # Example
//!
//! ```
//! use rusty_permit::backend::{NativeReply, NativeRequest, NativeSignal, PermissionBackend};
//! use rusty_permit::error::PermitError;
//! use rusty_permit::identity::{CapabilitySet, Permission};
//! use async_trait::async_trait;
//!
//! struct AlwaysGranted;
//!
//! #[async_trait]
//! impl PermissionBackend for AlwaysGranted {
//!     async fn check_native(
//!         &self,
//!         _permission: &Permission,
//!         _capabilities: &CapabilitySet,
//!     ) -> Result<NativeSignal, PermitError> {
//!         Ok(NativeSignal::Binary(true))
//!     }
//!
//!     async fn request_native(
//!         &self,
//!         _request: NativeRequest,
//!         reply: NativeReply,
//!     ) -> Result<(), PermitError> {
//!         reply.resolve(NativeSignal::Binary(true));
//!         Ok(())
//!     }
//!
//!     async fn open_app_settings(&self) -> Result<(), PermitError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use tracing::debug;

use crate::coordinator::pending::PendingRequests;
use crate::error::PermitError;
use crate::identity::{CapabilitySet, Permission, RequestStage};

/// Raw authorization signal reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSignal {
    /// All entries of the queried set are (or are not) authorized
    Binary(bool),
    /// Foreground and background authorization of a two-stage identity
    Pair {
        /// Foreground entries authorized
        foreground: bool,
        /// Background entries authorized
        background: bool,
    },
}

impl NativeSignal {
    /// Foreground half of the signal
    pub fn foreground(self) -> bool {
        match self {
            NativeSignal::Binary(granted) => granted,
            NativeSignal::Pair { foreground, .. } => foreground,
        }
    }

    /// Background half of the signal; a binary signal answers for both
    pub fn background(self) -> bool {
        match self {
            NativeSignal::Binary(granted) => granted,
            NativeSignal::Pair { background, .. } => background,
        }
    }

    /// Whether every requested entry is authorized
    pub fn is_authorized(self) -> bool {
        self.foreground() && self.background()
    }
}

/// A native request handed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRequest {
    /// Correlation id, identical to [`NativeReply::request_id`]
    pub request_id: String,
    /// Identity being requested
    pub permission: Permission,
    /// Stage of a two-stage identity, or [`RequestStage::Full`]
    pub stage: RequestStage,
    /// Native entries to request (permission strings or usage keys)
    pub entries: Vec<String>,
}

/// One-shot completion handle for a dispatched native request
///
/// Completing the reply fills the pending result slot the coordinator is
/// awaiting. Dropping it unanswered completes the slot with
/// [`PermitError::ReplyDropped`], so a lost callback resolves immediately
/// instead of waiting for the timeout.
pub struct NativeReply {
    request_id: String,
    pending: PendingRequests,
    answered: bool,
}

impl NativeReply {
    pub(crate) fn new(request_id: String, pending: PendingRequests) -> Self {
        Self {
            request_id,
            pending,
            answered: false,
        }
    }

    /// Correlation id of the request this reply answers
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Deliver the platform's answer
    ///
    /// Returns `false` when nobody is waiting any more (timed out, swept, or
    /// the awaiting task was cancelled).
    pub fn resolve(mut self, signal: NativeSignal) -> bool {
        self.answered = true;
        self.pending.complete(&self.request_id, Ok(signal))
    }

    /// Report that the native request failed
    pub fn fail(mut self, error: PermitError) -> bool {
        self.answered = true;
        self.pending.complete(&self.request_id, Err(error))
    }
}

impl std::fmt::Debug for NativeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeReply")
            .field("request_id", &self.request_id)
            .field("answered", &self.answered)
            .finish()
    }
}

impl Drop for NativeReply {
    fn drop(&mut self) {
        if !self.answered {
            debug!(request_id = %self.request_id, "native reply dropped unanswered");
            let error = PermitError::ReplyDropped {
                request_id: self.request_id.clone(),
            };
            self.pending.complete(&self.request_id, Err(error));
        }
    }
}

/// Platform permission capability consumed by the engine
///
/// Implementations must be cheap to call concurrently for `check_native`;
/// `request_native` is only ever invoked by the coordinator, one at a time.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Query the current authorization of `capabilities`
    ///
    /// Two-stage identities should answer with [`NativeSignal::Pair`].
    async fn check_native(
        &self,
        permission: &Permission,
        capabilities: &CapabilitySet,
    ) -> Result<NativeSignal, PermitError>;

    /// Dispatch a native request and return without waiting for the user
    ///
    /// The answer is delivered later through `reply`. An `Err` here means the
    /// request could not be dispatched at all.
    async fn request_native(
        &self,
        request: NativeRequest,
        reply: NativeReply,
    ) -> Result<(), PermitError>;

    /// Android's "should show request permission rationale" flag
    ///
    /// Platforms without such a flag keep the default `false`.
    async fn should_show_rationale(
        &self,
        _permission: &Permission,
        _capabilities: &CapabilitySet,
    ) -> Result<bool, PermitError> {
        Ok(false)
    }

    /// Pre-flight check that every entry is declared in the manifest/plist
    ///
    /// Return [`PermitError::MissingDeclaration`] for a missing entry.
    async fn verify_declarations(
        &self,
        _permission: &Permission,
        _capabilities: &CapabilitySet,
    ) -> Result<(), PermitError> {
        Ok(())
    }

    /// Open the application's page in the OS settings
    async fn open_app_settings(&self) -> Result<(), PermitError>;
}
