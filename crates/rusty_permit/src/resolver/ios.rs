//! iOS reconciliation rules.
//!
//! iOS shows a permission prompt exactly once. A denial answered by the OS is
//! final; there is no rationale flag to consult, so the negative cache is
//! never used here. The finality comes from the durable denial marker, not
//! from the request marker: a request that timed out or failed to dispatch
//! never showed a prompt the user could answer.

use tracing::debug;

use super::{StatusResolver, between_stages};
use crate::backend::NativeSignal;
use crate::identity::{CapabilitySet, Permission};
use crate::status::PermissionStatus;

/// Status of a non-authorized identity
pub(crate) async fn resolve_check(
    resolver: &StatusResolver,
    permission: &Permission,
    set: &CapabilitySet,
    signal: NativeSignal,
) -> PermissionStatus {
    let history = resolver.history();

    // "When in use" granted, "always" upgrade prompt not shown yet.
    if between_stages(set, signal) && !history.was_background_requested(permission).await {
        return PermissionStatus::NotDetermined;
    }

    if history.was_denial_observed(permission).await {
        PermissionStatus::DeniedForever
    } else if history.was_requested(permission).await {
        // Requested, never answered: retryable.
        PermissionStatus::Denied
    } else {
        PermissionStatus::NotDetermined
    }
}

/// Status after the user answered a native prompt negatively
pub(crate) async fn classify_denial(
    resolver: &StatusResolver,
    permission: &Permission,
) -> PermissionStatus {
    resolver.history().mark_denial_observed(permission).await;
    debug!(permission = %permission, "denial observed, no further prompts possible");
    PermissionStatus::DeniedForever
}
