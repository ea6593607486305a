//! Android reconciliation rules.
//!
//! Android answers with plain grant flags plus the "should show request
//! permission rationale" flag. The flag is `true` only after a soft denial, so
//! a denial followed by `false` means the user ticked "don't ask again" (or
//! denied twice on Android 11+).

use tracing::warn;

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
    if let Some(cached) = resolver.negatives().get(permission) {
        return cached;
    }

    if between_stages(set, signal) {
        return if resolver.history().was_background_requested(permission).await {
            PermissionStatus::Denied
        } else {
            PermissionStatus::NotDetermined
        };
    }

    if should_show_rationale(resolver, permission, set).await {
        return PermissionStatus::Denied;
    }

    // A previous request means this is a denial, never "not asked yet".
    if resolver.history().was_requested(permission).await {
        PermissionStatus::Denied
    } else {
        PermissionStatus::NotDetermined
    }
}

/// Status after the user answered a native prompt negatively
pub(crate) async fn classify_denial(
    resolver: &StatusResolver,
    permission: &Permission,
    set: &CapabilitySet,
) -> PermissionStatus {
    let status = if should_show_rationale(resolver, permission, set).await {
        PermissionStatus::Denied
    } else {
        PermissionStatus::DeniedForever
    };
    resolver.negatives().record(permission, status);
    status
}

async fn should_show_rationale(
    resolver: &StatusResolver,
    permission: &Permission,
    set: &CapabilitySet,
) -> bool {
    match resolver.backend().should_show_rationale(permission, set).await {
        Ok(flag) => flag,
        Err(e) => {
            warn!(permission = %permission, error = %e, "rationale flag unavailable");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::NativeSignal;
    use crate::identity::{Capabilities, Permission, RequestStage};
    use crate::options::Platform;
    use crate::status::PermissionStatus;
    use crate::testing::{FakeBackend, resolver_for};

    fn android() -> Platform {
        Platform::android("14").unwrap()
    }

    #[tokio::test]
    async fn test_never_requested_is_not_determined() {
        let resolver = resolver_for(android(), FakeBackend::new());
        assert_eq!(
            resolver.check(&Permission::Camera).await,
            PermissionStatus::NotDetermined
        );
    }

    #[tokio::test]
    async fn test_requested_before_restart_is_denied() {
        let resolver = resolver_for(android(), FakeBackend::new());
        resolver.history().mark_requested(&Permission::Camera).await;

        // Fresh process: no cache, no rationale flag, only history.
        assert_eq!(resolver.check(&Permission::Camera).await, PermissionStatus::Denied);
    }

    #[tokio::test]
    async fn test_rationale_flag_means_denied() {
        let backend = FakeBackend::new();
        backend.set_rationale(&Permission::Contacts, true);
        let resolver = resolver_for(android(), backend);

        assert_eq!(
            resolver.check(&Permission::Contacts).await,
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_cached_negative_wins() {
        let resolver = resolver_for(android(), FakeBackend::new());
        resolver
            .negatives()
            .record(&Permission::Camera, PermissionStatus::DeniedForever);

        assert_eq!(
            resolver.check(&Permission::Camera).await,
            PermissionStatus::DeniedForever
        );
        assert_eq!(
            resolver.check(&Permission::Camera).await,
            PermissionStatus::DeniedForever
        );
    }

    #[tokio::test]
    async fn test_background_location_between_stages() {
        let backend = FakeBackend::new();
        backend.set_pair(&Permission::LocationAlways, true, false);
        let resolver = resolver_for(android(), backend);
        resolver.history().mark_requested(&Permission::LocationAlways).await;

        assert_eq!(
            resolver.check(&Permission::LocationAlways).await,
            PermissionStatus::NotDetermined
        );

        resolver
            .history()
            .mark_background_requested(&Permission::LocationAlways)
            .await;
        assert_eq!(
            resolver.check(&Permission::LocationAlways).await,
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_denial_classification_uses_rationale_flag() {
        let backend = FakeBackend::new();
        let resolver = resolver_for(android(), backend.clone());
        let set = match Permission::Camera.capabilities(resolver.platform()) {
            Capabilities::Native(set) => set,
            _ => unreachable!(),
        };

        backend.set_rationale(&Permission::Camera, true);
        let soft = resolver
            .classify_response(&Permission::Camera, &set, RequestStage::Full, NativeSignal::Binary(false))
            .await;
        assert_eq!(soft, PermissionStatus::Denied);
        assert_eq!(resolver.negatives().get(&Permission::Camera), Some(PermissionStatus::Denied));

        backend.set_rationale(&Permission::Camera, false);
        let hard = resolver
            .classify_response(&Permission::Camera, &set, RequestStage::Full, NativeSignal::Binary(false))
            .await;
        assert_eq!(hard, PermissionStatus::DeniedForever);
        assert_eq!(
            resolver.negatives().get(&Permission::Camera),
            Some(PermissionStatus::DeniedForever)
        );
    }
}
