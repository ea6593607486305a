//! Engine facade
//!
//! [`PermissionManager`] wires a [`PermissionBackend`] to the resolver and
//! coordinator and hands out flow controllers. It is cheap to clone; every
//! clone shares the same negative-result cache, request history and
//! request serialization.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rusty_permit::prelude::*;
//!
//! # async fn example(backend: Arc<dyn PermissionBackend>) -> Result<(), PermitError> {
//! let options = PermitOptions::builder()
//!     .platform(Platform::android("14")?)
//!     .build();
//! let history = Arc::new(JsonFileStore::new("/data/app/permissions.json"));
//! let manager = PermissionManager::new(backend, history.clone(), options)
//!     .with_recovery_store(history);
//!
//! let flow = manager.restore_flow(Permission::Camera).await;
//! flow.request(
//!     Some("The camera is used to scan receipts".to_string()),
//!     Some("Enable the camera in Settings".to_string()),
//!     || println!("camera ready"),
//! )
//! .await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::PermissionBackend;
use crate::coordinator::RequestCoordinator;
use crate::flow::PermissionFlowController;
use crate::group::GroupFlowController;
use crate::history::RequestHistory;
use crate::identity::Permission;
use crate::options::{PermitOptions, Platform};
use crate::recovery::DialogRecovery;
use crate::resolver::StatusResolver;
use crate::status::PermissionStatus;
use crate::store::KeyValueStore;

/// Shared entry point of the permission engine
#[derive(Clone)]
pub struct PermissionManager {
    resolver: Arc<StatusResolver>,
    coordinator: Arc<RequestCoordinator>,
    recovery: DialogRecovery,
}

impl PermissionManager {
    /// Create a manager
    ///
    /// `history_store` must survive process restarts for denial
    /// classification to stay correct across launches.
    pub fn new(
        backend: Arc<dyn PermissionBackend>,
        history_store: Arc<dyn KeyValueStore>,
        options: PermitOptions,
    ) -> Self {
        let history = RequestHistory::new(history_store, options.history_prefix.clone());
        let resolver = Arc::new(StatusResolver::new(
            options.platform.clone(),
            backend,
            history,
        ));
        let coordinator = Arc::new(RequestCoordinator::new(resolver.clone(), &options));

        debug!(platform = %options.platform.family(), version = %options.platform.version(), "permission manager ready");
        Self {
            resolver,
            coordinator,
            recovery: DialogRecovery::disabled(),
        }
    }

    /// Persist visible dialogs in `store` so controllers can restore them
    pub fn with_recovery_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.recovery = DialogRecovery::new(store);
        self
    }

    /// Running platform
    pub fn platform(&self) -> &Platform {
        self.resolver.platform()
    }

    /// Status resolver
    pub fn resolver(&self) -> &Arc<StatusResolver> {
        &self.resolver
    }

    /// Request coordinator
    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.coordinator
    }

    /// Dialog recovery in use
    pub fn recovery(&self) -> &DialogRecovery {
        &self.recovery
    }

    /// Current status of `permission`, without prompting
    pub async fn check_status(&self, permission: &Permission) -> PermissionStatus {
        self.resolver.check(permission).await
    }

    /// Statuses of several identities, checked in order
    pub async fn check_all(&self, permissions: &[Permission]) -> HashMap<Permission, PermissionStatus> {
        let mut statuses = HashMap::with_capacity(permissions.len());
        for permission in permissions {
            statuses.insert(permission.clone(), self.check_status(permission).await);
        }
        statuses
    }

    /// Prompt for `permission` if a native prompt can still change its status
    pub async fn request(&self, permission: &Permission) -> PermissionStatus {
        self.coordinator.request(permission).await
    }

    /// Open the OS settings screen for this app
    ///
    /// Failures are logged; there is nothing a caller could do about them.
    pub async fn open_settings(&self) {
        if let Err(e) = self.resolver.backend().open_app_settings().await {
            warn!(error = %e, "failed to open app settings");
        }
    }

    /// Idle flow controller for `permission`
    pub fn flow(&self, permission: Permission) -> PermissionFlowController {
        PermissionFlowController::new(self.clone(), permission)
    }

    /// Flow controller for `permission`, restoring a dialog left on screen
    pub async fn restore_flow(&self, permission: Permission) -> PermissionFlowController {
        PermissionFlowController::restore(self.clone(), permission).await
    }

    /// Idle group controller for `permissions`, processed in order
    pub fn group(&self, permissions: Vec<Permission>) -> GroupFlowController {
        GroupFlowController::new(self.clone(), permissions)
    }

    /// Group controller for `permissions`, restoring a dialog left on screen
    pub async fn restore_group(&self, permissions: Vec<Permission>) -> GroupFlowController {
        GroupFlowController::restore(self.clone(), permissions).await
    }
}

impl std::fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionManager")
            .field("platform", self.resolver.platform())
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
