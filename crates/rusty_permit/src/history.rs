//! Durable "was this identity ever requested" ledger.
//!
//! The ledger is what separates "never asked" from "asked and denied" after an
//! app restart. Entries only ever go from absent to `true`; the engine has no
//! operation that resets them.

use std::sync::Arc;
use tracing::warn;

use crate::identity::Permission;
use crate::store::KeyValueStore;

const REQUESTED: &str = "true";
const BACKGROUND_SUFFIX: &str = ".background";
const DENIED_SUFFIX: &str = ".denied";

/// Request history backed by a [`KeyValueStore`]
#[derive(Clone)]
pub struct RequestHistory {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl RequestHistory {
    /// Create a ledger storing keys as `<prefix><identity id>`
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, permission: &Permission) -> String {
        format!("{}{}", self.prefix, permission.id())
    }

    fn background_key(&self, permission: &Permission) -> String {
        format!("{}{}{}", self.prefix, permission.id(), BACKGROUND_SUFFIX)
    }

    fn denied_key(&self, permission: &Permission) -> String {
        format!("{}{}{}", self.prefix, permission.id(), DENIED_SUFFIX)
    }

    async fn read(&self, key: &str) -> bool {
        match self.store.get(key).await {
            Ok(value) => value.as_deref() == Some(REQUESTED),
            Err(e) => {
                // Unreadable history looks like "never asked", which still lets the user ask.
                warn!(key = %key, error = %e, "failed to read request history");
                false
            }
        }
    }

    async fn write(&self, key: &str) {
        if let Err(e) = self.store.put(key, REQUESTED).await {
            warn!(key = %key, error = %e, "failed to persist request history");
        }
    }

    /// Whether `permission` was ever actively requested
    pub async fn was_requested(&self, permission: &Permission) -> bool {
        self.read(&self.key(permission)).await
    }

    /// Record that `permission` is being requested
    pub async fn mark_requested(&self, permission: &Permission) {
        self.write(&self.key(permission)).await;
    }

    /// Whether the background stage of a two-stage identity was ever requested
    pub async fn was_background_requested(&self, permission: &Permission) -> bool {
        self.read(&self.background_key(permission)).await
    }

    /// Record that the background stage of `permission` is being requested
    pub async fn mark_background_requested(&self, permission: &Permission) {
        self.write(&self.background_key(permission)).await;
    }

    /// Whether the OS ever answered a prompt for `permission` with a denial
    ///
    /// Timeouts and dispatch failures never set this; only an observed
    /// native answer does.
    pub async fn was_denial_observed(&self, permission: &Permission) -> bool {
        self.read(&self.denied_key(permission)).await
    }

    /// Record a denial answered by the OS for `permission`
    pub async fn mark_denial_observed(&self, permission: &Permission) {
        self.write(&self.denied_key(permission)).await;
    }
}

impl std::fmt::Debug for RequestHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHistory")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
