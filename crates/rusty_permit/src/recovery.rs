//! Dialog recovery across process death.
//!
//! A controller showing a rationale or settings guide saves a
//! [`DialogSnapshot`]; a controller constructed later against the same store
//! restores it without touching the native layer. With the default
//! [`NoopStore`](crate::store::NoopStore) nothing is ever restored, which only
//! loses this affordance.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dialog::DialogState;
use crate::store::{KeyValueStore, NoopStore};

const KEY_PREFIX: &str = "permission_dialog_";

/// Persisted dialog state of one controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSnapshot {
    /// Visible dialog
    pub state: DialogState,
    /// Whether this controller already showed a rationale
    #[serde(default)]
    pub rationale_shown: bool,
    /// Id of the identity a group controller halted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
}

/// Saves and restores [`DialogSnapshot`]s in a [`KeyValueStore`]
#[derive(Clone)]
pub struct DialogRecovery {
    store: Arc<dyn KeyValueStore>,
}

impl DialogRecovery {
    /// Recovery backed by `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Recovery that never restores anything
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopStore))
    }

    fn key(scope: &str) -> String {
        format!("{}{}", KEY_PREFIX, scope)
    }

    /// Persist `snapshot` for `scope`; non-visible states clear it instead
    pub async fn save(&self, scope: &str, snapshot: &DialogSnapshot) {
        if !snapshot.state.is_visible() {
            self.clear(scope).await;
            return;
        }

        let key = Self::key(scope);
        let result = match serde_json::to_string(snapshot) {
            Ok(json) => self.store.put(&key, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(key = %key, error = %e, "failed to save dialog snapshot");
        }
    }

    /// Snapshot saved for `scope`, if any
    ///
    /// Unreadable or malformed snapshots are logged and treated as absent.
    pub async fn restore(&self, scope: &str) -> Option<DialogSnapshot> {
        let key = Self::key(scope);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read dialog snapshot");
                return None;
            }
        };

        match serde_json::from_str::<DialogSnapshot>(&raw) {
            Ok(snapshot) if snapshot.state.is_visible() => {
                debug!(key = %key, "restored dialog snapshot");
                Some(snapshot)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding malformed dialog snapshot");
                None
            }
        }
    }

    /// Forget the snapshot for `scope`
    pub async fn clear(&self, scope: &str) {
        let key = Self::key(scope);
        if let Err(e) = self.store.remove(&key).await {
            warn!(key = %key, error = %e, "failed to clear dialog snapshot");
        }
    }
}

impl Default for DialogRecovery {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for DialogRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogRecovery").finish_non_exhaustive()
    }
}
