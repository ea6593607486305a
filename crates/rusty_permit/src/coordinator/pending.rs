//! Pending native request tracking
//!
//! This module manages the lifecycle of dispatched native permission requests,
//! tracking each one by a UUID and routing the platform's answer back to the
//! waiting coordinator via a oneshot channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  register()  │ → Generate UUID, insert sender + timestamp
//! └──────┬───────┘
//!        │
//!        ├─ Pending: HashMap<String, PendingEntry>
//!        │
//!        ↓
//! ┌──────────────┐
//! │  complete()  │ → Remove entry, send outcome (NativeReply)
//! └──────────────┘
//!        │
//!        ├─ cancel()       → timeout / cancelled awaiter
//!        └─ sweep_stale()  → abandoned entries older than the threshold
//! ```
//!
//! The map is guarded by a `std::sync::Mutex` that is never held across an
//! await point, so cleanup also works from `Drop` implementations.
//!
//! # Example
//!
//! ```
//! use rusty_permit::backend::NativeSignal;
//! use rusty_permit::coordinator::pending::PendingRequests;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pending = PendingRequests::new();
//! let (id, rx) = pending.register("camera");
//!
//! // Later, when the platform callback fires:
//! pending.complete(&id, Ok(NativeSignal::Binary(true)));
//!
//! let outcome = rx.await.unwrap();
//! assert_eq!(outcome.unwrap(), NativeSignal::Binary(true));
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::backend::NativeSignal;
use crate::error::PermitError;

/// Value written into a pending request's result slot
pub type NativeOutcome = Result<NativeSignal, PermitError>;

struct PendingEntry {
    permission: String,
    created_at: Instant,
    sender: oneshot::Sender<NativeOutcome>,
}

/// Tracks native requests awaiting an answer
///
/// Cloning is cheap; all clones share one map.
#[derive(Clone, Default)]
pub struct PendingRequests {
    /// Map of request_id → pending entry
    inner: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingRequests {
    /// Create a new empty pending requests tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a fresh entry for `permission` and return its id and result slot
    pub fn register(&self, permission: &str) -> (String, oneshot::Receiver<NativeOutcome>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.insert(id.clone(), permission, tx);
        (id, rx)
    }

    /// Insert a pending entry under a caller-chosen id
    ///
    /// An existing entry with the same id is replaced; its awaiter observes a
    /// closed channel.
    pub fn insert(&self, id: String, permission: &str, sender: oneshot::Sender<NativeOutcome>) {
        let entry = PendingEntry {
            permission: permission.to_string(),
            created_at: Instant::now(),
            sender,
        };
        self.entries().insert(id, entry);
    }

    /// Complete a pending request with the native outcome
    ///
    /// # Returns
    ///
    /// * `true` - Request was found and the outcome was delivered
    /// * `false` - Request was not found or its receiver was dropped
    pub fn complete(&self, id: &str, outcome: NativeOutcome) -> bool {
        let entry = self.entries().remove(id);
        match entry {
            Some(entry) => entry.sender.send(outcome).is_ok(),
            None => {
                debug!(request_id = %id, "answer for unknown or expired native request");
                false
            }
        }
    }

    /// Remove a pending request without delivering anything
    ///
    /// Returns `true` if an entry was removed.
    pub fn cancel(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Discard entries older than `max_age`
    ///
    /// Returns the number of entries removed. A discarded entry's awaiter, if
    /// any is left, observes a closed channel.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|id, entry| {
            let keep = now.saturating_duration_since(entry.created_at) <= max_age;
            if !keep {
                debug!(request_id = %id, permission = %entry.permission, "discarding stale native request");
            }
            keep
        });
        before - entries.len()
    }

    /// Whether an entry with `id` is still pending
    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no request is pending
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Removes its entry when dropped
///
/// Held by the coordinator across the await, so an externally cancelled
/// request still leaves no entry behind.
pub(crate) struct PendingGuard {
    pending: PendingRequests,
    id: String,
}

impl PendingGuard {
    pub(crate) fn new(pending: PendingRequests, id: String) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.cancel(&self.id);
    }
}
