//! Ordered multi-permission flow
//!
//! [`GroupFlowController`] walks a list of identities in order with the same
//! dialog policy as [`PermissionFlowController`](crate::flow::PermissionFlowController).
//! The first identity that does not end up granted halts the walk and
//! becomes the group's *active* identity; confirming its dialog resumes the
//! walk where it stopped. The success callback fires only once every
//! identity is granted.

use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::dialog::{DialogState, DialogUiState, GroupUiState};
use crate::flow::{GrantCallback, Step, decide};
use crate::identity::Permission;
use crate::manager::PermissionManager;
use crate::recovery::{DialogRecovery, DialogSnapshot};
use crate::status::PermissionStatus;

struct GroupInner {
    state: DialogState,
    /// Identities still to process; the head is the active one once halted
    queue: Vec<Permission>,
    active: Option<Permission>,
    rationale_shown: HashSet<Permission>,
    rationale_messages: HashMap<Permission, String>,
    settings_messages: HashMap<Permission, String>,
    on_all_granted: Option<GrantCallback>,
}

/// Dialog state machine over an ordered list of permissions
pub struct GroupFlowController {
    manager: PermissionManager,
    permissions: Vec<Permission>,
    scope: String,
    recovery: DialogRecovery,
    inner: Mutex<GroupInner>,
    ui: watch::Sender<GroupUiState>,
}

impl GroupFlowController {
    /// Create an idle controller for `permissions`, processed in the given order
    pub fn new(manager: PermissionManager, permissions: Vec<Permission>) -> Self {
        let recovery = manager.recovery().clone();
        let ids: Vec<&str> = permissions.iter().map(Permission::id).collect();
        let scope = format!("group_{}", ids.join("+"));
        let (ui, _) = watch::channel(GroupUiState::default());
        Self {
            manager,
            permissions,
            scope,
            recovery,
            inner: Mutex::new(GroupInner {
                state: DialogState::Idle,
                queue: Vec::new(),
                active: None,
                rationale_shown: HashSet::new(),
                rationale_messages: HashMap::new(),
                settings_messages: HashMap::new(),
                on_all_granted: None,
            }),
            ui,
        }
    }

    /// Create a controller and restore the dialog it showed before the process died
    ///
    /// The walk resumes from the restored active identity; identities before
    /// it were granted when the snapshot was taken.
    pub async fn restore(manager: PermissionManager, permissions: Vec<Permission>) -> Self {
        let controller = Self::new(manager, permissions);
        let Some(snapshot) = controller.recovery.restore(&controller.scope).await else {
            return controller;
        };
        let position = snapshot
            .active
            .as_deref()
            .and_then(|id| controller.permissions.iter().position(|p| p.id() == id));
        let Some(position) = position else {
            debug!(scope = %controller.scope, "snapshot names no identity of this group");
            return controller;
        };

        let active = controller.permissions[position].clone();
        debug!(scope = %controller.scope, permission = %active, "restoring group dialog after restart");
        let mut inner = controller.inner.lock().await;
        inner.queue = controller.permissions[position..].to_vec();
        if snapshot.rationale_shown {
            inner.rationale_shown.insert(active.clone());
        }
        match &snapshot.state {
            DialogState::Rationale { message: Some(m) } => {
                inner.rationale_messages.insert(active.clone(), m.clone());
            }
            DialogState::SettingsGuide { message: Some(m) } => {
                inner.settings_messages.insert(active.clone(), m.clone());
            }
            _ => {}
        }
        inner.active = Some(active);
        inner.state = snapshot.state;
        controller.publish(&inner);
        drop(inner);
        controller
    }

    /// Identities of this group, in processing order
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Current dialog view
    pub fn ui_state(&self) -> GroupUiState {
        self.ui.borrow().clone()
    }

    /// Stream of dialog views, starting with the current one
    pub fn ui_stream(&self) -> WatchStream<GroupUiState> {
        WatchStream::new(self.ui.subscribe())
    }

    /// Start a group cycle triggered by a user action
    ///
    /// Messages are looked up per identity; identities without one get a
    /// dialog with no text. Calls made while a cycle is in flight are ignored.
    pub async fn request<F>(
        &self,
        rationale_messages: HashMap<Permission, String>,
        settings_messages: HashMap<Permission, String>,
        on_all_granted: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!(scope = %self.scope, "group request ignored, another cycle is in flight");
            return;
        };

        inner.rationale_messages = rationale_messages;
        inner.settings_messages = settings_messages;
        inner.on_all_granted = Some(Box::new(on_all_granted));

        let statuses = self.manager.check_all(&self.permissions).await;
        inner.queue = self
            .permissions
            .iter()
            .filter(|p| statuses.get(*p) != Some(&PermissionStatus::Granted))
            .cloned()
            .collect();
        debug!(scope = %self.scope, pending = inner.queue.len(), "group cycle started");

        self.advance(&mut inner, None).await;
    }

    /// The user accepted the active identity's rationale
    pub async fn on_rationale_confirmed(&self) {
        let Some(mut inner) = self.try_signal("rationale_confirmed") else {
            return;
        };
        let active = match (&inner.state, &inner.active) {
            (DialogState::Rationale { .. }, Some(active)) => active.clone(),
            _ => {
                debug!(scope = %self.scope, "rationale confirmed while not shown");
                return;
            }
        };

        self.transition(&mut inner, DialogState::Awaiting).await;
        let status = self.manager.request(&active).await;
        self.advance(&mut inner, Some(status)).await;
    }

    /// The user accepted the settings guide: open the OS settings screen
    pub async fn on_settings_confirmed(&self) {
        let Some(mut inner) = self.try_signal("settings_confirmed") else {
            return;
        };
        inner.on_all_granted = None;
        inner.active = None;
        inner.queue.clear();
        self.transition(&mut inner, DialogState::Idle).await;
        drop(inner);

        self.manager.open_settings().await;
    }

    /// The user dismissed whichever dialog was shown
    ///
    /// Clears the active identity along with the dialog.
    pub async fn on_dismiss(&self) {
        let Some(mut inner) = self.try_signal("dismiss") else {
            return;
        };
        inner.on_all_granted = None;
        inner.active = None;
        inner.queue.clear();
        self.transition(&mut inner, DialogState::Idle).await;
    }

    /// Current status of every identity in the group
    pub async fn refresh_status(&self) -> HashMap<Permission, PermissionStatus> {
        self.manager.check_all(&self.permissions).await
    }

    /// Walk the queue until it empties or an identity halts it
    ///
    /// `answer` is the native answer for the head of the queue when the
    /// caller just prompted for it.
    async fn advance(&self, inner: &mut GroupInner, mut answer: Option<PermissionStatus>) {
        while let Some(permission) = inner.queue.first().cloned() {
            let (mut status, mut first_pass) = match answer.take() {
                Some(status) => (status, true),
                None => (self.manager.check_status(&permission).await, false),
            };
            inner.active = Some(permission.clone());

            loop {
                let shown = inner.rationale_shown.contains(&permission);
                match decide(status, first_pass, shown) {
                    Step::Granted => {
                        inner.queue.remove(0);
                        break;
                    }
                    Step::Request => {
                        self.transition(inner, DialogState::Awaiting).await;
                        status = self.manager.request(&permission).await;
                        first_pass = true;
                    }
                    Step::Silent => {
                        debug!(scope = %self.scope, permission = %permission, %status, "group halted");
                        self.transition(inner, DialogState::Idle).await;
                        return;
                    }
                    Step::Rationale => {
                        inner.rationale_shown.insert(permission.clone());
                        let message = inner.rationale_messages.get(&permission).cloned();
                        self.transition(inner, DialogState::Rationale { message }).await;
                        return;
                    }
                    Step::SettingsGuide => {
                        let message = inner.settings_messages.get(&permission).cloned();
                        self.transition(inner, DialogState::SettingsGuide { message }).await;
                        return;
                    }
                }
            }
        }

        inner.active = None;
        self.transition(inner, DialogState::Idle).await;
        if let Some(on_all_granted) = inner.on_all_granted.take() {
            debug!(scope = %self.scope, "every permission in group granted");
            on_all_granted();
        }
    }

    /// Lock for a UI signal, or `None` while a native prompt is up
    ///
    /// No dialog of the engine's own is visible during a native prompt, so
    /// a signal arriving then is stale and waiting out the prompt would only
    /// stall the caller.
    fn try_signal(&self, signal: &'static str) -> Option<MutexGuard<'_, GroupInner>> {
        match self.inner.try_lock() {
            Ok(inner) => Some(inner),
            Err(_) => {
                debug!(scope = %self.scope, signal, "signal ignored, native prompt in flight");
                None
            }
        }
    }

    /// `active` stays set while the walk is halted, dialog or not
    fn publish(&self, inner: &GroupInner) {
        self.ui.send_replace(GroupUiState {
            active: inner.active.clone(),
            dialog: DialogUiState::from(&inner.state),
        });
    }

    async fn transition(&self, inner: &mut GroupInner, state: DialogState) {
        inner.state = state;
        self.publish(inner);

        let snapshot = DialogSnapshot {
            state: inner.state.clone(),
            rationale_shown: inner
                .active
                .as_ref()
                .is_some_and(|p| inner.rationale_shown.contains(p)),
            active: inner.active.as_ref().map(|p| p.id().to_string()),
        };
        self.recovery.save(&self.scope, &snapshot).await;
    }
}

impl std::fmt::Debug for GroupFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupFlowController")
            .field("permissions", &self.permissions)
            .field("ui", &*self.ui.borrow())
            .finish_non_exhaustive()
    }
}
