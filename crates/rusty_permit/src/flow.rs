//! Per-permission dialog flow
//!
//! [`PermissionFlowController`] drives one identity from a user action to
//! either the success callback or one of the engine's own dialogs:
//!
//! ```text
//!             request()
//!                │
//!   Idle ───────→ check ──Granted──────────────→ on_granted(), Idle
//!                │
//!                ├─NotDetermined→ Awaiting → coordinator.request()
//!                │                              │ (first pass)
//!                │                              ├─Granted → on_granted(), Idle
//!                │                              └─anything else → Idle, silently
//!                ├─Denied───────→ Rationale ──on_rationale_confirmed()──→ Awaiting …
//!                └─DeniedForever→ SettingsGuide ──on_settings_confirmed()──→ OS settings
//! ```
//!
//! A negative answer right after a fresh native prompt never opens a dialog
//! of the engine's own; the user just saw the system dialog. The next
//! explicit `request()` surfaces the rationale or settings guide. The one
//! exception is a permanent denial after this controller already showed a
//! rationale: the settings guide follows immediately.

use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::dialog::{DialogState, DialogUiState};
use crate::identity::Permission;
use crate::manager::PermissionManager;
use crate::recovery::{DialogRecovery, DialogSnapshot};
use crate::status::PermissionStatus;

/// Success callback, invoked at most once
pub type GrantCallback = Box<dyn FnOnce() + Send + 'static>;

/// What a controller does with a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Granted,
    Request,
    Silent,
    Rationale,
    SettingsGuide,
}

/// Dialog policy shared by the single and group controllers
///
/// `first_pass` is set when `status` is the answer to a native prompt issued
/// in this very cycle.
pub(crate) fn decide(status: PermissionStatus, first_pass: bool, rationale_shown: bool) -> Step {
    match status {
        PermissionStatus::Granted => Step::Granted,
        // Foreground half of a two-stage identity just granted.
        PermissionStatus::NotDetermined if first_pass => Step::Silent,
        PermissionStatus::NotDetermined => Step::Request,
        PermissionStatus::Denied if first_pass => Step::Silent,
        PermissionStatus::Denied => Step::Rationale,
        PermissionStatus::DeniedForever if !first_pass || rationale_shown => Step::SettingsGuide,
        PermissionStatus::DeniedForever => Step::Silent,
    }
}

struct FlowInner {
    state: DialogState,
    rationale_shown: bool,
    rationale_message: Option<String>,
    settings_message: Option<String>,
    on_granted: Option<GrantCallback>,
}

/// Dialog state machine for a single permission
///
/// All methods take `&self`; share the controller behind an `Arc` between
/// the UI and whatever task drives it. Nothing here returns an error: every
/// outcome is a status or a dialog state.
pub struct PermissionFlowController {
    manager: PermissionManager,
    permission: Permission,
    recovery: DialogRecovery,
    inner: Mutex<FlowInner>,
    ui: watch::Sender<DialogUiState>,
    status: watch::Sender<Option<PermissionStatus>>,
}

impl PermissionFlowController {
    /// Create an idle controller for `permission`
    pub fn new(manager: PermissionManager, permission: Permission) -> Self {
        let recovery = manager.recovery().clone();
        let (ui, _) = watch::channel(DialogUiState::default());
        let (status, _) = watch::channel(None);
        Self {
            manager,
            permission,
            recovery,
            inner: Mutex::new(FlowInner {
                state: DialogState::Idle,
                rationale_shown: false,
                rationale_message: None,
                settings_message: None,
                on_granted: None,
            }),
            ui,
            status,
        }
    }

    /// Create a controller and restore the dialog it showed before the process died
    ///
    /// Only the store is consulted; the native layer is not touched.
    pub async fn restore(manager: PermissionManager, permission: Permission) -> Self {
        let controller = Self::new(manager, permission);
        if let Some(snapshot) = controller.recovery.restore(controller.permission.id()).await {
            debug!(permission = %controller.permission, "restoring dialog after restart");
            let mut inner = controller.inner.lock().await;
            inner.rationale_shown = snapshot.rationale_shown;
            match &snapshot.state {
                DialogState::Rationale { message } => inner.rationale_message = message.clone(),
                DialogState::SettingsGuide { message } => inner.settings_message = message.clone(),
                DialogState::Idle | DialogState::Awaiting => {}
            }
            inner.state = snapshot.state;
            controller.ui.send_replace(DialogUiState::from(&inner.state));
        }
        controller
    }

    /// Identity this controller drives
    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    /// Current dialog view
    pub fn ui_state(&self) -> DialogUiState {
        self.ui.borrow().clone()
    }

    /// Stream of dialog views, starting with the current one
    pub fn ui_stream(&self) -> WatchStream<DialogUiState> {
        WatchStream::new(self.ui.subscribe())
    }

    /// Last status observed by this controller
    pub fn status(&self) -> Option<PermissionStatus> {
        *self.status.borrow()
    }

    /// Stream of observed statuses
    pub fn status_stream(&self) -> WatchStream<Option<PermissionStatus>> {
        WatchStream::new(self.status.subscribe())
    }

    /// Start a request cycle triggered by a user action
    ///
    /// A call made while a native prompt from an earlier call is still up is
    /// ignored, so rapid double taps never stack dialogs.
    pub async fn request<F>(
        &self,
        rationale_message: Option<String>,
        settings_message: Option<String>,
        on_granted: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!(permission = %self.permission, "request ignored, another cycle is in flight");
            return;
        };

        inner.rationale_message = rationale_message;
        inner.settings_message = settings_message;
        inner.on_granted = Some(Box::new(on_granted));

        let status = self.manager.check_status(&self.permission).await;
        self.run(&mut inner, status, false).await;
    }

    /// The user accepted the rationale: ask the OS again
    pub async fn on_rationale_confirmed(&self) {
        let Some(mut inner) = self.try_signal("rationale_confirmed") else {
            return;
        };
        if !matches!(inner.state, DialogState::Rationale { .. }) {
            debug!(permission = %self.permission, "rationale confirmed while not shown");
            return;
        }

        self.transition(&mut inner, DialogState::Idle).await;
        self.transition(&mut inner, DialogState::Awaiting).await;
        let status = self.manager.request(&self.permission).await;
        self.run(&mut inner, status, true).await;
        drop(inner);

        self.refresh_status().await;
    }

    /// The user accepted the settings guide: open the OS settings screen
    ///
    /// The status is not re-checked; call [`refresh_status`](Self::refresh_status)
    /// once the app is back in the foreground.
    pub async fn on_settings_confirmed(&self) {
        let Some(mut inner) = self.try_signal("settings_confirmed") else {
            return;
        };
        inner.on_granted = None;
        self.transition(&mut inner, DialogState::Idle).await;
        drop(inner);

        self.manager.open_settings().await;
    }

    /// The user dismissed whichever dialog was shown
    pub async fn on_dismiss(&self) {
        let Some(mut inner) = self.try_signal("dismiss") else {
            return;
        };
        inner.on_granted = None;
        self.transition(&mut inner, DialogState::Idle).await;
    }

    /// Re-check the status and publish it, independent of the dialog flow
    pub async fn refresh_status(&self) -> PermissionStatus {
        let status = self.manager.check_status(&self.permission).await;
        self.status.send_replace(Some(status));
        status
    }

    /// Lock for a UI signal, or `None` while a native prompt is up
    ///
    /// No dialog of the engine's own is visible during a native prompt, so
    /// a signal arriving then is stale and waiting out the prompt would only
    /// stall the caller.
    fn try_signal(&self, signal: &'static str) -> Option<MutexGuard<'_, FlowInner>> {
        match self.inner.try_lock() {
            Ok(inner) => Some(inner),
            Err(_) => {
                debug!(permission = %self.permission, signal, "signal ignored, native prompt in flight");
                None
            }
        }
    }

    async fn run(&self, inner: &mut FlowInner, mut status: PermissionStatus, mut first_pass: bool) {
        loop {
            match decide(status, first_pass, inner.rationale_shown) {
                Step::Granted => {
                    if let Some(on_granted) = inner.on_granted.take() {
                        on_granted();
                    }
                    self.transition(inner, DialogState::Idle).await;
                    break;
                }
                Step::Request => {
                    self.transition(inner, DialogState::Awaiting).await;
                    status = self.manager.request(&self.permission).await;
                    first_pass = true;
                }
                Step::Silent => {
                    self.transition(inner, DialogState::Idle).await;
                    break;
                }
                Step::Rationale => {
                    inner.rationale_shown = true;
                    let message = inner.rationale_message.clone();
                    self.transition(inner, DialogState::Rationale { message }).await;
                    break;
                }
                Step::SettingsGuide => {
                    let message = inner.settings_message.clone();
                    self.transition(inner, DialogState::SettingsGuide { message }).await;
                    break;
                }
            }
        }

        debug!(permission = %self.permission, %status, state = ?inner.state, "request cycle finished");
        self.status.send_replace(Some(status));
    }

    async fn transition(&self, inner: &mut FlowInner, state: DialogState) {
        if inner.state == state {
            return;
        }
        inner.state = state;
        self.ui.send_replace(DialogUiState::from(&inner.state));

        let snapshot = DialogSnapshot {
            state: inner.state.clone(),
            rationale_shown: inner.rationale_shown,
            active: None,
        };
        self.recovery.save(self.permission.id(), &snapshot).await;
    }
}

impl std::fmt::Debug for PermissionFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionFlowController")
            .field("permission", &self.permission)
            .field("ui", &*self.ui.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{PermitOptions, Platform};
    use crate::store::MemoryStore;
    use crate::testing::{Answer, FakeBackend, grant_flag};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn manager(platform: Platform, backend: Arc<FakeBackend>) -> PermissionManager {
        let options = PermitOptions::builder().platform(platform).build();
        PermissionManager::new(backend, Arc::new(MemoryStore::new()), options)
    }

    fn android() -> Platform {
        Platform::android("14").unwrap()
    }

    fn messages() -> (Option<String>, Option<String>) {
        (
            Some("Camera is needed to scan receipts".to_string()),
            Some("Enable the camera in Settings".to_string()),
        )
    }

    #[test]
    fn test_decide_table() {
        use PermissionStatus::*;
        assert_eq!(decide(Granted, false, false), Step::Granted);
        assert_eq!(decide(Granted, true, false), Step::Granted);
        assert_eq!(decide(NotDetermined, false, false), Step::Request);
        assert_eq!(decide(NotDetermined, true, false), Step::Silent);
        assert_eq!(decide(Denied, false, false), Step::Rationale);
        assert_eq!(decide(Denied, true, true), Step::Silent);
        assert_eq!(decide(DeniedForever, false, false), Step::SettingsGuide);
        assert_eq!(decide(DeniedForever, true, false), Step::Silent);
        assert_eq!(decide(DeniedForever, true, true), Step::SettingsGuide);
    }

    #[tokio::test]
    async fn test_already_granted_invokes_callback_once() {
        let backend = FakeBackend::new();
        backend.set_granted(&Permission::Camera, true);
        let flow = PermissionFlowController::new(manager(android(), backend.clone()), Permission::Camera);

        let (calls, on_granted) = grant_flag();
        let (rationale, settings) = messages();
        flow.request(rationale, settings, on_granted).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flow.ui_state(), DialogUiState::default());
        assert_eq!(flow.status(), Some(PermissionStatus::Granted));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_denial_stays_silent_then_rationale_on_next_tap() {
        let backend = FakeBackend::new();
        backend.answer(Answer::Deny);
        let flow = PermissionFlowController::new(manager(android(), backend.clone()), Permission::Camera);

        let (calls, on_granted) = grant_flag();
        let (rationale, settings) = messages();
        flow.request(rationale.clone(), settings.clone(), on_granted).await;

        assert!(!flow.ui_state().visible);
        assert_eq!(flow.status(), Some(PermissionStatus::Denied));

        let (_, on_granted) = grant_flag();
        flow.request(rationale.clone(), settings, on_granted).await;
        let ui = flow.ui_state();
        assert!(ui.visible && ui.show_rationale && !ui.show_settings_guide);
        assert_eq!(ui.rationale_message, rationale);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_rationale_confirmed_then_granted() {
        let backend = FakeBackend::new();
        backend.set_rationale(&Permission::Camera, true);
        backend.answer(Answer::Grant);
        let flow = PermissionFlowController::new(manager(android(), backend.clone()), Permission::Camera);

        let (calls, on_granted) = grant_flag();
        let (rationale, settings) = messages();
        flow.request(rationale, settings, on_granted).await;
        assert!(flow.ui_state().show_rationale);

        flow.on_rationale_confirmed().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flow.ui_state().visible);
        assert_eq!(flow.status(), Some(PermissionStatus::Granted));
    }

    #[tokio::test]
    async fn test_permanent_denial_after_rationale_shows_settings_guide() {
        let backend = FakeBackend::new();
        backend.set_rationale(&Permission::Camera, true);
        backend.answer(Answer::DenyForever);
        let flow = PermissionFlowController::new(manager(android(), backend.clone()), Permission::Camera);

        let (rationale, settings) = messages();
        flow.request(rationale, settings.clone(), || {}).await;
        flow.on_rationale_confirmed().await;

        let ui = flow.ui_state();
        assert!(ui.visible && ui.show_settings_guide && !ui.show_rationale);
        assert_eq!(ui.settings_message, settings);
        assert_eq!(flow.status(), Some(PermissionStatus::DeniedForever));
    }

    #[tokio::test]
    async fn test_ios_first_denial_is_silent_then_settings_guide() {
        let backend = FakeBackend::new();
        backend.answer(Answer::Deny);
        let flow = PermissionFlowController::new(
            manager(Platform::ios("17").unwrap(), backend.clone()),
            Permission::Camera,
        );

        let (rationale, settings) = messages();
        flow.request(rationale.clone(), settings.clone(), || {}).await;
        assert!(!flow.ui_state().visible);

        flow.request(rationale, settings, || {}).await;
        assert!(flow.ui_state().show_settings_guide);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_settings_confirmed_opens_settings_without_recheck() {
        let backend = FakeBackend::new();
        let manager = manager(android(), backend.clone());
        manager
            .resolver()
            .negatives()
            .record(&Permission::Camera, PermissionStatus::DeniedForever);
        let flow = PermissionFlowController::new(manager, Permission::Camera);

        let (calls, on_granted) = grant_flag();
        flow.request(None, None, on_granted).await;
        assert!(flow.ui_state().show_settings_guide);

        let checks = backend.check_count();
        flow.on_settings_confirmed().await;
        assert_eq!(backend.settings_opened(), 1);
        assert_eq!(backend.check_count(), checks);
        assert!(!flow.ui_state().visible);

        backend.set_granted(&Permission::Camera, true);
        assert_eq!(flow.refresh_status().await, PermissionStatus::Granted);
        assert_eq!(flow.status(), Some(PermissionStatus::Granted));
        // The callback was dropped with the dialog.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dismiss_drops_callback() {
        let backend = FakeBackend::new();
        backend.set_rationale(&Permission::Camera, true);
        backend.answer(Answer::Grant);
        let flow = PermissionFlowController::new(manager(android(), backend.clone()), Permission::Camera);

        let (calls, on_granted) = grant_flag();
        flow.request(None, None, on_granted).await;
        flow.on_dismiss().await;
        assert!(!flow.ui_state().visible);

        // Stray confirm after dismissal does nothing.
        flow.on_rationale_confirmed().await;
        assert_eq!(backend.request_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restored_controller_shows_rationale_without_native_calls() {
        let backend = FakeBackend::new();
        let store = Arc::new(MemoryStore::new());
        let manager = manager(android(), backend.clone()).with_recovery_store(store);

        let snapshot = DialogSnapshot {
            state: DialogState::Rationale {
                message: Some("We need the camera".to_string()),
            },
            rationale_shown: true,
            active: None,
        };
        manager.recovery().save("camera", &snapshot).await;

        let flow = PermissionFlowController::restore(manager, Permission::Camera).await;
        let ui = flow.ui_state();
        assert!(ui.visible && ui.show_rationale);
        assert_eq!(ui.rationale_message.as_deref(), Some("We need the camera"));
        assert_eq!(backend.check_count(), 0);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_location_always_foreground_grant_is_silent() {
        let backend = FakeBackend::new();
        backend.answer(Answer::Grant);
        backend.answer(Answer::Grant);
        let flow = PermissionFlowController::new(
            manager(android(), backend.clone()),
            Permission::LocationAlways,
        );

        let (calls, on_granted) = grant_flag();
        flow.request(None, None, on_granted).await;
        assert!(!flow.ui_state().visible);
        assert_eq!(flow.status(), Some(PermissionStatus::NotDetermined));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (calls, on_granted) = grant_flag();
        flow.request(None, None, on_granted).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_do_not_wait_for_native_prompt() {
        let backend = FakeBackend::new();
        backend.answer(Answer::Ignore);
        let flow = Arc::new(PermissionFlowController::new(
            manager(android(), backend.clone()),
            Permission::Camera,
        ));

        let task = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.request(None, None, || {}).await })
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(flow.manager.coordinator().pending().len(), 1);

        let quick = std::time::Duration::from_millis(10);
        assert!(tokio::time::timeout(quick, flow.on_dismiss()).await.is_ok());
        assert!(tokio::time::timeout(quick, flow.on_settings_confirmed()).await.is_ok());
        assert_eq!(backend.settings_opened(), 0);

        task.await.unwrap();
        assert_eq!(flow.status(), Some(PermissionStatus::Denied));
        assert!(!flow.ui_state().visible);
    }
}
