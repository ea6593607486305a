//! Scripted native backend shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{NativeReply, NativeRequest, NativeSignal, PermissionBackend};
use crate::error::PermitError;
use crate::history::RequestHistory;
use crate::identity::{CapabilitySet, Permission, RequestStage};
use crate::options::Platform;
use crate::resolver::StatusResolver;
use crate::store::MemoryStore;

/// How the simulated user answers the next native prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Answer {
    Grant,
    /// Deny, OS keeps offering a rationale
    Deny,
    /// Deny with "don't ask again"
    DenyForever,
    /// Never answer (the reply is parked)
    Ignore,
    /// Dispatch fails
    DispatchError,
}

#[derive(Debug, Default, Clone, Copy)]
struct NativeState {
    foreground: bool,
    background: bool,
    rationale: bool,
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, NativeState>,
    answers: VecDeque<Answer>,
    parked: Vec<NativeReply>,
    undeclared: HashSet<String>,
    requests: Vec<NativeRequest>,
    checks: usize,
    settings_opened: usize,
    fail_checks: bool,
}

pub(crate) struct FakeBackend {
    inner: Mutex<Inner>,
    log: Arc<Mutex<Vec<String>>>,
    answer_delay: Duration,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Answers arrive `delay` after dispatch, from a spawned task
    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            log: Arc::new(Mutex::new(Vec::new())),
            answer_delay: delay,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub(crate) fn answer(&self, answer: Answer) {
        self.lock().answers.push_back(answer);
    }

    pub(crate) fn set_granted(&self, permission: &Permission, granted: bool) {
        self.set_pair(permission, granted, granted);
    }

    pub(crate) fn set_pair(&self, permission: &Permission, foreground: bool, background: bool) {
        let mut inner = self.lock();
        let state = inner.states.entry(permission.id().to_string()).or_default();
        state.foreground = foreground;
        state.background = background;
    }

    pub(crate) fn set_rationale(&self, permission: &Permission, rationale: bool) {
        let mut inner = self.lock();
        inner
            .states
            .entry(permission.id().to_string())
            .or_default()
            .rationale = rationale;
    }

    pub(crate) fn undeclare(&self, permission: &Permission) {
        self.lock().undeclared.insert(permission.id().to_string());
    }

    pub(crate) fn fail_checks(&self, fail: bool) {
        self.lock().fail_checks = fail;
    }

    pub(crate) fn check_count(&self) -> usize {
        self.lock().checks
    }

    pub(crate) fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub(crate) fn requests(&self) -> Vec<NativeRequest> {
        self.lock().requests.clone()
    }

    /// `start:<id>` at dispatch, `end:<id>` when the answer is delivered
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push_log(log: &Mutex<Vec<String>>, line: String) {
        log.lock().unwrap().push(line);
    }

    pub(crate) fn settings_opened(&self) -> usize {
        self.lock().settings_opened
    }

    fn apply(inner: &mut Inner, request: &NativeRequest, answer: Answer) -> NativeSignal {
        let state = inner.states.entry(request.permission.id().to_string()).or_default();
        match answer {
            Answer::Grant => {
                match request.stage {
                    RequestStage::Foreground => state.foreground = true,
                    RequestStage::Background | RequestStage::Full => {
                        state.foreground = true;
                        state.background = true;
                    }
                }
                state.rationale = false;
                NativeSignal::Binary(true)
            }
            Answer::Deny => {
                state.rationale = true;
                NativeSignal::Binary(false)
            }
            _ => {
                state.rationale = false;
                NativeSignal::Binary(false)
            }
        }
    }
}

#[async_trait]
impl PermissionBackend for FakeBackend {
    async fn check_native(
        &self,
        permission: &Permission,
        capabilities: &CapabilitySet,
    ) -> Result<NativeSignal, PermitError> {
        let mut inner = self.lock();
        inner.checks += 1;
        if inner.fail_checks {
            return Err(PermitError::Backend("check failed".to_string()));
        }
        let state = inner.states.get(permission.id()).copied().unwrap_or_default();
        if capabilities.is_two_stage() {
            Ok(NativeSignal::Pair {
                foreground: state.foreground,
                background: state.background,
            })
        } else {
            Ok(NativeSignal::Binary(state.foreground && state.background))
        }
    }

    async fn request_native(
        &self,
        request: NativeRequest,
        reply: NativeReply,
    ) -> Result<(), PermitError> {
        let id = request.permission.id().to_string();
        Self::push_log(&self.log, format!("start:{}", id));

        let signal = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            match inner.answers.pop_front().unwrap_or(Answer::Deny) {
                Answer::DispatchError => {
                    Self::push_log(&self.log, format!("end:{}", id));
                    return Err(PermitError::Backend("activity detached".to_string()));
                }
                Answer::Ignore => {
                    inner.parked.push(reply);
                    return Ok(());
                }
                answer => Self::apply(&mut inner, &request, answer),
            }
        };

        if self.answer_delay.is_zero() {
            Self::push_log(&self.log, format!("end:{}", id));
            reply.resolve(signal);
        } else {
            let delay = self.answer_delay;
            let log = self.log.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                Self::push_log(&log, format!("end:{}", id));
                reply.resolve(signal);
            });
        }
        Ok(())
    }

    async fn should_show_rationale(
        &self,
        permission: &Permission,
        _capabilities: &CapabilitySet,
    ) -> Result<bool, PermitError> {
        let inner = self.lock();
        Ok(inner.states.get(permission.id()).is_some_and(|s| s.rationale))
    }

    async fn verify_declarations(
        &self,
        permission: &Permission,
        capabilities: &CapabilitySet,
    ) -> Result<(), PermitError> {
        let inner = self.lock();
        if inner.undeclared.contains(permission.id()) {
            return Err(PermitError::MissingDeclaration {
                permission: permission.id().to_string(),
                entry: capabilities.foreground.first().cloned().unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn open_app_settings(&self) -> Result<(), PermitError> {
        self.lock().settings_opened += 1;
        Ok(())
    }
}

pub(crate) fn resolver_for(platform: Platform, backend: Arc<FakeBackend>) -> StatusResolver {
    let history = RequestHistory::new(Arc::new(MemoryStore::new()), "permission_requested_");
    StatusResolver::new(platform, backend, history)
}

/// Success callback counting its invocations
pub(crate) fn grant_flag() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    (calls, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}
