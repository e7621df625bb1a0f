//! Session client: owns one remote execution session at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use remote_exec_core::{
    ClientConfig, EventBus, EventKind, ExecutionTransport, InputSurface, OutputSink,
    Phase, SessionEvent, SessionId, Subscription, UiHooks,
};
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{InitError, SubmitError, poll};

/// Point-in-time view of the client state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub session_id: Option<SessionId>,
    pub valid: bool,
    pub waiting_for_input: bool,
    pub busy: bool,
    pub retry_count: u32,
    /// Incremented every time the bound session is torn down.
    pub epoch: u64,
}

pub(crate) struct State {
    pub(crate) phase: Phase,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) valid: bool,
    pub(crate) waiting_for_input: bool,
    pub(crate) busy: bool,
    pub(crate) retry_count: u32,
    pub(crate) epoch: u64,
    pub(crate) poll_in_flight: bool,
    pub(crate) poll_task: Option<JoinHandle<()>>,
    pub(crate) input: Option<Arc<dyn InputSurface>>,
}

impl State {
    const fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            session_id: None,
            valid: false,
            waiting_for_input: false,
            busy: false,
            retry_count: 0,
            epoch: 0,
            poll_in_flight: false,
            poll_task: None,
            input: None,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            session_id: self.session_id.clone(),
            valid: self.valid,
            waiting_for_input: self.waiting_for_input,
            busy: self.busy,
            retry_count: self.retry_count,
            epoch: self.epoch,
        }
    }

    pub(crate) const fn accepts_input(&self) -> bool {
        self.waiting_for_input && self.valid
    }
}

/// Side effects collected under the state lock and applied after it is
/// released, so collaborators may call back into the client.
pub(crate) struct Effects {
    surface: Option<Arc<dyn InputSurface>>,
    input_enabled: Option<bool>,
    focus: bool,
    events: Vec<SessionEvent>,
}

impl Effects {
    pub(crate) fn for_state(state: &State) -> Self {
        Self {
            surface: state.input.clone(),
            input_enabled: None,
            focus: false,
            events: Vec::new(),
        }
    }

    pub(crate) const fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = Some(enabled);
    }

    pub(crate) const fn focus_input(&mut self) {
        self.focus = true;
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}

pub(crate) struct Inner {
    pub(crate) instance: Uuid,
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn ExecutionTransport>,
    pub(crate) output: Arc<OutputSink>,
    pub(crate) events: EventBus,
    state: Mutex<State>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Inner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the state to `watch_state` subscribers.
    pub(crate) fn publish(&self, state: &State) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    pub(crate) fn apply(&self, effects: Effects) {
        if let Some(surface) = &effects.surface {
            if let Some(enabled) = effects.input_enabled {
                surface.set_enabled(enabled);
            }
            if effects.focus {
                surface.focus();
            }
        }
        for event in &effects.events {
            self.events.emit(event);
        }
    }
}

/// Client for one remote execution session at a time.
///
/// Lifecycle: [`new`](Self::new) → [`init`](Self::init) →
/// [`execute_code`](Self::execute_code)* → [`dispose`](Self::dispose).
/// Clones share the same session; separate `new` calls are independent.
#[derive(Clone)]
pub struct SessionClient {
    pub(crate) inner: Arc<Inner>,
}

impl SessionClient {
    /// Create an uninitialized client.
    #[must_use]
    pub fn new(transport: impl ExecutionTransport + 'static, config: ClientConfig) -> Self {
        let state = State::new();
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let instance = Uuid::new_v4();
        tracing::debug!(%instance, "session client created");
        Self {
            inner: Arc::new(Inner {
                instance,
                config,
                transport: Arc::new(transport),
                output: Arc::new(OutputSink::new()),
                events: EventBus::new(),
                state: Mutex::new(state),
                snapshot_tx,
            }),
        }
    }

    /// Identifier used to tell instances apart in logs.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance
    }

    /// The output sink renderers should attach to.
    #[must_use]
    pub fn output(&self) -> Arc<OutputSink> {
        Arc::clone(&self.inner.output)
    }

    /// Register a lifecycle event handler.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, token: Subscription) -> bool {
        self.inner.events.unsubscribe(token)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Resolve once no submission is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.watch_state();
        let _ = rx.wait_for(|snapshot| !snapshot.busy).await;
    }

    /// Locate the UI hooks, retrying a bounded number of times.
    ///
    /// # Errors
    /// Returns `HooksUnavailable` if the input surface never appears, or
    /// `AlreadyInitialized` if the client was initialized before.
    pub async fn init<H>(&self, hooks: &H) -> Result<(), InitError>
    where
        H: UiHooks + ?Sized,
    {
        if self.phase() != Phase::Uninitialized {
            return Err(InitError::AlreadyInitialized);
        }

        let attempts = self.inner.config.init_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(surface) = hooks.input_surface() {
                surface.set_enabled(false);
                surface.clear();
                let mut state = self.inner.lock();
                if state.phase != Phase::Uninitialized {
                    return Err(InitError::AlreadyInitialized);
                }
                state.input = Some(surface);
                state.phase = Phase::Ready;
                self.inner.publish(&state);
                tracing::debug!(instance = %self.inner.instance, attempt, "session client initialized");
                return Ok(());
            }
            tracing::debug!(instance = %self.inner.instance, attempt, "ui hooks not mounted yet");
            if attempt < attempts {
                tokio::time::sleep(self.inner.config.init_retry_delay).await;
            }
        }

        tracing::error!(instance = %self.inner.instance, attempts, "ui hooks unavailable");
        Err(InitError::HooksUnavailable { attempts })
    }

    /// Submit `code` for execution and start polling its session.
    ///
    /// Returns once the session has started; output keeps arriving in the
    /// sink until the program ends. The client stays busy until then.
    ///
    /// # Errors
    /// Rejects the submission without touching state when the client is not
    /// initialized, already busy, or `code` is blank. Returns `Start` when the
    /// service refuses to start the session.
    pub async fn execute_code(&self, code: &str, language: &str) -> Result<SessionId, SubmitError> {
        let inner = &self.inner;
        let rejection = {
            let mut state = inner.lock();
            let rejection = if state.phase == Phase::Uninitialized {
                Some(SubmitError::NotInitialized)
            } else if state.busy {
                Some(SubmitError::Busy)
            } else if code.trim().is_empty() {
                Some(SubmitError::EmptyCode)
            } else {
                None
            };
            if rejection.is_none() {
                state.busy = true;
                inner.publish(&state);
            }
            rejection
        };
        if let Some(err) = rejection {
            tracing::debug!(instance = %inner.instance, reason = %err, "submission rejected");
            inner.events.emit(&SessionEvent::SubmissionRejected {
                reason: err.to_string(),
            });
            return Err(err);
        }
        inner.events.emit(&SessionEvent::SubmissionAccepted);

        let epoch = self.cleanup().await;

        {
            let mut state = inner.lock();
            if state.epoch != epoch {
                tracing::debug!(instance = %inner.instance, "submission superseded during cleanup");
                return Err(SubmitError::Superseded);
            }
            state.phase = Phase::SessionStarting;
            inner.publish(&state);
        }

        match inner.transport.start_session(code, language).await {
            Ok(session_id) => self.bind_session(epoch, session_id, language).await,
            Err(err) => {
                let current = {
                    let mut state = inner.lock();
                    let current = state.epoch == epoch;
                    if current {
                        state.phase = Phase::Failed;
                        state.busy = false;
                        inner.publish(&state);
                    }
                    current
                };
                if !current {
                    return Err(SubmitError::Superseded);
                }
                tracing::error!(instance = %inner.instance, error = %err, "failed to start session");
                inner
                    .output
                    .append_error(&format!("Failed to start session: {err}"));
                inner.events.emit(&SessionEvent::SessionFailed {
                    reason: err.to_string(),
                });
                Err(SubmitError::Start(err))
            }
        }
    }

    async fn bind_session(
        &self,
        epoch: u64,
        session_id: SessionId,
        language: &str,
    ) -> Result<SessionId, SubmitError> {
        let inner = &self.inner;
        let bound = {
            let mut state = inner.lock();
            let bound = state.epoch == epoch;
            if bound {
                state.session_id = Some(session_id.clone());
                state.valid = true;
                state.waiting_for_input = false;
                state.retry_count = 0;
                state.poll_in_flight = false;
                state.phase = Phase::SessionActive;
                inner.publish(&state);
            }
            bound
        };
        if !bound {
            tracing::warn!(instance = %inner.instance, %session_id, "session started after being superseded");
            if let Err(err) = inner.transport.end_session(&session_id).await {
                tracing::warn!(%session_id, error = %err, "failed to end superseded session");
            }
            return Err(SubmitError::Superseded);
        }

        tracing::info!(instance = %inner.instance, %session_id, language, "session started");
        inner.events.emit(&SessionEvent::SessionStarted {
            session_id: session_id.clone(),
        });

        let replaced = {
            let mut state = inner.lock();
            if state.epoch == epoch && state.valid {
                let task = tokio::spawn(poll::run(Arc::clone(inner), epoch));
                state.poll_task.replace(task)
            } else {
                None
            }
        };
        if let Some(task) = replaced {
            task.abort();
        }
        Ok(session_id)
    }

    /// Tear down the current session and reset to `Ready`.
    ///
    /// Ending the remote session is best-effort; local state is reset even
    /// if that request fails. Returns the epoch this cleanup moved to.
    async fn cleanup(&self) -> u64 {
        let inner = &self.inner;
        let (epoch, task, previous, surface) = {
            let mut state = inner.lock();
            state.epoch += 1;
            state.poll_in_flight = false;
            state.valid = false;
            state.waiting_for_input = false;
            state.retry_count = 0;
            if state.phase != Phase::Uninitialized {
                state.phase = Phase::Ready;
            }
            let previous = state.session_id.take();
            inner.publish(&state);
            (state.epoch, state.poll_task.take(), previous, state.input.clone())
        };
        if let Some(task) = task {
            task.abort();
        }

        // Nothing after the await below may touch the sink or the surface.
        inner.output.clear();
        if let Some(surface) = surface {
            surface.set_enabled(false);
            surface.clear();
        }

        if let Some(session_id) = previous {
            tracing::debug!(instance = %inner.instance, %session_id, "ending previous session");
            if let Err(err) = inner.transport.end_session(&session_id).await {
                tracing::warn!(instance = %inner.instance, %session_id, error = %err, "failed to end session");
            }
        }
        epoch
    }

    /// Clean up and return to `Uninitialized`.
    pub async fn dispose(&self) {
        self.cleanup().await;
        let mut state = self.inner.lock();
        state.busy = false;
        state.phase = Phase::Uninitialized;
        state.input = None;
        self.inner.publish(&state);
        tracing::debug!(instance = %self.inner.instance, "session client disposed");
    }
}
