//! Poll loop: fixed cadence while healthy, exponential backoff on failure.

use std::{sync::Arc, time::Duration};

use remote_exec_core::{EntryKind, OutputPoll, Phase, SessionEvent, SessionId, TransportError};

use crate::{
    SessionClient,
    client::{Effects, Inner, State},
};

/// Result of [`SessionClient::poll_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A get-output request was issued and its response applied.
    Polled,
    /// Another poll was outstanding; nothing was sent.
    AlreadyInFlight,
    /// No valid session to poll.
    Inactive,
}

pub(crate) enum PollStep {
    Continue(Duration),
    Finished,
    Skipped,
    Inactive,
}

/// Clears the in-flight flag if the request future is dropped early.
struct InFlight<'a> {
    inner: &'a Inner,
    epoch: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock();
        if state.epoch == self.epoch {
            state.poll_in_flight = false;
        }
    }
}

/// Poll until the session identified by `epoch` ends, fails or is superseded.
pub(crate) async fn run(inner: Arc<Inner>, epoch: u64) {
    let mut delay = Duration::ZERO;
    loop {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay = match inner.poll_once(epoch).await {
            PollStep::Continue(next) => next,
            PollStep::Skipped => inner.config.poll_interval,
            PollStep::Finished | PollStep::Inactive => break,
        };
    }

    let mut state = inner.lock();
    if state.epoch == epoch {
        state.poll_task = None;
    }
    tracing::debug!(instance = %inner.instance, epoch, "poll loop stopped");
}

impl Inner {
    pub(crate) async fn poll_once(&self, epoch: u64) -> PollStep {
        let session_id = {
            let mut state = self.lock();
            if state.epoch != epoch || !state.valid {
                return PollStep::Inactive;
            }
            if state.poll_in_flight {
                return PollStep::Skipped;
            }
            let Some(session_id) = state.session_id.clone() else {
                return PollStep::Inactive;
            };
            state.poll_in_flight = true;
            session_id
        };
        let mut in_flight = InFlight {
            inner: self,
            epoch,
            armed: true,
        };

        let result = self.transport.get_output(&session_id).await;

        let (step, effects) = {
            let mut state = self.lock();
            if state.epoch != epoch {
                tracing::debug!(%session_id, "discarding poll response for superseded session");
                return PollStep::Inactive;
            }
            state.poll_in_flight = false;
            in_flight.armed = false;
            let mut effects = Effects::for_state(&state);
            let step = match result {
                Ok(poll) => self.apply_poll(&mut state, &session_id, poll, &mut effects),
                Err(err) => self.apply_failure(&mut state, &session_id, &err, &mut effects),
            };
            self.publish(&state);
            (step, effects)
        };
        self.apply(effects);
        step
    }

    fn apply_poll(
        &self,
        state: &mut State,
        session_id: &SessionId,
        poll: OutputPoll,
        effects: &mut Effects,
    ) -> PollStep {
        if let Some(text) = poll.output.as_deref() {
            self.output.append(text, EntryKind::Output);
        }

        if poll.session_ended {
            let was_waiting = state.waiting_for_input;
            state.valid = false;
            state.waiting_for_input = false;
            state.busy = false;
            state.phase = Phase::SessionEnded;
            effects.set_input_enabled(false);
            if was_waiting {
                effects.emit(SessionEvent::InputRequired { waiting: false });
            }
            effects.emit(SessionEvent::SessionEnded {
                session_id: session_id.clone(),
            });
            tracing::info!(instance = %self.instance, %session_id, "session ended");
            return PollStep::Finished;
        }

        state.retry_count = 0;
        let waiting = poll.waiting_for_input;
        let was_waiting = std::mem::replace(&mut state.waiting_for_input, waiting);
        state.phase = if waiting {
            Phase::WaitingForInput
        } else {
            Phase::SessionActive
        };
        effects.set_input_enabled(waiting);
        if waiting != was_waiting {
            if waiting {
                effects.focus_input();
            }
            effects.emit(SessionEvent::InputRequired { waiting });
        }

        if state.valid {
            PollStep::Continue(self.config.poll_interval)
        } else {
            PollStep::Finished
        }
    }

    fn apply_failure(
        &self,
        state: &mut State,
        session_id: &SessionId,
        err: &TransportError,
        effects: &mut Effects,
    ) -> PollStep {
        let max_retries = self.config.max_retries;
        state.retry_count = state.retry_count.saturating_add(1).min(max_retries);

        if state.retry_count < max_retries {
            let attempt = state.retry_count;
            let delay = self.config.backoff_delay(attempt);
            tracing::warn!(
                instance = %self.instance,
                %session_id,
                attempt,
                ?delay,
                error = %err,
                "poll failed, backing off"
            );
            return PollStep::Continue(delay);
        }

        let was_waiting = state.waiting_for_input;
        state.valid = false;
        state.waiting_for_input = false;
        state.busy = false;
        state.phase = Phase::Failed;
        effects.set_input_enabled(false);
        if was_waiting {
            effects.emit(SessionEvent::InputRequired { waiting: false });
        }

        let reason = format!("Lost contact with the execution service: {err}");
        tracing::error!(instance = %self.instance, %session_id, max_retries, error = %err, "poll retries exhausted");
        self.output.append_error(&reason);
        effects.emit(SessionEvent::SessionFailed { reason });
        PollStep::Finished
    }
}

impl SessionClient {
    /// Issue one poll immediately.
    ///
    /// A no-op while another poll for the session is outstanding.
    pub async fn poll_now(&self) -> PollOutcome {
        let epoch = self.inner.lock().epoch;
        match self.inner.poll_once(epoch).await {
            PollStep::Continue(_) | PollStep::Finished => PollOutcome::Polled,
            PollStep::Skipped => PollOutcome::AlreadyInFlight,
            PollStep::Inactive => PollOutcome::Inactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use remote_exec_core::EventKind;

    use super::*;
    use crate::testing::{
        ScriptedTransport, ended, network_error, output, ready_client, settle, waiting,
    };

    #[tokio::test(start_paused = true)]
    async fn prompt_then_exit() {
        let transport = ScriptedTransport::new();
        transport.start_ok("s1");
        transport.poll(waiting("Enter name:"));
        transport.poll(ended());
        let (client, surface) = ready_client(&transport).await;

        client.execute_code("name = input('Enter name:')", "python").await.unwrap();
        settle(10).await;

        let entries = client.output().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Enter name:");
        assert_eq!(entries[0].kind, EntryKind::Output);
        assert!(surface.is_enabled());
        assert_eq!(surface.focuses(), 1);
        assert_eq!(client.phase(), Phase::WaitingForInput);

        settle(100).await;

        let snapshot = client.snapshot();
        assert_eq!(snapshot.phase, Phase::SessionEnded);
        assert!(!snapshot.valid);
        assert!(!snapshot.busy);
        assert!(!surface.is_enabled());

        settle(10_000).await;
        assert_eq!(transport.polls_issued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover_and_reset_counter() {
        let transport = ScriptedTransport::new();
        transport.poll_err(network_error());
        transport.poll_err(network_error());
        transport.poll(output("still here"));
        let (client, _surface) = ready_client(&transport).await;

        client.execute_code("print(1)", "python").await.unwrap();
        // Failures at t=0 and t=200ms; the next poll waits 400ms.
        settle(300).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.retry_count, 2);
        assert!(snapshot.valid);

        settle(400).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.retry_count, 0);
        assert!(snapshot.valid);
        assert_eq!(client.output().entries()[0].text, "still here");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_end_polling_for_good() {
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.poll_err(network_error());
        }
        let (client, surface) = ready_client(&transport).await;
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        client.subscribe(EventKind::SessionFailed, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        client.execute_code("print(1)", "python").await.unwrap();
        settle(1_000).await;

        let snapshot = client.snapshot();
        assert!(!snapshot.valid);
        assert!(!snapshot.busy);
        assert_eq!(snapshot.phase, Phase::Failed);
        assert_eq!(snapshot.retry_count, 3);
        assert_eq!(transport.polls_issued(), 3);
        assert!(!surface.is_enabled());

        let entries = client.output().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Error);
        assert_eq!(failures.lock().unwrap().len(), 1);

        settle(60_000).await;
        assert_eq!(transport.polls_issued(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_the_next_poll() {
        let transport = ScriptedTransport::new();
        transport.poll_err(network_error());
        let (client, _surface) = ready_client(&transport).await;

        client.execute_code("print(1)", "python").await.unwrap();
        settle(150).await;
        assert_eq!(transport.polls_issued(), 1);

        settle(100).await;
        assert_eq!(transport.polls_issued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_responses_keep_a_fixed_cadence() {
        let transport = ScriptedTransport::new();
        let (client, _surface) = ready_client(&transport).await;

        client.execute_code("import time; time.sleep(60)", "python").await.unwrap();
        settle(175).await;

        // t = 0, 50, 100, 150
        assert_eq!(transport.polls_issued(), 4);
        assert!(client.output().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_now_is_a_no_op_while_a_poll_is_outstanding() {
        let transport = ScriptedTransport::new();
        transport.poll_after(Duration::from_secs(1), output("late"));
        let (client, _surface) = ready_client(&transport).await;

        client.execute_code("print(1)", "python").await.unwrap();
        settle(10).await;

        assert_eq!(client.poll_now().await, PollOutcome::AlreadyInFlight);
        assert_eq!(transport.polls_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_now_without_session_is_inactive() {
        let transport = ScriptedTransport::new();
        let (client, _surface) = ready_client(&transport).await;

        assert_eq!(client.poll_now().await, PollOutcome::Inactive);
        assert_eq!(transport.polls_issued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_transitions_emit_input_required() {
        let transport = ScriptedTransport::new();
        transport.poll(waiting("?"));
        transport.poll(waiting("?"));
        transport.poll(output("thanks"));
        let (client, _surface) = ready_client(&transport).await;
        let toggles = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&toggles);
        client.subscribe(EventKind::InputRequired, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        client.execute_code("input('?')", "python").await.unwrap();
        settle(120).await;

        assert_eq!(
            *toggles.lock().unwrap(),
            vec![
                SessionEvent::InputRequired { waiting: true },
                SessionEvent::InputRequired { waiting: false },
            ]
        );
    }
}
