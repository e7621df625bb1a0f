//! Scripted collaborators for the session tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use remote_exec_core::{
    ClientConfig, ExecutionTransport, InputSurface, OutputPoll, SessionId, TransportError,
};

use crate::SessionClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start { code: String, language: String },
    GetOutput(SessionId),
    SendInput(SessionId, String),
    End(SessionId),
}

enum Reply {
    Now(Result<OutputPoll, TransportError>),
    After(Duration, OutputPoll),
}

/// Transport that replays queued responses and records every request.
///
/// Once a queue is drained it falls back to success: auto-numbered session
/// ids for starts, empty output for polls.
#[derive(Default)]
pub struct ScriptedTransport {
    starts: Mutex<VecDeque<Result<SessionId, TransportError>>>,
    polls: Mutex<VecDeque<Reply>>,
    inputs: Mutex<VecDeque<TransportError>>,
    ends: Mutex<VecDeque<TransportError>>,
    start_delay: Mutex<Duration>,
    end_delay: Mutex<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn start_ok(&self, id: &str) {
        self.starts.lock().unwrap().push_back(Ok(SessionId::new(id)));
    }

    pub fn start_err(&self, err: TransportError) {
        self.starts.lock().unwrap().push_back(Err(err));
    }

    pub fn poll(&self, poll: OutputPoll) {
        self.polls.lock().unwrap().push_back(Reply::Now(Ok(poll)));
    }

    pub fn poll_err(&self, err: TransportError) {
        self.polls.lock().unwrap().push_back(Reply::Now(Err(err)));
    }

    pub fn poll_after(&self, delay: Duration, poll: OutputPoll) {
        self.polls.lock().unwrap().push_back(Reply::After(delay, poll));
    }

    pub fn input_err(&self, err: TransportError) {
        self.inputs.lock().unwrap().push_back(err);
    }

    pub fn end_err(&self, err: TransportError) {
        self.ends.lock().unwrap().push_back(err);
    }

    /// Every start-session call takes `delay` before answering.
    pub fn slow_starts(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = delay;
    }

    /// Every end-session call takes `delay` before answering.
    pub fn slow_ends(&self, delay: Duration) {
        *self.end_delay.lock().unwrap() = delay;
    }

    pub fn ended_sessions(&self) -> Vec<SessionId> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::End(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn starts_issued(&self) -> usize {
        self.count(|c| matches!(c, Call::Start { .. }))
    }

    pub fn polls_issued(&self) -> usize {
        self.count(|c| matches!(c, Call::GetOutput(_)))
    }

    pub fn inputs_sent(&self) -> usize {
        self.count(|c| matches!(c, Call::SendInput(..)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ExecutionTransport for ScriptedTransport {
    async fn start_session(
        &self,
        code: &str,
        language: &str,
    ) -> Result<SessionId, TransportError> {
        self.record(Call::Start {
            code: code.into(),
            language: language.into(),
        });
        let next = self.starts.lock().unwrap().pop_front();
        let delay = *self.start_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        next.unwrap_or_else(|| Ok(SessionId::new(format!("s{}", self.starts_issued()))))
    }

    async fn get_output(&self, session_id: &SessionId) -> Result<OutputPoll, TransportError> {
        self.record(Call::GetOutput(session_id.clone()));
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(Reply::Now(result)) => result,
            Some(Reply::After(delay, poll)) => {
                tokio::time::sleep(delay).await;
                Ok(poll)
            }
            None => Ok(OutputPoll::default()),
        }
    }

    async fn send_input(&self, session_id: &SessionId, input: &str) -> Result<(), TransportError> {
        self.record(Call::SendInput(session_id.clone(), input.into()));
        let next = self.inputs.lock().unwrap().pop_front();
        next.map_or(Ok(()), Err)
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record(Call::End(session_id.clone()));
        let next = self.ends.lock().unwrap().pop_front();
        let delay = *self.end_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        next.map_or(Ok(()), Err)
    }
}

/// Input surface that remembers what was done to it.
#[derive(Default)]
pub struct RecordingSurface {
    enabled: AtomicBool,
    clears: AtomicU32,
    focuses: AtomicU32,
}

impl RecordingSurface {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn focuses(&self) -> u32 {
        self.focuses.load(Ordering::SeqCst)
    }
}

impl InputSurface for RecordingSurface {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn focus(&self) {
        self.focuses.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn waiting(text: &str) -> OutputPoll {
    OutputPoll {
        output: Some(text.into()),
        waiting_for_input: true,
        session_ended: false,
    }
}

pub fn output(text: &str) -> OutputPoll {
    OutputPoll {
        output: Some(text.into()),
        ..OutputPoll::default()
    }
}

pub fn ended() -> OutputPoll {
    OutputPoll {
        session_ended: true,
        ..OutputPoll::default()
    }
}

pub fn network_error() -> TransportError {
    TransportError::Network("connection reset".into())
}

pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_poll_interval(Duration::from_millis(50))
        .with_retry_base_delay(Duration::from_millis(100))
        .with_max_retries(3)
        .with_init_retries(3, Duration::from_millis(10))
}

pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub async fn mount(client: &SessionClient, surface: &Arc<RecordingSurface>) {
    let mounted = Arc::clone(surface);
    let hooks = move || Some(Arc::clone(&mounted) as Arc<dyn InputSurface>);
    client.init(&hooks).await.unwrap();
}

pub async fn ready_client(transport: &Arc<ScriptedTransport>) -> (SessionClient, Arc<RecordingSurface>) {
    let client = SessionClient::new(Arc::clone(transport), test_config());
    let surface = Arc::new(RecordingSurface::default());
    mount(&client, &surface).await;
    (client, surface)
}
