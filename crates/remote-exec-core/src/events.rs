//! Session lifecycle events exposed to the surrounding UI.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use crate::SessionId;

/// Event emitted by a session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SubmissionAccepted,
    SubmissionRejected { reason: String },
    SessionStarted { session_id: SessionId },
    SessionFailed { reason: String },
    SessionEnded { session_id: SessionId },
    /// The remote program started or stopped waiting for input.
    InputRequired { waiting: bool },
}

/// Discriminant used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SubmissionAccepted,
    SubmissionRejected,
    SessionStarted,
    SessionFailed,
    SessionEnded,
    InputRequired,
    /// Matches every event.
    Any,
}

impl SessionEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::SubmissionAccepted => EventKind::SubmissionAccepted,
            Self::SubmissionRejected { .. } => EventKind::SubmissionRejected,
            Self::SessionStarted { .. } => EventKind::SessionStarted,
            Self::SessionFailed { .. } => EventKind::SessionFailed,
            Self::SessionEnded { .. } => EventKind::SessionEnded,
            Self::InputRequired { .. } => EventKind::InputRequired,
        }
    }
}

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Entry {
    token: Subscription,
    kind: EventKind,
    handler: Handler,
}

/// Synchronous fan-out of session events.
///
/// Handlers run on the emitting task, after the client has released its
/// state lock, so they may call back into the client.
#[derive(Default)]
pub struct EventBus {
    next_token: AtomicU64,
    handlers: RwLock<Vec<Entry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let token = Subscription(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                token,
                kind,
                handler: Arc::new(handler),
            });
        token
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, token: Subscription) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|entry| entry.token != token);
        handlers.len() != before
    }

    /// Deliver `event` to every matching handler, in subscription order.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let matching: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.kind == EventKind::Any || entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        tracing::trace!(?event, handlers = matching.len(), "emitting session event");
        for handler in matching {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<SessionEvent>>>, impl Fn(&SessionEvent) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &SessionEvent| {
            sink.lock().unwrap().push(event.clone());
        })
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let (ended, handler) = recorder();
        bus.subscribe(EventKind::SessionEnded, handler);

        bus.emit(&SessionEvent::SubmissionAccepted);
        bus.emit(&SessionEvent::SessionEnded {
            session_id: SessionId::new("s1"),
        });

        assert_eq!(
            *ended.lock().unwrap(),
            vec![SessionEvent::SessionEnded {
                session_id: SessionId::new("s1")
            }]
        );
    }

    #[test]
    fn any_matches_everything() {
        let bus = EventBus::new();
        let (all, handler) = recorder();
        bus.subscribe(EventKind::Any, handler);

        bus.emit(&SessionEvent::SubmissionAccepted);
        bus.emit(&SessionEvent::InputRequired { waiting: true });

        assert_eq!(all.lock().unwrap().len(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (seen, handler) = recorder();
        let token = bus.subscribe(EventKind::Any, handler);

        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.emit(&SessionEvent::SubmissionAccepted);

        assert!(seen.lock().unwrap().is_empty());
    }
}
