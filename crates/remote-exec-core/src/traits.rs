//! Collaborator traits: the execution transport and the UI input surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SessionId;

/// Program state returned by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPoll {
    /// Output produced since the previous poll.
    pub output: Option<String>,
    /// Program is blocked reading stdin.
    pub waiting_for_input: bool,
    /// Program has exited.
    pub session_ended: bool,
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{}", http_status_message(*status, reason.as_deref()))]
    HttpStatus { status: u16, reason: Option<String> },
    #[error("{0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn http_status_message(status: u16, reason: Option<&str>) -> String {
    reason.map_or_else(
        || format!("HTTP error, status: {status}"),
        ToString::to_string,
    )
}

/// Trait for the remote execution service.
///
/// Implementations are stateless with respect to the session: the caller
/// supplies the id on every request.
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Start a new session running `code`.
    async fn start_session(
        &self,
        code: &str,
        language: &str,
    ) -> Result<SessionId, TransportError>;

    /// Fetch output produced since the previous poll.
    async fn get_output(&self, session_id: &SessionId) -> Result<OutputPoll, TransportError>;

    /// Write `input` to the program's stdin.
    async fn send_input(&self, session_id: &SessionId, input: &str) -> Result<(), TransportError>;

    /// Ask the service to tear the session down.
    ///
    /// Callers treat this as best-effort.
    async fn end_session(&self, session_id: &SessionId) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: ExecutionTransport + ?Sized> ExecutionTransport for Arc<T> {
    async fn start_session(
        &self,
        code: &str,
        language: &str,
    ) -> Result<SessionId, TransportError> {
        (**self).start_session(code, language).await
    }

    async fn get_output(&self, session_id: &SessionId) -> Result<OutputPoll, TransportError> {
        (**self).get_output(session_id).await
    }

    async fn send_input(&self, session_id: &SessionId, input: &str) -> Result<(), TransportError> {
        (**self).send_input(session_id, input).await
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        (**self).end_session(session_id).await
    }
}

/// Editable line-input widget owned by the surrounding UI.
pub trait InputSurface: Send + Sync {
    /// Enable or disable editing.
    fn set_enabled(&self, enabled: bool);

    /// Discard the current contents.
    fn clear(&self);

    /// Move keyboard focus to the surface.
    fn focus(&self);
}

/// Locates the UI hooks a client needs during `init`.
pub trait UiHooks: Send + Sync {
    /// Return the input surface, or `None` if it is not mounted yet.
    fn input_surface(&self) -> Option<Arc<dyn InputSurface>>;
}

impl<F> UiHooks for F
where
    F: Fn() -> Option<Arc<dyn InputSurface>> + Send + Sync,
{
    fn input_surface(&self) -> Option<Arc<dyn InputSurface>> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_prefers_server_reason() {
        let generic = TransportError::HttpStatus {
            status: 502,
            reason: None,
        };
        assert_eq!(generic.to_string(), "HTTP error, status: 502");

        let specific = TransportError::HttpStatus {
            status: 400,
            reason: Some("Unsupported language".into()),
        };
        assert_eq!(specific.to_string(), "Unsupported language");
    }

    #[test]
    fn output_poll_defaults_to_idle() {
        let poll = OutputPoll::default();
        assert!(poll.output.is_none());
        assert!(!poll.waiting_for_input);
        assert!(!poll.session_ended);
    }
}
