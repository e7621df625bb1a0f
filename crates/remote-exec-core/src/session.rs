//! Session identity and lifecycle phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session identifier assigned by the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a server-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle phase of a session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not initialized, or disposed.
    Uninitialized,
    /// No session bound; accepts a submission.
    Ready,
    /// Start-session request in flight.
    SessionStarting,
    /// Poll loop running.
    SessionActive,
    /// Remote program is blocked reading input.
    WaitingForInput,
    /// Remote program finished.
    SessionEnded,
    /// Start failed or the retry budget ran out.
    Failed,
}

impl Phase {
    /// Whether a session is bound and being polled.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::SessionActive | Self::WaitingForInput)
    }

    /// Whether the current session can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::SessionEnded | Self::Failed)
    }
}
