//! Error types for the session client.

use remote_exec_core::TransportError;
use thiserror::Error;

/// `init` failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("client is already initialized")]
    AlreadyInitialized,
    #[error("UI hooks not found after {attempts} attempts")]
    HooksUnavailable { attempts: u32 },
}

/// Submission failure. Rejections leave the client state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("client is not initialized")]
    NotInitialized,
    #[error("a submission is already running")]
    Busy,
    #[error("code is empty")]
    EmptyCode,
    #[error("failed to start session: {0}")]
    Start(TransportError),
    #[error("submission was superseded before its session started")]
    Superseded,
}

/// Input forwarding failure. The session stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("failed to send input: {0}")]
    Send(#[from] TransportError),
}
