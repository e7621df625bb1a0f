//! Wire protocol for the execution service endpoints.

use remote_exec_core::{OutputPoll, SessionId};
use serde::{Deserialize, Serialize};

/// Body of `POST start-session`.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionRequest<'a> {
    pub code: &'a str,
    pub language: &'a str,
}

/// Reply to `POST start-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply to `GET get-output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOutputResponse {
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub waiting_for_input: bool,
    #[serde(default)]
    pub session_ended: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<GetOutputResponse> for OutputPoll {
    fn from(response: GetOutputResponse) -> Self {
        Self {
            output: response.output,
            waiting_for_input: response.waiting_for_input,
            session_ended: response.session_ended,
        }
    }
}

/// Body of `POST send-input`.
#[derive(Debug, Clone, Serialize)]
pub struct SendInputRequest<'a> {
    pub session_id: &'a SessionId,
    pub input: &'a str,
}

/// Body of `POST end-session`.
#[derive(Debug, Clone, Serialize)]
pub struct EndSessionRequest<'a> {
    pub session_id: &'a SessionId,
}

/// Generic `{success, error?}` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Fields shared by every reply, read from error bodies.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
