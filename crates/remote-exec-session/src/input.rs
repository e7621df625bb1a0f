//! Forwards lines typed into the input surface to the running program.

use remote_exec_core::{EntryKind, Phase, SessionEvent};

use crate::{InputError, SessionClient, client::Effects};

/// What happened to a submitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    /// Echoed and sent to the program.
    Forwarded,
    /// The program was not waiting for input; nothing was sent.
    Ignored,
}

impl SessionClient {
    /// Handle a line submitted from the input surface.
    ///
    /// Only forwarded while the session is valid and waiting for input.
    /// The line is echoed to the output sink and the surface is cleared
    /// whether or not the send succeeds.
    ///
    /// # Errors
    /// Returns `Send` when the transport fails. The session stays valid and
    /// polling continues.
    pub async fn submit_input(&self, line: &str) -> Result<InputDisposition, InputError> {
        let inner = &self.inner;
        let (session_id, effects) = {
            let mut state = inner.lock();
            if !state.accepts_input() {
                return Ok(InputDisposition::Ignored);
            }
            let Some(session_id) = state.session_id.clone() else {
                return Ok(InputDisposition::Ignored);
            };
            state.waiting_for_input = false;
            state.phase = Phase::SessionActive;
            inner.publish(&state);

            let mut effects = Effects::for_state(&state);
            effects.set_input_enabled(false);
            effects.emit(SessionEvent::InputRequired { waiting: false });
            (session_id, effects)
        };
        inner.apply(effects);

        let line = line.trim_end_matches(['\r', '\n']);
        inner.output.append(line.trim(), EntryKind::InputEcho);
        let result = inner
            .transport
            .send_input(&session_id, &format!("{line}\n"))
            .await;

        let surface = inner.lock().input.clone();
        if let Some(surface) = surface {
            surface.clear();
        }

        match result {
            Ok(()) => {
                tracing::debug!(instance = %inner.instance, %session_id, "input forwarded");
                Ok(InputDisposition::Forwarded)
            }
            Err(err) => {
                tracing::warn!(instance = %inner.instance, %session_id, error = %err, "failed to send input");
                inner
                    .output
                    .append_error(&format!("Failed to send input: {err}"));
                Err(InputError::Send(err))
            }
        }
    }

    /// The input surface lost focus. Pull it back while the program waits.
    pub fn input_blurred(&self) {
        let surface = {
            let state = self.inner.lock();
            if !state.accepts_input() {
                return;
            }
            state.input.clone()
        };
        if let Some(surface) = surface {
            surface.focus();
        }
    }
}
