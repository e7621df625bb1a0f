//! Session orchestration for interactive remote execution.
//!
//! Provides:
//! - `SessionClient` - State machine owning at most one session at a time
//! - Poll loop with a fixed cadence and bounded exponential backoff
//! - Input forwarding while the remote program waits on stdin

pub mod client;
pub mod error;
pub mod input;
pub mod poll;

#[cfg(test)]
mod testing;

pub use client::{SessionClient, SessionSnapshot};
pub use error::{InitError, InputError, SubmitError};
pub use input::InputDisposition;
pub use poll::PollOutcome;
