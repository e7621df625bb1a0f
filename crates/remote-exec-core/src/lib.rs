//! Core abstractions for interactive remote program execution.
//!
//! This crate provides the fundamental building blocks:
//! - `OutputSink` - Append-only output log with live subscription
//! - `EventBus` - Session lifecycle events for the surrounding UI
//! - `ClientConfig` - Polling cadence and retry budget
//! - Transport and UI collaborator traits

pub mod config;
pub mod events;
pub mod output;
pub mod session;
pub mod traits;

pub use config::ClientConfig;
pub use events::{EventBus, EventKind, SessionEvent, Subscription};
pub use output::{EntryKind, OutputEntry, OutputSink, SinkEvent};
pub use session::{Phase, SessionId};
pub use traits::{ExecutionTransport, InputSurface, OutputPoll, TransportError, UiHooks};
