//! Append-only output log with live subscription.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Kind of an output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// Program stdout/stderr.
    Output,
    /// Echo of a line the user typed.
    InputEcho,
    /// Client-side failure shown to the user.
    Error,
}

impl EntryKind {
    /// Prefix shown in front of entries of this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Output => "",
            Self::InputEcho => "> ",
            Self::Error => "error: ",
        }
    }
}

/// One rendered line. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub seq: u64,
    pub kind: EntryKind,
    pub text: String,
}

impl OutputEntry {
    /// Text as it should be displayed, including the kind prefix.
    #[must_use]
    pub fn rendered(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.text)
    }
}

/// Change notification for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Appended(OutputEntry),
    Cleared,
    /// View should scroll so that entry `seq` is visible.
    ScrolledTo(u64),
}

struct Inner {
    entries: Vec<OutputEntry>,
    next_seq: u64,
}

/// Output sink shared between the session client and renderers.
///
/// Late renderers use [`OutputSink::history_plus_stream`] to replay the
/// current entries before switching to live updates.
pub struct OutputSink {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SinkEvent>,
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(10000);
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::with_capacity(32),
                next_seq: 0,
            }),
            sender,
        }
    }

    /// Append `text`, one entry per non-blank line.
    ///
    /// Returns the number of entries created.
    pub fn append(&self, text: &str, kind: EntryKind) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = OutputEntry {
                seq: inner.next_seq,
                kind,
                text: line.to_string(),
            };
            inner.next_seq += 1;
            inner.entries.push(entry.clone());
            let _ = self.sender.send(SinkEvent::Appended(entry));
            added += 1;
        }
        if added > 0 {
            let newest = inner.next_seq - 1;
            let _ = self.sender.send(SinkEvent::ScrolledTo(newest));
        }
        added
    }

    /// Append an error message.
    pub fn append_error(&self, text: &str) -> usize {
        self.append(text, EntryKind::Error)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        let _ = self.sender.send(SinkEvent::Cleared);
    }

    /// Snapshot of the current entries.
    #[must_use]
    pub fn entries(&self) -> Vec<OutputEntry> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }

    /// Stream that yields the current entries first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SinkEvent> {
        // Subscribe under the lock so no append falls between snapshot and receiver.
        let (history, rx) = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            (inner.entries.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history.into_iter().map(SinkEvent::Appended));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
