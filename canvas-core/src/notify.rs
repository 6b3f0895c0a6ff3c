//! Change notification with independently subscribable channels.
//!
//! A tool switch publishes on [`Channel::Tool`] only, so subscribers that
//! repaint the canvas on [`Channel::Render`] are not woken by it.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::CanvasWarning;

/// A notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Canvas pixels changed and need a repaint.
    Render,
    /// The active layer changed.
    ActiveLayer,
    /// The active tool or its settings changed.
    Tool,
    /// Canvas dimensions changed.
    CanvasSize,
    /// Selection shape changed.
    Selection,
    /// Undo/redo availability changed.
    History,
    /// A non-fatal warning was raised.
    Warning,
}

impl Channel {
    /// All channels.
    pub const ALL: [Self; 7] = [
        Self::Render,
        Self::ActiveLayer,
        Self::Tool,
        Self::CanvasSize,
        Self::Selection,
        Self::History,
        Self::Warning,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Render => 0,
            Self::ActiveLayer => 1,
            Self::Tool => 2,
            Self::CanvasSize => 3,
            Self::Selection => 4,
            Self::History => 5,
            Self::Warning => 6,
        }
    }
}

/// A delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Channel this was published on.
    pub channel: Channel,
    /// Notifier-wide sequence number.
    pub sequence: u64,
    /// Warning payload, set only on [`Channel::Warning`].
    pub warning: Option<CanvasWarning>,
}

#[derive(Debug, Default)]
struct BatchState {
    depth: u32,
    pending: BTreeSet<Channel>,
    sequence: u64,
}

/// Publish/subscribe hub shared by the editing subsystems.
///
/// Batches nest; everything published while a batch is open is coalesced
/// into one notification per touched channel when the outermost batch ends.
/// Warnings carry a payload and are never coalesced.
#[derive(Debug)]
pub struct ChangeNotifier {
    senders: Vec<broadcast::Sender<Change>>,
    state: Mutex<BatchState>,
}

impl ChangeNotifier {
    /// Default per-channel buffer.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a notifier whose channels buffer up to `capacity` messages each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            senders: Channel::ALL
                .iter()
                .map(|_| broadcast::channel(capacity).0)
                .collect(),
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Subscribe to one channel.
    #[must_use]
    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Change> {
        self.senders[channel.index()].subscribe()
    }

    /// Publish on a channel, or defer it if a batch is open.
    pub fn notify(&self, channel: Channel) {
        let sequence = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.depth > 0 {
                state.pending.insert(channel);
                return;
            }
            state.sequence += 1;
            state.sequence
        };
        self.send(channel, sequence, None);
    }

    /// Log and publish a warning immediately.
    pub fn warn(&self, warning: CanvasWarning) {
        tracing::warn!("{warning}");
        let sequence = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.sequence += 1;
            state.sequence
        };
        self.send(Channel::Warning, sequence, Some(warning));
    }

    /// Open a (possibly nested) batch.
    pub fn begin_batch(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.depth += 1;
    }

    /// Close a batch. The outermost close flushes one notification per touched channel.
    ///
    /// Unbalanced calls are ignored.
    pub fn end_batch(&self) {
        let flushed: Vec<(Channel, u64)> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.depth == 0 {
                tracing::debug!("end_batch without matching begin_batch");
                return;
            }
            state.depth -= 1;
            if state.depth > 0 {
                return;
            }
            let pending = std::mem::take(&mut state.pending);
            pending
                .into_iter()
                .map(|channel| {
                    state.sequence += 1;
                    (channel, state.sequence)
                })
                .collect()
        };
        for (channel, sequence) in flushed {
            self.send(channel, sequence, None);
        }
    }

    /// Whether a batch is open.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .depth
            > 0
    }

    fn send(&self, channel: Channel, sequence: u64, warning: Option<CanvasWarning>) {
        // No subscribers is not an error.
        let _ = self.senders[channel.index()].send(Change {
            channel,
            sequence,
            warning,
        });
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
