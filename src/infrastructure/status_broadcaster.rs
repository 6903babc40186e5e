//! Best-effort fan-out of session status snapshots.
//!
//! External surfaces (a popup, a dashboard) subscribe if they care; a send
//! with no listener is not an error.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::model::StatusSnapshot;

const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<StatusSnapshot>,
}

impl StatusBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Broadcast a snapshot; delivery failure (no listener) is ignored.
    pub fn broadcast(&self, snapshot: StatusSnapshot) {
        if self.tx.send(snapshot).is_err() {
            trace!("no status listener attached, snapshot dropped");
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
