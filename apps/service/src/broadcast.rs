use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::database::{Summary, TargetStatus};
use crate::monitoring::Check;

const BUS_CAPACITY: usize = 64;

/// Snapshot pushed to live consumers after every persisted check
#[derive(Debug, Clone, Serialize)]
pub struct LiveUpdate {
    pub check: Check,
    pub targets: Vec<TargetStatus>,
    pub summary: Summary,
}

/// Fan-out of live updates to any number of subscribers
///
/// Slow subscribers lag and lose the oldest updates instead of blocking the
/// publisher.
#[derive(Debug, Clone)]
pub struct LiveBus {
    tx: broadcast::Sender<LiveUpdate>,
}

impl Default for LiveBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.tx.subscribe()
    }

    pub fn publish(&self, update: LiveUpdate) {
        debug!(
            targets = update.targets.len(),
            up = update.summary.up,
            down = update.summary.down,
            "Live bus: publishing update"
        );
        // Ignore errors if there are no receivers
        let _ = self.tx.send(update);
    }
}
