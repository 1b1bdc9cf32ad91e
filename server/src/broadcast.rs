//! Observer registry and fan-out for the GateHub server.
//!
//! The hub owns the set of connected observer channels and pushes each
//! event summary to all of them. A slow or dead observer must never affect
//! the others: a failed write is recorded, delivery continues, and the
//! failed channel is pruned after the sweep. Delivery is best-effort,
//! at-most-once per observer per broadcast; there is no buffering or
//! replay for observers that are not connected at broadcast time.
//!
//! The registry is the one piece of shared mutable state in the process.
//! It is a lock-guarded map; the lock is only ever held for membership
//! changes and for taking a snapshot, never across I/O or an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Identity of one registered observer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Process-wide hub owning all observer channels.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    observers: Arc<RwLock<HashMap<ObserverId, UnboundedSender<String>>>>,
}

impl BroadcastHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer channel.
    ///
    /// Always succeeds. The returned receiver yields every summary
    /// broadcast while the channel stays registered.
    #[must_use]
    pub fn register(&self) -> (ObserverId, UnboundedReceiver<String>) {
        let id = ObserverId(Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.write().insert(id, tx);
        debug!(observer = %id, observers = self.observer_count(), "Observer registered");
        (id, rx)
    }

    /// Removes an observer channel. Idempotent; removing an unknown or
    /// already-removed id is a no-op.
    pub fn unregister(&self, id: ObserverId) {
        let removed = self.observers.write().remove(&id).is_some();
        if removed {
            debug!(observer = %id, observers = self.observer_count(), "Observer unregistered");
        }
    }

    /// Pushes `message` to every currently registered observer.
    ///
    /// Iterates over a snapshot of the registry so concurrent
    /// register/unregister calls cannot interfere. A failed write never
    /// prevents delivery to the remaining observers and never propagates;
    /// every channel that failed during this broadcast is unregistered
    /// after the sweep. Returns the number of observers that accepted the
    /// message.
    pub fn broadcast(&self, message: &str) -> usize {
        let snapshot: Vec<(ObserverId, UnboundedSender<String>)> = self
            .observers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write();
            for id in &failed {
                observers.remove(id);
            }
            warn!(
                pruned = failed.len(),
                delivered, "Pruned dead observer channels during broadcast"
            );
        }

        trace!(delivered, "Broadcast complete");
        delivered
    }

    /// Number of currently registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Closes every observer channel and clears the registry.
    ///
    /// Called at process shutdown; dropping the senders wakes each
    /// observer task with a closed channel.
    pub fn shutdown(&self) {
        let drained = {
            let mut observers = self.observers.write();
            let count = observers.len();
            observers.clear();
            count
        };
        debug!(closed = drained, "Observer registry cleared");
    }
}
