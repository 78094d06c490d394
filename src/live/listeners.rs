use crate::live::protocol::{InboundMessage, MessageKind};
use crate::live::state::{ConnectionStatus, StatusChange};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;
use uuid::Uuid;

/// Callback invoked with the `data` of a matching message
pub type MessageCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback invoked on every connection status change
pub type StatusCallback = Arc<dyn Fn(&StatusChange) + Send + Sync>;

/// Handle returned by a registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct MessageListener {
    id: ListenerId,
    kind: MessageKind,
    callback: MessageCallback,
}

/// Registered message listeners and status observers.
///
/// Shared between the manager task and every `ManagerHandle`. Callbacks are
/// cloned out of the lock before they run, so a callback may register or
/// unregister without deadlocking.
pub struct ListenerRegistry {
    listeners: RwLock<Vec<MessageListener>>,
    observers: RwLock<Vec<(ListenerId, StatusCallback)>>,
    latest_status: RwLock<ConnectionStatus>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            latest_status: RwLock::new(ConnectionStatus::Disconnected),
        }
    }

    /// Register a listener for one message kind
    pub fn register<F>(&self, kind: MessageKind, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MessageListener {
                id,
                kind,
                callback: Arc::new(callback),
            });
        id
    }

    /// Register a connection status observer
    pub fn on_status_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a listener or observer. Returns false if the id was unknown.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut removed = false;
        {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            let before = listeners.len();
            listeners.retain(|l| l.id != id);
            removed |= listeners.len() != before;
        }
        {
            let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
            let before = observers.len();
            observers.retain(|(oid, _)| *oid != id);
            removed |= observers.len() != before;
        }
        removed
    }

    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }

    /// Deliver a message to every listener registered for its kind, in
    /// registration order. A panicking listener is logged and skipped.
    ///
    /// Returns the number of listeners that completed normally.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let kind = message.kind();
        let targets: Vec<(ListenerId, MessageCallback)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| (l.id, Arc::clone(&l.callback)))
            .collect();

        let data = message.data();
        let mut delivered = 0;
        for (id, callback) in targets {
            match catch_unwind(AssertUnwindSafe(|| callback(data))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(listener = ?id, kind = %kind, "Listener panicked, continuing fan-out");
                }
            }
        }
        delivered
    }

    /// Record a status change and notify every observer
    pub fn notify_status(&self, change: &StatusChange) {
        *self
            .latest_status
            .write()
            .unwrap_or_else(PoisonError::into_inner) = change.status.clone();

        let observers: Vec<(ListenerId, StatusCallback)> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in observers {
            if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                error!(observer = ?id, status = %change.status, "Status observer panicked");
            }
        }
    }

    /// Most recently emitted status (`Disconnected` before the first emission)
    pub fn latest_status(&self) -> ConnectionStatus {
        self.latest_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
