//! Observable connection state
//!
//! [`ConnectionStateManager`] holds the single source of truth for transport and
//! registration status and broadcasts every change to its listeners.
//!
//! ## Notification semantics
//! - Listeners run synchronously inside `set_state`, in registration order.
//! - Every `set_state` notifies; nothing is coalesced or deduplicated.
//! - The listener list is snapshotted before notifying, so a listener may
//!   unsubscribe itself (or others) mid-notification. A listener removed during
//!   a notification still sees that notification, never a later one.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Registered,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Registered => "registered",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
}

impl ConnectionState {
    pub fn new(status: ConnectionStatus) -> Self {
        ConnectionState { status, error: None }
    }

    pub fn disconnected() -> Self {
        Self::new(ConnectionStatus::Disconnected)
    }

    pub fn connecting() -> Self {
        Self::new(ConnectionStatus::Connecting)
    }

    pub fn connected() -> Self {
        Self::new(ConnectionStatus::Connected)
    }

    pub fn registered() -> Self {
        Self::new(ConnectionStatus::Registered)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ConnectionState {
            status: ConnectionStatus::Error,
            error: Some(message.into()),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Boxed listener callback
pub type StateListener = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

/// Listener ID for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

#[derive(Default)]
struct ListenerSet {
    entries: Vec<(ListenerId, StateListener)>,
    next_id: usize,
}

type SharedListeners = Arc<RwLock<ListenerSet>>;

pub struct ConnectionStateManager {
    state: ConnectionState,
    listeners: SharedListeners,
}

impl ConnectionStateManager {
    pub fn new() -> Self {
        ConnectionStateManager {
            state: ConnectionState::disconnected(),
            listeners: Arc::new(RwLock::new(ListenerSet::default())),
        }
    }

    pub fn get_state(&self) -> &ConnectionState {
        &self.state
    }

    /// Replace the state wholesale and notify every listener.
    pub fn set_state(&mut self, next: ConnectionState) {
        self.state = next;

        let snapshot: Vec<StateListener> = {
            let set = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            set.entries.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in snapshot {
            listener(&self.state);
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        add_to(&self.listeners, Arc::new(listener))
    }

    /// Removing an absent listener is a no-op.
    pub fn remove_listener(&self, id: ListenerId) {
        remove_from(&self.listeners, id);
    }

    /// Register a listener that is removed when the returned handle drops.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        let id = self.add_listener(listener);
        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl Default for ConnectionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn add_to(listeners: &SharedListeners, listener: StateListener) -> ListenerId {
    let mut set = listeners.write().unwrap_or_else(PoisonError::into_inner);
    let id = ListenerId(set.next_id);
    set.next_id += 1;
    set.entries.push((id, listener));
    id
}

fn remove_from(listeners: &SharedListeners, id: ListenerId) {
    let mut set = listeners.write().unwrap_or_else(PoisonError::into_inner);
    set.entries.retain(|(existing, _)| *existing != id);
}

/// A handle that unsubscribes when dropped or when `unsubscribe` is called.
///
/// Holds only a weak reference, so it never keeps the manager's listener set
/// alive on its own.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    listeners: Weak<RwLock<ListenerSet>>,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            remove_from(&listeners, self.id);
        }
    }
}
