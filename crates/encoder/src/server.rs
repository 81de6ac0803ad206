//! Encode servers and their discovery.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// A remote machine that will encode frames for us.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodeServerDescription {
    pub host: String,
    /// How many frames it is willing to encode at once.
    pub threads: usize,
}

impl EncodeServerDescription {
    pub fn new(host: impl Into<String>, threads: usize) -> Self {
        Self {
            host: host.into(),
            threads,
        }
    }
}

/// Called after the set of servers changes.
pub type ServersChanged = Box<dyn Fn() + Send + Sync>;

/// Source of the current set of encode servers.
pub trait ServerFinder: Send + Sync {
    fn servers(&self) -> Vec<EncodeServerDescription>;

    /// Register `callback`; it stays registered until the returned
    /// [`Subscription`] is dropped.
    fn subscribe(&self, callback: ServersChanged) -> Subscription;
}

/// Keeps a [`ServerFinder`] callback registered while alive.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ServerListInner {
    servers: Vec<EncodeServerDescription>,
    subscribers: Vec<(u64, Arc<dyn Fn() + Send + Sync>)>,
    next_id: u64,
}

/// An in-process server set that a discovery mechanism (or a test) updates.
#[derive(Clone, Default)]
pub struct ServerList {
    inner: Arc<Mutex<ServerListInner>>,
}

impl ServerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(servers: Vec<EncodeServerDescription>) -> Self {
        let list = Self::new();
        list.inner.lock().servers = servers;
        list
    }

    /// Replace the set; subscribers are told only if it actually changed.
    pub fn set_servers(&self, servers: Vec<EncodeServerDescription>) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.servers == servers {
                return;
            }
            inner.servers = servers;
            inner
                .subscribers
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect::<Vec<_>>()
        };
        tracing::debug!(subscribers = callbacks.len(), "Encode server list changed");
        // Outside the lock: callbacks typically read the list back.
        for callback in callbacks {
            callback();
        }
    }

    pub fn add_server(&self, server: EncodeServerDescription) {
        let mut servers = self.servers();
        servers.retain(|s| s.host != server.host);
        servers.push(server);
        self.set_servers(servers);
    }

    pub fn remove_server(&self, host: &str) {
        let mut servers = self.servers();
        servers.retain(|s| s.host != host);
        self.set_servers(servers);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl ServerFinder for ServerList {
    fn servers(&self) -> Vec<EncodeServerDescription> {
        self.inner.lock().servers.clone()
    }

    fn subscribe(&self, callback: ServersChanged) -> Subscription {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::from(callback)));
            id
        };
        let weak: Weak<Mutex<ServerListInner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.retain(|(i, _)| *i != id);
            }
        })
    }
}
