//! Event dispatch to registered handlers.
//!
//! Handlers run inline on the informer task, one notification at a time and
//! in arrival order. A handler error is logged and does not stop delivery of
//! later notifications; nothing is redelivered.

use crate::error::ControllerError;
use crate::store::ObjectKey;
use std::sync::Arc;
use tracing::{debug, error};

/// Classified change, as seen by handlers
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<K> {
    /// Key was not cached before
    Added(Arc<K>),
    /// Key was cached before and still is
    Updated {
        /// Previously cached snapshot
        old: Arc<K>,
        /// Newly cached snapshot
        new: Arc<K>,
    },
    /// Key was cached before and is gone now
    Deleted(Arc<K>),
}

impl<K> Notification<K> {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "add",
            Self::Updated { .. } => "update",
            Self::Deleted(_) => "delete",
        }
    }
}

/// Add/update/delete callbacks
///
/// Snapshots are shared with the cache and must be treated as read-only;
/// clone before changing anything.
#[async_trait::async_trait]
pub trait EventHandler<K>: Send + Sync {
    /// A key appeared
    async fn on_add(&self, obj: &K) -> Result<(), ControllerError>;

    /// A cached key changed (fires even when nothing differs)
    async fn on_update(&self, old: &K, new: &K) -> Result<(), ControllerError>;

    /// A cached key was removed
    async fn on_delete(&self, obj: &K) -> Result<(), ControllerError>;
}

/// Sequential fan-out to every registered handler
pub struct Dispatcher<K> {
    handlers: Vec<Arc<dyn EventHandler<K>>>,
}

impl<K> Default for Dispatcher<K> {
    fn default() -> Self {
        Self { handlers: Vec::new() }
    }
}

impl<K> std::fmt::Debug for Dispatcher<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<K> Dispatcher<K> {
    /// Create a dispatcher without handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers are called in registration order.
    pub fn register(&mut self, handler: Arc<dyn EventHandler<K>>) {
        self.handlers.push(handler);
    }

    /// Deliver one notification to every handler.
    ///
    /// Returns the number of handlers that failed.
    pub async fn dispatch(&self, key: &ObjectKey, notification: &Notification<K>) -> usize {
        debug!("Dispatching {} for {}", notification.kind(), key);
        let mut failures = 0;
        for handler in &self.handlers {
            let result = match notification {
                Notification::Added(obj) => handler.on_add(obj).await,
                Notification::Updated { old, new } => handler.on_update(old, new).await,
                Notification::Deleted(obj) => handler.on_delete(obj).await,
            };
            if let Err(e) = result {
                failures += 1;
                error!("Handler failed on {} for {}: {}", notification.kind(), key, e);
            }
        }
        failures
    }
}
