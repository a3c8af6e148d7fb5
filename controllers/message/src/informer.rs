//! List-watch reconciliation loop.
//!
//! The informer keeps the [`Store`] in sync with the API server and turns every
//! change into a [`Notification`] for the dispatcher. It runs as a state
//! machine:
//!
//! - `Listing`: full List, wholesale cache replace, diff against the old cache
//! - `Watching`: stream events from the List's resourceVersion until the
//!   stream ends, errors, or the resync period elapses
//! - `Reconnecting`: wait for the backoff delay, then list again
//!
//! Only a failure before the first watch was ever established is fatal.

use crate::backoff::Backoff;
use crate::dispatcher::{Dispatcher, EventHandler, Notification};
use crate::error::ControllerError;
use crate::store::{self, Applied, ObjectKey, Store, Writer};
use crds::Message;
use futures::StreamExt;
use message_client::{ClientError, MessageClientTrait, WatchEvent, WatchStream};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Sender half of the shutdown signal: send `true` to stop the informer.
pub type ShutdownSender = watch::Sender<bool>;
/// Receiver half of the shutdown signal.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Create a shutdown signal pair.
#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownSignal) {
    watch::channel(false)
}

/// Resolves once shutdown was requested or every sender is gone.
async fn cancelled(signal: &mut ShutdownSignal) {
    // A closed channel can never signal again; treat it as shutdown.
    let _ = signal.wait_for(|stop| *stop).await;
}

/// Loop phase
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Listing,
    Watching { resource_version: String },
    Reconnecting,
}

/// Why a watch stream stopped being consumed
#[derive(Debug)]
enum WatchEnd {
    Shutdown,
    Resync,
    Closed,
    Failed(ClientError),
}

/// Diff a fresh List against the previous cache content.
///
/// Listed objects come first, in the order given: unknown keys are `Added`,
/// known keys `Updated`. Keys that vanished follow as `Deleted`, in key order.
pub fn classify_relist<K>(
    previous: &mut BTreeMap<ObjectKey, Arc<K>>,
    listed: &[Arc<K>],
    key_of: impl Fn(&K) -> ObjectKey,
) -> Vec<(ObjectKey, Notification<K>)> {
    let mut notifications = Vec::with_capacity(listed.len() + previous.len());
    for obj in listed {
        let key = key_of(obj);
        let notification = match previous.remove(&key) {
            Some(old) => Notification::Updated {
                old,
                new: Arc::clone(obj),
            },
            None => Notification::Added(Arc::clone(obj)),
        };
        notifications.push((key, notification));
    }
    notifications.extend(
        std::mem::take(previous)
            .into_iter()
            .map(|(key, old)| (key, Notification::Deleted(old))),
    );
    notifications
}

/// Classify one applied watch event by cache presence before and after.
///
/// Returns `None` for a delete of a key that was never cached.
pub fn classify_event<K>(applied: Applied<K>) -> Option<(ObjectKey, Notification<K>)> {
    let Applied { key, prior, current } = applied;
    let notification = match (prior, current) {
        (None, Some(new)) => Notification::Added(new),
        (Some(old), Some(new)) => Notification::Updated { old, new },
        (Some(old), None) => Notification::Deleted(old),
        (None, None) => return None,
    };
    Some((key, notification))
}

/// List-watch loop for `Message` resources
pub struct Informer {
    client: Arc<dyn MessageClientTrait>,
    reader: Store<Message>,
    writer: Writer<Message>,
    dispatcher: Dispatcher<Message>,
    backoff: Box<dyn Backoff>,
    resync_period: Duration,
}

impl std::fmt::Debug for Informer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("store", &self.reader)
            .field("dispatcher", &self.dispatcher)
            .field("resync_period", &self.resync_period)
            .finish_non_exhaustive()
    }
}

impl Informer {
    /// Creates an informer with an empty cache.
    ///
    /// A zero `resync_period` disables periodic relisting.
    pub fn new(
        client: Arc<dyn MessageClientTrait>,
        backoff: Box<dyn Backoff>,
        resync_period: Duration,
    ) -> Self {
        let (reader, writer) = store::store();
        Self {
            client,
            reader,
            writer,
            dispatcher: Dispatcher::new(),
            backoff,
            resync_period,
        }
    }

    /// Register add/update/delete handlers. Call before [`Informer::run`].
    pub fn register_handlers(&mut self, handler: Arc<dyn EventHandler<Message>>) {
        self.dispatcher.register(handler);
    }

    /// Read handle on the cache this informer maintains.
    pub fn store(&self) -> Store<Message> {
        self.reader.clone()
    }

    /// Run until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Setup`] if the very first List or Watch fails.
    /// Later failures are logged and recovered by relisting.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<(), ControllerError> {
        info!("Starting Message informer");
        let mut phase = Phase::Listing;
        let mut established = false;

        loop {
            phase = match phase {
                Phase::Listing => {
                    let result = tokio::select! {
                        () = cancelled(&mut shutdown) => break,
                        result = self.client.list() => result,
                    };
                    match result {
                        Ok(list) => {
                            let count = list.items.len();
                            self.relist(list.items, &list.resource_version).await;
                            info!("Listed {} Messages at resourceVersion {}", count, list.resource_version);
                            Phase::Watching {
                                resource_version: list.resource_version,
                            }
                        }
                        Err(e) if !established => {
                            error!("Initial Message list failed: {}", e);
                            return Err(ControllerError::Setup(e));
                        }
                        Err(e) => {
                            warn!("Message list failed, will retry: {}", e);
                            Phase::Reconnecting
                        }
                    }
                }
                Phase::Watching { resource_version } => {
                    let result = tokio::select! {
                        () = cancelled(&mut shutdown) => break,
                        result = self.client.watch(&resource_version) => result,
                    };
                    match result {
                        Ok(stream) => {
                            established = true;
                            debug!("Watching Messages from resourceVersion {}", resource_version);
                            match self.consume(stream, &mut shutdown).await {
                                WatchEnd::Shutdown => break,
                                WatchEnd::Resync => {
                                    debug!("Resync period elapsed, relisting Messages");
                                    Phase::Listing
                                }
                                WatchEnd::Closed => {
                                    debug!("Message watch stream closed by server");
                                    self.backoff.reset();
                                    Phase::Reconnecting
                                }
                                WatchEnd::Failed(e) => {
                                    warn!("Message watch stream failed, will relist: {}", e);
                                    Phase::Reconnecting
                                }
                            }
                        }
                        Err(e) if !established => {
                            error!("Initial Message watch failed: {}", e);
                            return Err(ControllerError::Setup(e));
                        }
                        Err(e) => {
                            warn!("Message watch could not be opened, will relist: {}", e);
                            Phase::Reconnecting
                        }
                    }
                }
                Phase::Reconnecting => {
                    let delay = self.backoff.next_delay();
                    debug!("Reconnecting Message watch in {:?}", delay);
                    tokio::select! {
                        () = cancelled(&mut shutdown) => break,
                        () = tokio::time::sleep(delay) => Phase::Listing,
                    }
                }
            };
        }

        info!("Message informer stopped");
        Ok(())
    }

    /// Replace the cache from a List and dispatch the resulting diff.
    async fn relist(&mut self, items: Vec<Message>, resource_version: &str) {
        let mut previous = self.writer.replace(items, resource_version);
        let listed = self.reader.list();
        for (key, notification) in classify_relist(&mut previous, &listed, ObjectKey::from_obj) {
            self.dispatcher.dispatch(&key, &notification).await;
        }
    }

    /// Apply watch events until the stream ends, fails, resyncs or shutdown.
    async fn consume(&mut self, mut stream: WatchStream<Message>, shutdown: &mut ShutdownSignal) -> WatchEnd {
        let period = self.resync_period;
        let resync = async move {
            if period.is_zero() {
                std::future::pending::<()>().await;
            } else {
                tokio::time::sleep(period).await;
            }
        };
        tokio::pin!(resync);

        let mut delivered = false;
        loop {
            let next = tokio::select! {
                () = cancelled(shutdown) => return WatchEnd::Shutdown,
                () = &mut resync => return WatchEnd::Resync,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    if !delivered {
                        delivered = true;
                        self.backoff.reset();
                    }
                    self.handle_event(event).await;
                }
                Some(Err(e)) => return WatchEnd::Failed(e),
                None => return WatchEnd::Closed,
            }
        }
    }

    async fn handle_event(&mut self, event: WatchEvent<Message>) {
        let kind = event.kind();
        let applied = self.writer.apply(&event);
        match classify_event(applied) {
            Some((key, notification)) => {
                debug!("Watch event {} for {}", kind, key);
                self.dispatcher.dispatch(&key, &notification).await;
            }
            None => {
                debug!(
                    "Ignoring {} event for uncached Message {}",
                    kind,
                    ObjectKey::from_obj(event.object())
                );
            }
        }
    }
}
