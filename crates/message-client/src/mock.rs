//! Mock MessageClient for unit testing
//!
//! In-memory stand-in for the API server. It keeps a resourceVersion counter
//! and an event history so that `watch(rv)` replays everything committed after
//! `rv`, exactly like a real list-watch. Producers call [`MockMessageClient::create`],
//! [`MockMessageClient::modify`] and [`MockMessageClient::delete`]; tests can
//! close open watches and inject failures.

use crate::error::ClientError;
use crate::event::{MessageList, WatchEvent, WatchStream};
use crate::message_trait::MessageClientTrait;
use crds::Message;
use futures::StreamExt;
use kube::ResourceExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

type Key = (String, String);
type EventSender = mpsc::UnboundedSender<Result<WatchEvent<Message>, ClientError>>;

#[derive(Default)]
struct MockState {
    objects: BTreeMap<Key, Message>,
    resource_version: u64,
    history: Vec<(u64, WatchEvent<Message>)>,
    watchers: Vec<EventSender>,
    list_failures: VecDeque<ClientError>,
    watch_failures: VecDeque<ClientError>,
    update_failures: VecDeque<ClientError>,
    list_calls: usize,
    watch_calls: usize,
    update_calls: Vec<Message>,
}

impl MockState {
    fn commit(&mut self, event: WatchEvent<Message>) {
        let rv = self.resource_version;
        self.history.push((rv, event.clone()));
        self.watchers.retain(|tx| tx.send(Ok(event.clone())).is_ok());
    }

    fn bump(&mut self, message: &mut Message) {
        self.resource_version += 1;
        message.metadata.resource_version = Some(self.resource_version.to_string());
    }
}

fn key_of(message: &Message) -> Key {
    (message.namespace().unwrap_or_default(), message.name_any())
}

/// Mock MessageClient for testing
#[derive(Clone, Default)]
pub struct MockMessageClient {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockMessageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MockMessageClient")
            .field("objects", &state.objects.len())
            .field("resource_version", &state.resource_version)
            .field("watchers", &state.watchers.len())
            .finish()
    }
}

impl MockMessageClient {
    /// Create an empty mock API server
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a Message (producer side). Returns the stored object.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyExists`] if namespace/name is taken.
    pub fn create(&self, mut message: Message) -> Result<Message, ClientError> {
        let mut state = self.state();
        let key = key_of(&message);
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(format!("messages \"{}\" already exists", key.1)));
        }
        state.bump(&mut message);
        state.objects.insert(key, message.clone());
        state.commit(WatchEvent::Added(message.clone()));
        Ok(message)
    }

    /// Replace a Message wholesale (an external edit).
    ///
    /// # Errors
    ///
    /// [`ClientError::NotFound`] if the Message does not exist.
    pub fn modify(&self, mut message: Message) -> Result<Message, ClientError> {
        let mut state = self.state();
        let key = key_of(&message);
        if !state.objects.contains_key(&key) {
            return Err(ClientError::NotFound(format!("messages \"{}\" not found", key.1)));
        }
        state.bump(&mut message);
        state.objects.insert(key, message.clone());
        state.commit(WatchEvent::Modified(message.clone()));
        Ok(message)
    }

    /// Delete a Message.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotFound`] if the Message does not exist.
    pub fn delete(&self, namespace: &str, name: &str) -> Result<Message, ClientError> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        let Some(mut message) = state.objects.remove(&key) else {
            return Err(ClientError::NotFound(format!("messages \"{name}\" not found")));
        };
        state.bump(&mut message);
        state.commit(WatchEvent::Deleted(message.clone()));
        Ok(message)
    }

    /// Current server-side copy of a Message
    pub fn get(&self, namespace: &str, name: &str) -> Option<Message> {
        self.state()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Close every open watch stream (simulated disconnect)
    pub fn disconnect_watches(&self) {
        self.state().watchers.clear();
    }

    /// Send an error event on every open watch stream
    pub fn fail_watches(&self, message: &str) {
        self.state()
            .watchers
            .retain(|tx| tx.send(Err(ClientError::Watch(message.to_string()))).is_ok());
    }

    /// Make the next `list` call fail with `error`
    pub fn fail_next_list(&self, error: ClientError) {
        self.state().list_failures.push_back(error);
    }

    /// Make the next `watch` call fail with `error`
    pub fn fail_next_watch(&self, error: ClientError) {
        self.state().watch_failures.push_back(error);
    }

    /// Make the next `update_status` call fail with `error`
    pub fn fail_next_update(&self, error: ClientError) {
        self.state().update_failures.push_back(error);
    }

    /// Number of `list` calls so far
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    /// Number of `watch` calls so far
    pub fn watch_calls(&self) -> usize {
        self.state().watch_calls
    }

    /// Number of currently open watch streams
    pub fn open_watches(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|tx| !tx.is_closed());
        state.watchers.len()
    }

    /// Every Message passed to `update_status`, in call order
    pub fn update_calls(&self) -> Vec<Message> {
        self.state().update_calls.clone()
    }
}

#[async_trait::async_trait]
impl MessageClientTrait for MockMessageClient {
    async fn list(&self) -> Result<MessageList, ClientError> {
        let mut state = self.state();
        state.list_calls += 1;
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        Ok(MessageList {
            items: state.objects.values().cloned().collect(),
            resource_version: state.resource_version.to_string(),
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<Message>, ClientError> {
        let mut state = self.state();
        state.watch_calls += 1;
        if let Some(error) = state.watch_failures.pop_front() {
            return Err(error);
        }
        let from: u64 = resource_version
            .parse()
            .map_err(|_| ClientError::Watch(format!("invalid resourceVersion {resource_version:?}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        for (rv, event) in &state.history {
            if *rv > from && tx.send(Ok(event.clone())).is_err() {
                break;
            }
        }
        state.watchers.push(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn update_status(&self, message: &Message) -> Result<Message, ClientError> {
        let mut state = self.state();
        state.update_calls.push(message.clone());
        if let Some(error) = state.update_failures.pop_front() {
            return Err(error);
        }
        let key = key_of(message);
        let Some(current) = state.objects.get(&key) else {
            return Err(ClientError::NotFound(format!("messages \"{}\" not found", key.1)));
        };
        if let Some(expected) = message.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(expected) {
                return Err(ClientError::Conflict(format!(
                    "Operation cannot be fulfilled on messages \"{}\": the object has been modified",
                    key.1
                )));
            }
        }
        let mut updated = current.clone();
        updated.status = message.status.clone();
        state.bump(&mut updated);
        state.objects.insert(key, updated.clone());
        state.commit(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }
}
