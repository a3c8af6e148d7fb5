//! In-memory resource cache.
//!
//! The cache is split in two halves: a single [`Writer`] owned by the
//! list-watch task and any number of cloneable [`Store`] read handles. Every
//! snapshot is held as an `Arc<K>` so readers and handlers share the cached
//! object without being able to mutate it.

use kube::{Resource, ResourceExt};
use message_client::WatchEvent;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cache key: namespace (`None` for cluster-scoped objects) and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: Option<String>,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn from_obj<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

struct Cache<K> {
    objects: BTreeMap<ObjectKey, Arc<K>>,
    resource_version: Option<String>,
}

type Shared<K> = Arc<RwLock<Cache<K>>>;

/// Outcome of applying one watch event to the cache
#[derive(Debug)]
pub struct Applied<K> {
    /// Key the event touched
    pub key: ObjectKey,
    /// Snapshot cached before the event
    pub prior: Option<Arc<K>>,
    /// Snapshot cached after the event (`None` after a delete)
    pub current: Option<Arc<K>>,
}

/// Read handle on the cache
pub struct Store<K> {
    cache: Shared<K>,
}

/// The only handle that can mutate the cache
pub struct Writer<K> {
    cache: Shared<K>,
}

/// Create an empty cache, returning its read handle and its writer.
pub fn store<K>() -> (Store<K>, Writer<K>) {
    let cache = Arc::new(RwLock::new(Cache {
        objects: BTreeMap::new(),
        resource_version: None,
    }));
    (
        Store {
            cache: Arc::clone(&cache),
        },
        Writer { cache },
    )
}

impl<K> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<K> fmt::Debug for Store<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl<K> fmt::Debug for Writer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}

// A panic while holding the lock cannot leave the map half-written (every
// mutation is a single insert/remove/assign), so poisoning is ignored.
fn read<K>(cache: &Shared<K>) -> RwLockReadGuard<'_, Cache<K>> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<K>(cache: &Shared<K>) -> RwLockWriteGuard<'_, Cache<K>> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

impl<K> Store<K> {
    /// Cached snapshot for `key`
    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        read(&self.cache).objects.get(key).cloned()
    }

    /// All cached snapshots, in key order
    pub fn list(&self) -> Vec<Arc<K>> {
        read(&self.cache).objects.values().cloned().collect()
    }

    /// All cached keys, in order
    pub fn keys(&self) -> Vec<ObjectKey> {
        read(&self.cache).objects.keys().cloned().collect()
    }

    /// Number of cached objects
    pub fn len(&self) -> usize {
        read(&self.cache).objects.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        read(&self.cache).objects.is_empty()
    }

    /// resourceVersion of the last list or event applied
    pub fn resource_version(&self) -> Option<String> {
        read(&self.cache).resource_version.clone()
    }
}

impl<K: Resource> Writer<K> {
    /// Read handle on the cache this writer fills
    pub fn as_reader(&self) -> Store<K> {
        Store {
            cache: Arc::clone(&self.cache),
        }
    }

    /// Replace the whole cache with a List result.
    ///
    /// Returns the previous content. Duplicate keys in `objects` keep the
    /// last one.
    pub fn replace(
        &mut self,
        objects: Vec<K>,
        resource_version: &str,
    ) -> BTreeMap<ObjectKey, Arc<K>> {
        let fresh: BTreeMap<ObjectKey, Arc<K>> = objects
            .into_iter()
            .map(|obj| (ObjectKey::from_obj(&obj), Arc::new(obj)))
            .collect();
        let mut cache = write(&self.cache);
        cache.resource_version = Some(resource_version.to_string());
        std::mem::replace(&mut cache.objects, fresh)
    }

    /// Apply one watch event, returning the snapshot it replaced, if any.
    pub fn apply(&mut self, event: &WatchEvent<K>) -> Applied<K>
    where
        K: Clone,
    {
        let obj = event.object();
        let key = ObjectKey::from_obj(obj);
        let mut cache = write(&self.cache);
        if let Some(rv) = obj.meta().resource_version.as_ref() {
            cache.resource_version = Some(rv.clone());
        }
        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                let current = Arc::new(obj.clone());
                let prior = cache.objects.insert(key.clone(), Arc::clone(&current));
                Applied {
                    key,
                    prior,
                    current: Some(current),
                }
            }
            WatchEvent::Deleted(_) => {
                let prior = cache.objects.remove(&key);
                Applied {
                    key,
                    prior,
                    current: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{Message, MessageSpec};

    fn message(name: &str, payload: &str, rv: u64) -> Message {
        let mut message = Message::new(name, MessageSpec {
            message: payload.to_string(),
            urgent: false,
        });
        message.metadata.namespace = Some("default".to_string());
        message.metadata.resource_version = Some(rv.to_string());
        message
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let (store, _writer) = store::<Message>();
        assert!(store.get(&ObjectKey::new("default", "nope")).is_none());
        assert!(store.is_empty());
        assert_eq!(store.resource_version(), None);
    }

    #[test]
    fn test_event_sequence_leaves_last_snapshot() {
        let (store, mut writer) = store::<Message>();
        let events = vec![
            WatchEvent::Added(message("a", "one", 1)),
            WatchEvent::Added(message("b", "one", 2)),
            WatchEvent::Modified(message("a", "two", 3)),
            WatchEvent::Deleted(message("b", "one", 4)),
            WatchEvent::Modified(message("a", "three", 5)),
            WatchEvent::Added(message("c", "one", 6)),
            WatchEvent::Deleted(message("c", "one", 7)),
        ];
        for event in &events {
            writer.apply(event);
        }

        let a = store.get(&ObjectKey::new("default", "a")).unwrap();
        assert_eq!(a.spec.message, "three");
        assert!(store.get(&ObjectKey::new("default", "b")).is_none());
        assert!(store.get(&ObjectKey::new("default", "c")).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.resource_version().as_deref(), Some("7"));
    }

    #[test]
    fn test_apply_returns_prior_snapshot() {
        let (_store, mut writer) = store::<Message>();
        let applied = writer.apply(&WatchEvent::Added(message("a", "one", 1)));
        assert_eq!(applied.key.to_string(), "default/a");
        assert!(applied.prior.is_none());
        assert_eq!(applied.current.unwrap().spec.message, "one");

        let applied = writer.apply(&WatchEvent::Modified(message("a", "two", 2)));
        assert_eq!(applied.prior.unwrap().spec.message, "one");
        assert_eq!(applied.current.unwrap().spec.message, "two");

        let applied = writer.apply(&WatchEvent::Deleted(message("a", "two", 3)));
        assert_eq!(applied.prior.unwrap().spec.message, "two");
        assert!(applied.current.is_none());

        let applied = writer.apply(&WatchEvent::Deleted(message("a", "two", 4)));
        assert!(applied.prior.is_none());
    }

    #[test]
    fn test_replace_is_wholesale_and_idempotent_for_readers() {
        let (store, mut writer) = store::<Message>();
        writer.apply(&WatchEvent::Added(message("stale", "old", 1)));

        let previous = writer.replace(vec![message("a", "one", 2), message("b", "one", 3)], "3");
        assert_eq!(previous.len(), 1);
        assert!(previous.contains_key(&ObjectKey::new("default", "stale")));

        for _ in 0..3 {
            let names: Vec<String> = store.list().iter().map(|m| m.name_any()).collect();
            assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            assert!(store.get(&ObjectKey::new("default", "stale")).is_none());
            assert_eq!(store.resource_version().as_deref(), Some("3"));
        }
    }

    #[test]
    fn test_readers_share_the_writers_cache() {
        let (store, mut writer) = store::<Message>();
        let other = writer.as_reader();
        let cloned = store.clone();
        writer.apply(&WatchEvent::Added(message("a", "one", 1)));
        assert_eq!(other.len(), 1);
        assert_eq!(cloned.keys(), vec![ObjectKey::new("default", "a")]);
    }

    #[test]
    fn test_concurrent_readers_during_writes() {
        let (store, mut writer) = store::<Message>();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let len = store.len();
                        assert!(len <= 1);
                        let _ = store.list();
                    }
                })
            })
            .collect();
        for rv in 0..500 {
            writer.apply(&WatchEvent::Added(message("a", "x", rv)));
            writer.apply(&WatchEvent::Deleted(message("a", "x", rv)));
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(store.is_empty());
    }
}
