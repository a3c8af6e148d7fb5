//! List and watch payloads
//!
//! Typed replacements for the untyped objects an informer would otherwise
//! hand around: every event carries a concrete resource snapshot.

use crate::error::ClientError;
use futures::stream::BoxStream;

/// A single change observed on the watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    /// Object was created
    Added(K),
    /// Object was changed
    Modified(K),
    /// Object was removed; carries its last state
    Deleted(K),
}

impl<K> WatchEvent<K> {
    /// Snapshot carried by the event.
    pub fn object(&self) -> &K {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj,
        }
    }

    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "Added",
            Self::Modified(_) => "Modified",
            Self::Deleted(_) => "Deleted",
        }
    }
}

/// Result of a full List: the items and the resourceVersion to watch from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectList<K> {
    /// All objects in scope at `resource_version`
    pub items: Vec<K>,
    /// Collection resourceVersion returned by the List
    pub resource_version: String,
}

/// List of Messages
pub type MessageList = ObjectList<crds::Message>;

/// Stream of watch events. Ends without error when the server closes it.
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, ClientError>>;
