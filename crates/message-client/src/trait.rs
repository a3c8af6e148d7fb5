//! MessageClient trait for mocking
//!
//! This trait abstracts the Kubernetes API for `Message` resources so the
//! controller can be driven by an in-memory mock in tests.

use crate::error::ClientError;
use crate::event::{MessageList, WatchStream};
use crds::Message;

/// List-watch source and status mutator for `Message` resources
///
/// The namespace scope is fixed when the client is constructed; the selector
/// is always "everything". All async methods must be `Send` to work with
/// Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MessageClientTrait: Send + Sync {
    /// List all Messages in scope together with the collection resourceVersion.
    async fn list(&self) -> Result<MessageList, ClientError>;

    /// Watch for changes after `resource_version`.
    ///
    /// The returned stream ends (possibly without error) when the server
    /// closes it or the resourceVersion window expires.
    async fn watch(&self, resource_version: &str) -> Result<WatchStream<Message>, ClientError>;

    /// Write the status of `message`, identified by namespace/name.
    ///
    /// When `message.metadata.resourceVersion` is set the write is conditioned
    /// on it and fails with [`ClientError::Conflict`] if the object changed.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotFound`], [`ClientError::Conflict`] or a transport error.
    async fn update_status(&self, message: &Message) -> Result<Message, ClientError>;
}
