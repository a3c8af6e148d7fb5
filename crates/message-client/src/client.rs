//! Kubernetes-backed Message client

use crate::error::ClientError;
use crate::event::{MessageList, WatchEvent, WatchStream};
use crate::message_trait::MessageClientTrait;
use crds::Message;
use futures::{StreamExt, TryStreamExt};
use kube::api::{ListParams, Patch, PatchParams, WatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Server-side watch timeout in seconds.
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

/// Largest watch timeout kube accepts (`WatchParams` requires < 295s).
pub const MAX_WATCH_TIMEOUT_SECS: u32 = 294;

/// Message client talking to the Kubernetes API server
#[derive(Clone)]
pub struct MessageClient {
    client: Client,
    api: Api<Message>,
    watch_timeout_secs: u32,
}

impl std::fmt::Debug for MessageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageClient")
            .field("watch_timeout_secs", &self.watch_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl MessageClient {
    /// Create a client scoped to `namespace`, or to all namespaces when `None`.
    #[must_use]
    pub fn new(client: Client, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };
        Self {
            client,
            api,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }

    /// Override the server-side watch timeout, capped at [`MAX_WATCH_TIMEOUT_SECS`].
    #[must_use]
    pub fn with_watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = secs.min(MAX_WATCH_TIMEOUT_SECS);
        self
    }

    /// Status writes go through the namespaced API even when listing across
    /// all namespaces.
    fn api_for(&self, message: &Message) -> Api<Message> {
        match message.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => self.api.clone(),
        }
    }
}

/// Build the status merge patch. Carrying `metadata.resourceVersion` turns the
/// write into a compare-and-swap on the server.
pub(crate) fn status_patch(message: &Message) -> serde_json::Value {
    let mut patch = serde_json::json!({
        "status": message.status.clone().unwrap_or_default(),
    });
    if let Some(rv) = message.metadata.resource_version.as_deref() {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }
    patch
}

fn convert_event(event: kube::api::WatchEvent<Message>) -> Option<Result<WatchEvent<Message>, ClientError>> {
    match event {
        kube::api::WatchEvent::Added(obj) => Some(Ok(WatchEvent::Added(obj))),
        kube::api::WatchEvent::Modified(obj) => Some(Ok(WatchEvent::Modified(obj))),
        kube::api::WatchEvent::Deleted(obj) => Some(Ok(WatchEvent::Deleted(obj))),
        kube::api::WatchEvent::Bookmark(bookmark) => {
            debug!("Message watch bookmark at {}", bookmark.metadata.resource_version);
            None
        }
        kube::api::WatchEvent::Error(status) => {
            Some(Err(ClientError::Watch(format!("{status:?}"))))
        }
    }
}

#[async_trait::async_trait]
impl MessageClientTrait for MessageClient {
    async fn list(&self) -> Result<MessageList, ClientError> {
        let list = self.api.list(&ListParams::default()).await?;
        Ok(MessageList {
            resource_version: list.metadata.resource_version.unwrap_or_default(),
            items: list.items,
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<Message>, ClientError> {
        let wp = WatchParams::default().timeout(self.watch_timeout_secs);
        let version = if resource_version.is_empty() { "0" } else { resource_version };
        let stream = self.api.watch(&wp, version).await?;
        Ok(stream
            .map_err(ClientError::from)
            .filter_map(|result| async move {
                match result {
                    Ok(event) => convert_event(event),
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed())
    }

    async fn update_status(&self, message: &Message) -> Result<Message, ClientError> {
        let name = message.name_any();
        let patch = status_patch(message);
        let updated = self
            .api_for(message)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{MessageSpec, MessageState, MessageStatus};

    fn broadcasted(resource_version: Option<&str>) -> Message {
        let mut message = Message::new("firstmessage", MessageSpec {
            message: "hello".to_string(),
            urgent: false,
        });
        message.metadata.namespace = Some("default".to_string());
        message.metadata.resource_version = resource_version.map(str::to_string);
        message.status = Some(MessageStatus {
            state: MessageState::Broadcasted,
            last_reconciled: None,
        });
        message
    }

    #[test]
    fn test_max_watch_timeout_passes_kube_validation() {
        assert!(WatchParams::default().timeout(MAX_WATCH_TIMEOUT_SECS).validate().is_ok());
        assert!(WatchParams::default().timeout(MAX_WATCH_TIMEOUT_SECS + 1).validate().is_err());
        assert!(DEFAULT_WATCH_TIMEOUT_SECS <= MAX_WATCH_TIMEOUT_SECS);
    }

    #[test]
    fn test_status_patch_without_resource_version() {
        let patch = status_patch(&broadcasted(None));
        assert_eq!(patch, serde_json::json!({ "status": { "state": "Broadcasted" } }));
    }

    #[test]
    fn test_status_patch_is_conditioned_on_resource_version() {
        let patch = status_patch(&broadcasted(Some("42")));
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["state"], "Broadcasted");
    }
}
