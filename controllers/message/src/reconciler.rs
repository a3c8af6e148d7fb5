//! Reconciliation logic for Message CRDs.
//!
//! A newly observed Message in state `Created` gets exactly one status write
//! that moves it to `Broadcasted`. Updates and deletes are only logged.

use crate::dispatcher::EventHandler;
use crate::error::ControllerError;
use crate::store::ObjectKey;
use chrono::Utc;
use crds::{Message, MessageState, MessageStatus};
use message_client::MessageClientTrait;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles Message resources.
pub struct Reconciler {
    client: Arc<dyn MessageClientTrait>,
    conditional_writes: bool,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("conditional_writes", &self.conditional_writes)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    ///
    /// With `conditional_writes` the status write carries the observed
    /// resourceVersion and fails with a conflict if the object changed in
    /// between; otherwise the write is keyed by namespace/name only and can
    /// overwrite a concurrent status edit.
    pub fn new(client: Arc<dyn MessageClientTrait>, conditional_writes: bool) -> Self {
        Self {
            client,
            conditional_writes,
        }
    }

    /// Copy of `message` with the terminal status, or `None` if it already
    /// has it.
    pub fn desired(&self, message: &Message) -> Option<Message> {
        if message.state() != MessageState::Created {
            return None;
        }
        // Never touch the cached snapshot; work on a copy.
        let mut copy = message.clone();
        copy.status = Some(MessageStatus {
            state: MessageState::Broadcasted,
            last_reconciled: Some(Utc::now()),
        });
        if !self.conditional_writes {
            copy.metadata.resource_version = None;
        }
        Some(copy)
    }

    /// Reconciles a Message resource.
    ///
    /// This method:
    /// 1. Skips Messages that are already `Broadcasted`
    /// 2. Builds a copy with status `Broadcasted`
    /// 3. Writes the status once; failures are returned, never retried
    pub async fn reconcile_message(&self, message: &Message) -> Result<(), ControllerError> {
        let key = ObjectKey::from_obj(message);
        let Some(desired) = self.desired(message) else {
            debug!("Message {} already {:?}, nothing to do", key, message.state());
            return Ok(());
        };

        info!("Broadcasting Message {}: {}", key, message.spec.message);
        let updated = self.client.update_status(&desired).await?;
        info!(
            "Updated Message {} status to {:?} (resourceVersion {})",
            key,
            updated.state(),
            updated.metadata.resource_version.as_deref().unwrap_or("<none>")
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventHandler<Message> for Reconciler {
    async fn on_add(&self, obj: &Message) -> Result<(), ControllerError> {
        info!("Message added: {}", ObjectKey::from_obj(obj));
        self.reconcile_message(obj).await
    }

    async fn on_update(&self, old: &Message, new: &Message) -> Result<(), ControllerError> {
        info!(
            "Message updated: {} ({:?} -> {:?})",
            ObjectKey::from_obj(new),
            old.state(),
            new.state()
        );
        Ok(())
    }

    async fn on_delete(&self, obj: &Message) -> Result<(), ControllerError> {
        info!("Message deleted: {}", ObjectKey::from_obj(obj));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, Notification};
    use crate::test_utils::create_test_message;
    use message_client::{ClientError, MockMessageClient};

    fn reconciler(mock: &MockMessageClient, conditional_writes: bool) -> Reconciler {
        Reconciler::new(Arc::new(mock.clone()), conditional_writes)
    }

    #[tokio::test]
    async fn test_created_message_is_broadcast_once() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        let reconciler = reconciler(&mock, false);

        reconciler.on_add(&created).await.unwrap();

        let calls = mock.update_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_broadcasted());
        assert!(calls[0].status.as_ref().unwrap().last_reconciled.is_some());
        assert!(mock.get("default", "firstmessage").unwrap().is_broadcasted());
    }

    #[tokio::test]
    async fn test_second_add_of_broadcasted_message_is_a_no_op() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        let reconciler = reconciler(&mock, false);

        reconciler.on_add(&created).await.unwrap();
        let broadcasted = mock.get("default", "firstmessage").unwrap();
        reconciler.on_add(&broadcasted).await.unwrap();

        assert_eq!(mock.update_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_not_mutated() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        let snapshot = Arc::new(created);
        let reconciler = reconciler(&mock, false);

        reconciler.on_add(&snapshot).await.unwrap();

        assert_eq!(snapshot.state(), MessageState::Created);
        assert!(snapshot.status.as_ref().unwrap().last_reconciled.is_none());
    }

    #[tokio::test]
    async fn test_identity_write_overwrites_concurrent_change() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        // An external edit lands between observation and write.
        mock.modify(created.clone()).unwrap();
        let reconciler = reconciler(&mock, false);

        reconciler.on_add(&created).await.unwrap();

        assert!(mock.update_calls()[0].metadata.resource_version.is_none());
        assert!(mock.get("default", "firstmessage").unwrap().is_broadcasted());
    }

    #[tokio::test]
    async fn test_conditional_write_conflicts_on_concurrent_change() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        mock.modify(created.clone()).unwrap();
        let reconciler = reconciler(&mock, true);

        let result = reconciler.on_add(&created).await;

        assert!(matches!(result, Err(ControllerError::Client(ClientError::Conflict(_)))));
        assert_eq!(mock.update_calls().len(), 1);
        assert!(!mock.get("default", "firstmessage").unwrap().is_broadcasted());
    }

    #[tokio::test]
    async fn test_deleted_message_is_reported_not_retried() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        mock.delete("default", "firstmessage").unwrap();
        let reconciler = reconciler(&mock, false);

        let result = reconciler.on_add(&created).await;

        assert!(matches!(result, Err(ControllerError::Client(ClientError::NotFound(_)))));
        assert_eq!(mock.update_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_surfaces_through_dispatch() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        mock.fail_next_update(ClientError::Transport("connection reset".to_string()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(reconciler(&mock, false)));

        let failures = dispatcher
            .dispatch(&ObjectKey::from_obj(&created), &Notification::Added(Arc::new(created)))
            .await;

        assert_eq!(failures, 1);
        assert_eq!(mock.update_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_are_observe_only() {
        let mock = MockMessageClient::new();
        let created = mock.create(create_test_message("firstmessage", "default")).unwrap();
        let reconciler = reconciler(&mock, false);

        reconciler.on_update(&created, &created).await.unwrap();
        reconciler.on_delete(&created).await.unwrap();

        assert!(mock.update_calls().is_empty());
    }
}
