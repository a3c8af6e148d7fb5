//! Waiting for Messages to be processed.

use crate::error::ControllerError;
use crate::store::{ObjectKey, Store};
use crds::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Default poll interval for [`wait_for_broadcasted`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default overall timeout for [`wait_for_broadcasted`]
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `store` every `interval` until `key` is cached as `Broadcasted`.
///
/// # Errors
///
/// [`ControllerError::Timeout`] if that does not happen within `timeout`.
pub async fn wait_for_broadcasted(
    store: &Store<Message>,
    key: &ObjectKey,
    interval: Duration,
    timeout: Duration,
) -> Result<Arc<Message>, ControllerError> {
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(message) = store.get(key).filter(|message| message.is_broadcasted()) {
                return message;
            }
        }
    };
    tokio::time::timeout(timeout, poll).await.map_err(|_| {
        ControllerError::Timeout(format!(
            "Message {key} not Broadcasted within {}ms",
            timeout.as_millis()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::store;
    use crate::test_utils::create_test_message;
    use crds::{MessageState, MessageStatus};
    use message_client::WatchEvent;

    #[tokio::test]
    async fn test_times_out_when_never_broadcasted() {
        let (reader, mut writer) = store::<Message>();
        writer.apply(&WatchEvent::Added(create_test_message("firstmessage", "default")));

        let result = wait_for_broadcasted(
            &reader,
            &ObjectKey::new("default", "firstmessage"),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(result, Err(ControllerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_returns_once_broadcasted() {
        let (reader, mut writer) = store::<Message>();
        let key = ObjectKey::new("default", "firstmessage");

        let waiter = tokio::spawn({
            let reader = reader.clone();
            let key = key.clone();
            async move {
                wait_for_broadcasted(&reader, &key, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT).await
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut message = create_test_message("firstmessage", "default");
        message.status = Some(MessageStatus {
            state: MessageState::Broadcasted,
            last_reconciled: None,
        });
        writer.apply(&WatchEvent::Modified(message));

        let found = waiter.await.unwrap().unwrap();
        assert!(found.is_broadcasted());
    }
}
