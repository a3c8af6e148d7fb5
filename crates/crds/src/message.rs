//! Message CRD
//!
//! A free-text message that the controller broadcasts exactly once.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "message.example.com",
    version = "v1",
    kind = "Message",
    plural = "messages",
    namespaced,
    status = "MessageStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MessageSpec {
    /// Message payload
    pub message: String,

    /// Whether the producer marked the message as urgent
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    /// Broadcast state
    pub state: MessageState,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Message broadcast state
///
/// `Created` is set by the producer, `Broadcasted` only by the controller.
/// There is no transition back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum MessageState {
    /// Created by the producer, not yet broadcast
    #[default]
    #[serde(alias = "created")]
    Created,

    /// Broadcast by the controller (terminal)
    #[serde(alias = "broadcasted")]
    Broadcasted,
}

impl Message {
    /// Current broadcast state. A message without status counts as `Created`.
    #[must_use]
    pub fn state(&self) -> MessageState {
        self.status
            .as_ref()
            .map(|status| status.state)
            .unwrap_or_default()
    }

    /// Whether the controller has already broadcast this message.
    #[must_use]
    pub fn is_broadcasted(&self) -> bool {
        self.state() == MessageState::Broadcasted
    }
}
