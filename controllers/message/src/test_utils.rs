//! Test utilities for unit testing the informer and reconciler
//!
//! This module provides helpers for creating test data.

#[cfg(test)]
use crds::{Message, MessageSpec, MessageState, MessageStatus};

/// Helper to create a test Message in state `Created`
#[cfg(test)]
pub fn create_test_message(name: &str, namespace: &str) -> Message {
    let mut message = Message::new(name, MessageSpec {
        message: format!("hello from {name}"),
        urgent: false,
    });
    message.metadata.namespace = Some(namespace.to_string());
    message.status = Some(MessageStatus {
        state: MessageState::Created,
        last_reconciled: None,
    });
    message
}
