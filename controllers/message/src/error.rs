//! Controller-specific error types.
//!
//! This module defines error types specific to the Message Controller
//! that are not covered by the client layer.

use message_client::ClientError;
use thiserror::Error;

/// Errors that can occur in the Message Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Message API error (list, watch or status write)
    #[error("Message API error: {0}")]
    Client(#[from] ClientError),

    /// Kubernetes API error outside the Message client (bootstrap)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The first list or watch could not be established
    #[error("Watch setup failed: {0}")]
    Setup(#[source] ClientError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Waiting for a condition timed out
    #[error("Timed out: {0}")]
    Timeout(String),
}
