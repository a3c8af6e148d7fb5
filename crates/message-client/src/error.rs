//! Message client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API about Messages
#[derive(Debug, Error)]
pub enum ClientError {
    /// Resource not found (deleted concurrently, wrong namespace, ...)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write raced with a concurrent change (resourceVersion mismatch)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Any other Kubernetes API or connection error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// The watch stream reported an error event
    #[error("Watch error: {0}")]
    Watch(String),

    /// Network/transport failure not originating from kube (used by the mock)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 404 => {
                Self::NotFound(response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 409 && response.reason == "AlreadyExists" => {
                Self::AlreadyExists(response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                Self::Conflict(response.message.clone())
            }
            other => Self::Kube(other),
        }
    }
}

