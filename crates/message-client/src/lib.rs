//! Message API Client
//!
//! List, watch and status-update operations for `Message` resources.
//!
//! The controller only talks to [`MessageClientTrait`]. [`MessageClient`] is
//! the Kubernetes-backed implementation; with the `test-util` feature an
//! in-memory [`MockMessageClient`] is available for unit and scenario tests.
//!
//! # Example
//!
//! ```no_run
//! use message_client::{MessageClient, MessageClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let client = MessageClient::new(kube_client, Some("default"));
//!
//! let list = client.list().await?;
//! println!("{} messages at resourceVersion {}", list.items.len(), list.resource_version);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event;
#[path = "trait.rs"]
pub mod message_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::MessageClient;
pub use error::ClientError;
pub use event::{MessageList, ObjectList, WatchEvent, WatchStream};
pub use message_trait::MessageClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockMessageClient;
