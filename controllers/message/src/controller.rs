//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Message
//! informer to the reconciler and runs it on a background task.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::informer::{Informer, ShutdownSignal};
use crate::reconciler::Reconciler;
use crate::store::Store;
use crds::Message;
use message_client::MessageClientTrait;
use std::sync::Arc;
use tracing::info;

/// Main controller for Message broadcasting.
#[derive(Debug)]
pub struct Controller {
    informer: Informer,
    store: Store<Message>,
}

impl Controller {
    /// Creates a new controller instance with the reconciler registered.
    pub fn new(client: Arc<dyn MessageClientTrait>, config: &ControllerConfig) -> Self {
        info!("Initializing Message Controller");

        let reconciler = Arc::new(Reconciler::new(Arc::clone(&client), config.conditional_writes));
        let mut informer = Informer::new(client, Box::new(config.backoff()), config.resync_period);
        informer.register_handlers(reconciler);
        let store = informer.store();

        Self { informer, store }
    }

    /// Read handle on the Message cache.
    pub fn store(&self) -> Store<Message> {
        self.store.clone()
    }

    /// Runs the controller until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Propagates a fatal watch setup failure, or reports a panicked informer.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), ControllerError> {
        info!("Message Controller running");

        let watcher = tokio::spawn(self.informer.run(shutdown));
        watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Message informer panicked: {e}")))?
    }
}
