//! Message Controller
//!
//! Watches `Message` resources and moves every newly created Message from
//! `Created` to `Broadcasted` with a single status write.
//!
//! The core is a list-watch [`Informer`]: it keeps an in-memory [`Store`] in
//! sync with the API server and hands add/update/delete notifications to
//! registered [`EventHandler`]s. The [`Reconciler`] is the handler that
//! performs the status transition.

pub mod backoff;
pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod informer;
pub mod reconciler;
pub mod store;
pub mod wait;
mod test_utils;

pub use backoff::{Backoff, FibonacciBackoff};
pub use config::ControllerConfig;
pub use controller::Controller;
pub use dispatcher::{Dispatcher, EventHandler, Notification};
pub use error::ControllerError;
pub use informer::{shutdown_channel, Informer, ShutdownSender, ShutdownSignal};
pub use reconciler::Reconciler;
pub use store::{ObjectKey, Store, Writer};
pub use wait::wait_for_broadcasted;
