//! Message CRD Definitions
//!
//! Kubernetes Custom Resource Definition for the Message Controller.

pub mod message;

pub use message::*;
