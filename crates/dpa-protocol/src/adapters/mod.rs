//! # Adapters
//!
//! Transport glue and listener implementations.

pub mod channel;
pub mod listeners;

pub use channel::DpaChannel;
pub use listeners::{NotificationForwarder, RecordingListener, TracingListener};
