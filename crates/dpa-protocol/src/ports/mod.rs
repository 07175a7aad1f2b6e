//! # Ports Module
//!
//! Hexagonal architecture ports.

pub mod inbound;
pub mod outbound;

pub use inbound::ProtocolStateApi;
pub use outbound::{FrameSender, MockFrameSender, ProtocolStateListener};
