//! # DPA Protocol State Machine
//!
//! Arbitration of the half-duplex IQMESH channel between a host and its
//! coordinator.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Only one DPA exchange may be in flight at a time. Each exchange goes
//! through request, confirmation and response, and the channel stays busy
//! for a computed time after each of them so the mesh can drain:
//! - Confirmation wait budget from the configured timeout
//! - Response wait budget from the routing metadata in the confirmation
//! - Linger after confirmation or response derived from hops and timeslots
//!
//! ## Phases
//!
//! | Phase | Left by |
//! |-------|---------|
//! | `FreeForSend` | `new_request` |
//! | `WaitingForConfirmation` | confirmation or timeout |
//! | `WaitingForResponse` | response or timeout |
//! | `WaitingAfterConfirmation` | deadline only |
//! | `WaitingAfterResponse` | deadline only |
//! | `*TimedOut` | `reset_after_error` |
//!
//! ## Module Structure
//!
//! ```text
//! dpa-protocol/
//! ├── domain/          # Phase, NodeAddress, DpaRequest, frames, config, errors
//! ├── algorithms/      # Timing budgets and the phase transition function
//! ├── events/          # Worker commands and listener notifications
//! ├── ports/           # API trait + listener and transport traits
//! ├── adapters/        # DpaChannel, listener implementations
//! └── service.rs       # ProtocolStateMachine: handle + worker task
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod events;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{DpaChannel, NotificationForwarder, RecordingListener, TracingListener};
pub use algorithms::{
    after_confirmation_budget, after_response_budget, confirmation_budget, request_routing_time,
    response_budget, routing_time, timeslot_for_length, PhaseTracker,
};
pub use domain::{
    encode_confirmation, encode_response, Confirmation, DpaRequest, ExchangeContext, FrameHeader,
    IncomingFrame, NodeAddress, Phase, ProtocolConfig, ProtocolError, TimingParameters,
    PDATA_MAX_LENGTH,
};
pub use events::Notification;
pub use ports::{FrameSender, MockFrameSender, ProtocolStateApi, ProtocolStateListener};
pub use service::ProtocolStateMachine;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
