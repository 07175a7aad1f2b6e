//! # Worker Events
//!
//! Messages exchanged between the machine handle and its worker task.
//!
//! Every command carries its own reply channel, so a caller awaits the
//! outcome of exactly its own command.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::domain::{Confirmation, DpaRequest, Phase, ProtocolError};

/// Reply to a command: the phase entered, or why the command was refused.
pub type CommandReply = Result<Phase, ProtocolError>;

/// Command handed to the worker through the single-slot channel.
#[derive(Debug)]
pub enum Command {
    /// A request is about to be sent.
    NewRequest {
        /// Request being announced.
        request: DpaRequest,
        /// Where the outcome is sent.
        reply: oneshot::Sender<CommandReply>,
    },
    /// A confirmation was received.
    ConfirmationReceived {
        /// When the transport received the frame.
        received_at: Instant,
        /// Routing parameters of the exchange.
        confirmation: Confirmation,
        /// Where the outcome is sent.
        reply: oneshot::Sender<CommandReply>,
    },
    /// A response was received.
    ResponseReceived {
        /// When the transport received the frame.
        received_at: Instant,
        /// Byte length of the whole response frame.
        response_length: usize,
        /// Where the outcome is sent.
        reply: oneshot::Sender<CommandReply>,
    },
    /// Leave a timed-out phase.
    ResetAfterError {
        /// Where the outcome is sent.
        reply: oneshot::Sender<CommandReply>,
    },
}

impl Command {
    /// Name of the public operation that issued the command.
    pub fn operation(&self) -> &'static str {
        match self {
            Command::NewRequest { .. } => "new_request",
            Command::ConfirmationReceived { .. } => "confirmation_received",
            Command::ResponseReceived { .. } => "response_received",
            Command::ResetAfterError { .. } => "reset_after_error",
        }
    }
}

/// Notification delivered to the registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Channel became free.
    FreeForSend,
    /// No confirmation arrived in time.
    ConfirmationTimedOut,
    /// No response arrived in time.
    ResponseTimedOut,
}
