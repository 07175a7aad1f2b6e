//! # Domain Errors
//!
//! Error types for the DPA protocol state machine.

use std::time::Duration;

use thiserror::Error;

use super::value_objects::Phase;

/// Protocol state machine error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Operation invoked from a phase that does not accept it.
    ///
    /// Always a caller bug; the machine never retries it.
    #[error("Contract violation: {operation} not allowed in phase {phase}")]
    ContractViolation {
        /// Rejected operation
        operation: &'static str,
        /// Phase at the time of the call
        phase: Phase,
    },

    /// Event delivery lost the race against the phase timeout.
    ///
    /// The event has been discarded and the machine is in `phase`.
    #[error("State timed out before the event was accepted, now in {phase}")]
    StateTimeout {
        /// Timed-out phase the machine is in
        phase: Phase,
    },

    /// Invalid configuration value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The worker did not acknowledge a command within the guard timeout.
    #[error("Worker did not acknowledge state change within {0:?}")]
    StateChangeTimeout(Duration),

    /// `start()` called on an already started machine.
    #[error("Protocol state machine already started")]
    AlreadyStarted,

    /// Machine not started yet, or already destroyed.
    #[error("Protocol state machine is not running")]
    NotRunning,

    /// Malformed or oversized DPA frame.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Transport failed to send a frame.
    #[error("Send error: {0}")]
    Send(String),
}

impl ProtocolError {
    /// Whether this error is a contract violation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, ProtocolError::ContractViolation { .. })
    }

    /// Whether this error reports an event that lost the race to a timeout.
    pub fn is_state_timeout(&self) -> bool {
        matches!(self, ProtocolError::StateTimeout { .. })
    }
}
