//! # Domain Invariants
//!
//! Rules that must hold for every exchange on the shared channel.

use super::entities::ExchangeContext;
use super::errors::ProtocolError;
use super::value_objects::Phase;

/// Invariant: a new request is accepted only on a free channel.
pub fn invariant_free_for_send(phase: Phase) -> Result<(), ProtocolError> {
    if phase != Phase::FreeForSend {
        return Err(ProtocolError::ContractViolation {
            operation: "new_request",
            phase,
        });
    }
    Ok(())
}

/// Invariant: an event is accepted only in the phase waiting for it.
///
/// An event hitting the timed-out variant of its phase lost the race
/// against the timeout and is reported as such, not as a caller bug.
pub fn invariant_event_expected(
    operation: &'static str,
    expected: Phase,
    timed_out: Phase,
    actual: Phase,
) -> Result<(), ProtocolError> {
    if actual == expected {
        return Ok(());
    }
    if actual == timed_out {
        return Err(ProtocolError::StateTimeout { phase: actual });
    }
    Err(ProtocolError::ContractViolation {
        operation,
        phase: actual,
    })
}

/// Invariant: reset is only meaningful from a timed-out phase.
pub fn invariant_resettable(phase: Phase) -> Result<(), ProtocolError> {
    if !phase.is_timed_out() {
        return Err(ProtocolError::ContractViolation {
            operation: "reset_after_error",
            phase,
        });
    }
    Ok(())
}

/// Invariant: a confirmation is present exactly when the exchange went
/// through a successful confirmation phase.
pub fn invariant_confirmation_consistent(phase: Phase, ctx: &ExchangeContext) -> bool {
    match phase {
        Phase::FreeForSend | Phase::WaitingForConfirmation => ctx.confirmation.is_none(),
        Phase::WaitingForConfirmationTimedOut => ctx.confirmation.is_none(),
        Phase::WaitingAfterConfirmation => ctx.confirmation.is_some(),
        Phase::WaitingForResponse | Phase::WaitingForResponseTimedOut | Phase::WaitingAfterResponse => {
            ctx.confirmation.is_some() == ctx.expects_confirmation
        }
    }
}
