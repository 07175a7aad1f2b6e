//! # Timing Arithmetic
//!
//! Wait budgets of the individual phases, derived from mesh routing
//! metadata carried by confirmations.
//!
//! All timeslot values are in protocol units of 10 ms. Every budget is
//! non-negative; subtractions of elapsed time saturate at zero.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{Confirmation, TimingParameters};

/// Milliseconds per protocol timeslot unit.
pub const TIMESLOT_UNIT_MS: u64 = 10;

/// Fixed guard margin added to the response wait [ms].
pub const RESPONSE_GUARD_MARGIN_MS: u64 = 100;

/// Response length below which the short timeslot applies.
pub const SHORT_RESPONSE_LIMIT: usize = 19;

/// Response length below which the medium timeslot applies.
pub const MEDIUM_RESPONSE_LIMIT: usize = 41;

/// Timeslot (10 ms units) occupied by a response of `response_length` bytes.
pub fn timeslot_for_length(response_length: usize) -> u64 {
    if response_length < SHORT_RESPONSE_LIMIT {
        return 8;
    }
    if response_length < MEDIUM_RESPONSE_LIMIT {
        return 9;
    }
    10
}

/// Time for a routed transmission over `hops` hops with `timeslot` per hop.
///
/// `(hops + 1) * timeslot * 10 ms`
pub fn routing_time(hops: u8, timeslot: u64) -> Duration {
    Duration::from_millis((u64::from(hops) + 1) * timeslot * TIMESLOT_UNIT_MS)
}

/// Time for the confirmed request to travel the mesh.
pub fn request_routing_time(confirmation: &Confirmation) -> Duration {
    routing_time(
        confirmation.hop_count,
        u64::from(confirmation.timeslot_length),
    )
}

/// Budget of `WaitingForConfirmation`.
pub fn confirmation_budget(params: &TimingParameters, expects_confirmation: bool) -> Duration {
    if expects_confirmation {
        params.time_to_wait_for_confirmation
    } else {
        Duration::ZERO
    }
}

/// Budget of `WaitingForResponse`.
///
/// `base + (confirmed ? request routing : 0) + 100 ms`
pub fn response_budget(params: &TimingParameters, confirmation: Option<&Confirmation>) -> Duration {
    let routing = confirmation
        .map(request_routing_time)
        .unwrap_or(Duration::ZERO);
    params.base_time_to_wait_for_response
        + routing
        + Duration::from_millis(RESPONSE_GUARD_MARGIN_MS)
}

/// Budget of `WaitingAfterConfirmation`: what remains of the request
/// routing time since the confirmation arrived.
pub fn after_confirmation_budget(
    confirmation: &Confirmation,
    confirmation_received_at: Instant,
    now: Instant,
) -> Duration {
    let elapsed = now.saturating_duration_since(confirmation_received_at);
    request_routing_time(confirmation).saturating_sub(elapsed)
}

/// Budget of `WaitingAfterResponse`: what remains of the request and
/// response routing time since the response arrived.
pub fn after_response_budget(
    confirmation: Option<&Confirmation>,
    response_length: usize,
    response_received_at: Instant,
    now: Instant,
) -> Duration {
    let slot = timeslot_for_length(response_length);
    let total = match confirmation {
        Some(confirmation) => {
            request_routing_time(confirmation)
                + routing_time(confirmation.hop_count_response, slot)
        }
        None => Duration::from_millis(slot * TIMESLOT_UNIT_MS),
    };
    let elapsed = now.saturating_duration_since(response_received_at);
    total.saturating_sub(elapsed)
}
