//! # Phase Transitions
//!
//! The transition function of the protocol state machine, free of any
//! I/O. The worker owns one [`PhaseTracker`], feeds it commands and
//! deadline expiries, and publishes whatever phase it reports.
//!
//! ```text
//!                 new_request                 confirmation (broadcast)
//!  FREE_FOR_SEND ───────────► WAITING_FOR_CONFIRMATION ─────────────► WAITING_AFTER_CONFIRMATION
//!       ▲   │                      │        │ timeout                              │ linger
//!       │   │ new_request (coord)  │        ▼                                      │
//!       │   │                      │   ..._CONFIRMATION_TIMED_OUT ── reset ──┐     │
//!       │   ▼          confirmation│                                         │     │
//!       │ WAITING_FOR_RESPONSE ◄───┘                                         │     │
//!       │   │        │ timeout                                               │     │
//!       │   │        ▼                                                       │     │
//!       │   │   ..._RESPONSE_TIMED_OUT ── reset ─────────────────────────────┤     │
//!       │   │ response                                                       │     │
//!       │   ▼                                                                │     │
//!       │ WAITING_AFTER_RESPONSE ── linger ──────────────────────────────────┤     │
//!       └────────────────────────────────────────────────────────────────────┴─────┘
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::timing::{
    after_confirmation_budget, after_response_budget, confirmation_budget, response_budget,
};
use crate::domain::{
    invariant_event_expected, invariant_free_for_send, invariant_resettable, Confirmation,
    DpaRequest, ExchangeContext, Phase, ProtocolError, TimingParameters,
};
use crate::events::Notification;

/// Current phase, exchange context and phase deadline.
#[derive(Clone, Debug, Default)]
pub struct PhaseTracker {
    phase: Phase,
    context: ExchangeContext,
    deadline: Option<Instant>,
}

impl PhaseTracker {
    /// Tracker in `FreeForSend` with no exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bookkeeping of the exchange in progress.
    pub fn context(&self) -> &ExchangeContext {
        &self.context
    }

    /// Instant at which the current phase expires by itself.
    ///
    /// `None` for `FreeForSend` and the timed-out phases, which wait
    /// indefinitely for an external command.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left in the current phase, if it is bounded.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// A request is about to be sent.
    pub fn new_request(
        &mut self,
        request: &DpaRequest,
        params: &TimingParameters,
        now: Instant,
    ) -> Result<Phase, ProtocolError> {
        invariant_free_for_send(self.phase)?;

        self.context = ExchangeContext::for_request(request);
        if self.context.expects_confirmation {
            let budget = confirmation_budget(params, true);
            self.enter(Phase::WaitingForConfirmation, Some(now + budget));
        } else {
            let budget = response_budget(params, None);
            self.enter(Phase::WaitingForResponse, Some(now + budget));
        }
        Ok(self.phase)
    }

    /// A confirmation arrived.
    pub fn confirmation_received(
        &mut self,
        received_at: Instant,
        confirmation: Confirmation,
        params: &TimingParameters,
        now: Instant,
    ) -> Result<Phase, ProtocolError> {
        invariant_event_expected(
            "confirmation_received",
            Phase::WaitingForConfirmation,
            Phase::WaitingForConfirmationTimedOut,
            self.phase,
        )?;

        self.context.record_confirmation(received_at, confirmation);
        if self.context.will_wait_for_response {
            let budget = response_budget(params, Some(&confirmation));
            self.enter(Phase::WaitingForResponse, Some(now + budget));
        } else {
            let budget = after_confirmation_budget(&confirmation, received_at, now);
            self.enter(Phase::WaitingAfterConfirmation, Some(now + budget));
        }
        Ok(self.phase)
    }

    /// A response arrived.
    pub fn response_received(
        &mut self,
        received_at: Instant,
        response_length: usize,
        now: Instant,
    ) -> Result<Phase, ProtocolError> {
        invariant_event_expected(
            "response_received",
            Phase::WaitingForResponse,
            Phase::WaitingForResponseTimedOut,
            self.phase,
        )?;

        self.context.record_response(received_at, response_length);
        let budget = after_response_budget(
            self.context.confirmation.as_ref(),
            response_length,
            received_at,
            now,
        );
        self.enter(Phase::WaitingAfterResponse, Some(now + budget));
        Ok(self.phase)
    }

    /// Leave a timed-out phase.
    pub fn reset_after_error(&mut self) -> Result<(Phase, Notification), ProtocolError> {
        invariant_resettable(self.phase)?;

        self.context = ExchangeContext::default();
        self.enter(Phase::FreeForSend, None);
        Ok((self.phase, Notification::FreeForSend))
    }

    /// The current phase deadline passed with no event.
    ///
    /// Returns the notification for the listener, or `None` when the
    /// phase has no deadline.
    pub fn deadline_expired(&mut self) -> Option<Notification> {
        self.deadline?;

        let (next, notification) = match self.phase {
            Phase::WaitingForConfirmation => (
                Phase::WaitingForConfirmationTimedOut,
                Notification::ConfirmationTimedOut,
            ),
            Phase::WaitingForResponse => (
                Phase::WaitingForResponseTimedOut,
                Notification::ResponseTimedOut,
            ),
            Phase::WaitingAfterConfirmation | Phase::WaitingAfterResponse => {
                self.context = ExchangeContext::default();
                (Phase::FreeForSend, Notification::FreeForSend)
            }
            Phase::FreeForSend
            | Phase::WaitingForConfirmationTimedOut
            | Phase::WaitingForResponseTimedOut => return None,
        };
        self.enter(next, None);
        Some(notification)
    }

    fn enter(&mut self, phase: Phase, deadline: Option<Instant>) {
        self.phase = phase;
        self.deadline = deadline;
    }
}
