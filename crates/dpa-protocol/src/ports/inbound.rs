//! # Inbound Ports
//!
//! API trait defining what the protocol state machine offers to the
//! sending side and to the transport's receive path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::outbound::ProtocolStateListener;
use crate::domain::{Confirmation, DpaRequest, Phase, ProtocolError};

/// Protocol state API - inbound port.
#[async_trait]
pub trait ProtocolStateApi: Send + Sync {
    /// Register the listener, replacing any previous one.
    fn register_listener(&self, listener: Arc<dyn ProtocolStateListener>);

    /// Remove the listener. No callback is delivered once this returns.
    fn unregister_listener(&self);

    /// Snapshot: is the channel free for the next request?
    fn is_free_for_send(&self) -> bool;

    /// Snapshot of the current phase.
    fn get_state(&self) -> Phase;

    /// Current confirmation budget.
    fn time_to_wait_for_confirmation(&self) -> Duration;

    /// Fails with `InvalidArgument` for negative values.
    fn set_time_to_wait_for_confirmation(&self, ms: i64) -> Result<(), ProtocolError>;

    /// Current response budget before routing time is added.
    fn base_time_to_wait_for_response(&self) -> Duration;

    /// Fails with `InvalidArgument` for negative values.
    fn set_base_time_to_wait_for_response(&self, ms: i64) -> Result<(), ProtocolError>;

    /// Announce a request about to be sent. Returns the phase entered.
    async fn new_request(&self, request: &DpaRequest) -> Result<Phase, ProtocolError>;

    /// Deliver a confirmation received at `received_at`.
    async fn confirmation_received_at(
        &self,
        received_at: Instant,
        confirmation: Confirmation,
    ) -> Result<Phase, ProtocolError>;

    /// Deliver a response of `response` bytes received at `received_at`.
    async fn response_received_at(
        &self,
        received_at: Instant,
        response: &[u8],
    ) -> Result<Phase, ProtocolError>;

    /// Leave a timed-out phase.
    async fn reset_after_error(&self) -> Result<(), ProtocolError>;

    /// Deliver a confirmation received now.
    async fn confirmation_received(
        &self,
        confirmation: Confirmation,
    ) -> Result<Phase, ProtocolError> {
        self.confirmation_received_at(Instant::now(), confirmation)
            .await
    }

    /// Deliver a response received now.
    async fn response_received(&self, response: &[u8]) -> Result<Phase, ProtocolError> {
        self.response_received_at(Instant::now(), response).await
    }
}
