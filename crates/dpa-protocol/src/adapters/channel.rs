//! # DPA Channel
//!
//! Glues a [`FrameSender`] transport to the [`ProtocolStateMachine`]:
//! outgoing requests wait for a free channel and are announced before the
//! frame leaves; incoming frames are decoded and routed to the matching
//! event.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{DpaRequest, IncomingFrame, Phase, ProtocolError};
use crate::ports::inbound::ProtocolStateApi;
use crate::ports::outbound::FrameSender;
use crate::service::ProtocolStateMachine;

/// Transport-facing side of the protocol state machine.
pub struct DpaChannel<S: FrameSender> {
    machine: Arc<ProtocolStateMachine>,
    sender: S,
    send_wait_timeout: Duration,
}

impl<S: FrameSender> DpaChannel<S> {
    /// Channel using the machine's configured send wait timeout.
    pub fn new(machine: Arc<ProtocolStateMachine>, sender: S) -> Self {
        let send_wait_timeout = machine.config().send_wait_timeout();
        Self {
            machine,
            sender,
            send_wait_timeout,
        }
    }

    /// Override how long `send_request` waits for a free channel.
    pub fn with_send_wait_timeout(mut self, timeout: Duration) -> Self {
        self.send_wait_timeout = timeout;
        self
    }

    /// Machine the channel drives.
    pub fn machine(&self) -> &Arc<ProtocolStateMachine> {
        &self.machine
    }

    /// Transport the frames go out on.
    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Send a request once the channel is free.
    ///
    /// The machine is told about the request before the frame is handed to
    /// the transport, so a fast confirmation cannot overtake it. If the
    /// transport then fails, the machine stays in its waiting phase until
    /// the wait times out and is reset.
    ///
    /// Losing the free channel to a concurrent sender is retried until the
    /// send wait timeout is spent.
    pub async fn send_request(&self, request: &DpaRequest) -> Result<Phase, ProtocolError> {
        let frame = request.to_frame()?;
        let deadline = Instant::now() + self.send_wait_timeout;

        let phase = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.machine.wait_until_free_for_send(remaining).await?;
            match self.machine.new_request(request).await {
                Ok(phase) => break phase,
                Err(e) if e.is_contract_violation() && Instant::now() < deadline => {
                    debug!(address = %request.address, "Channel taken by another sender, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        if let Err(e) = self.sender.send_frame(&frame).await {
            warn!(address = %request.address, error = %e, "Failed to send request frame");
            return Err(e);
        }

        debug!(address = %request.address, length = frame.len(), %phase, "Request sent");
        Ok(phase)
    }

    /// Route a frame received from the coordinator.
    pub async fn frame_received(
        &self,
        bytes: &[u8],
        received_at: Instant,
    ) -> Result<Phase, ProtocolError> {
        match IncomingFrame::decode(bytes)? {
            IncomingFrame::Confirmation {
                header,
                confirmation,
            } => {
                debug!(address = %header.address, ?confirmation, "Confirmation frame");
                self.machine
                    .confirmation_received_at(received_at, confirmation)
                    .await
            }
            IncomingFrame::Response { header, length, .. } => {
                debug!(
                    address = %header.address,
                    response_code = header.response_code,
                    length,
                    "Response frame"
                );
                self.machine.response_received_at(received_at, bytes).await
            }
        }
    }
}
