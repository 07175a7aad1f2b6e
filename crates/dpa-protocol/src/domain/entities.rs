//! # Domain Entities
//!
//! Outgoing DPA requests and the context of the exchange in progress.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::value_objects::{Confirmation, NodeAddress};

/// Maximum length of request data (PData) in bytes.
pub const PDATA_MAX_LENGTH: usize = 56;

/// DPA request as seen by the protocol layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpaRequest {
    /// Target address (NAdr).
    pub address: NodeAddress,
    /// Peripheral number (PNum).
    pub peripheral: u8,
    /// Peripheral command (PCmd).
    pub command: u8,
    /// HW profile id (HWPID).
    pub hw_profile: u16,
    /// Request data (PData).
    pub data: Vec<u8>,
}

impl DpaRequest {
    /// Create a request without data, using the default HW profile.
    pub fn new(address: NodeAddress, peripheral: u8, command: u8) -> Self {
        Self {
            address,
            peripheral,
            command,
            hw_profile: 0x0000,
            data: Vec::new(),
        }
    }

    /// Attach request data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Use a specific HW profile.
    pub fn with_hw_profile(mut self, hw_profile: u16) -> Self {
        self.hw_profile = hw_profile;
        self
    }

    /// Broadcast requests never get a unicast response.
    pub fn is_broadcast(&self) -> bool {
        self.address.is_broadcast()
    }

    /// Coordinator-local requests skip the confirmation phase.
    pub fn is_for_coordinator(&self) -> bool {
        self.address.is_coordinator_local()
    }
}

/// Context of the single outstanding exchange.
///
/// Overwritten on every new request; owned exclusively by the worker.
#[derive(Clone, Debug, Default)]
pub struct ExchangeContext {
    /// Request in progress.
    pub active_request: Option<DpaRequest>,
    /// False only for coordinator-local requests.
    pub expects_confirmation: bool,
    /// False only for broadcast requests.
    pub will_wait_for_response: bool,
    /// Confirmation consumed in this exchange.
    pub confirmation: Option<Confirmation>,
    /// When the confirmation was received.
    pub confirmation_received_at: Option<Instant>,
    /// Byte length of the received response frame.
    pub response_length: usize,
    /// When the response was received.
    pub response_received_at: Option<Instant>,
}

impl ExchangeContext {
    /// Fresh context for a request about to be sent.
    pub fn for_request(request: &DpaRequest) -> Self {
        Self {
            expects_confirmation: !request.is_for_coordinator(),
            will_wait_for_response: !request.is_broadcast(),
            active_request: Some(request.clone()),
            ..Default::default()
        }
    }

    /// Record the consumed confirmation.
    pub fn record_confirmation(&mut self, received_at: Instant, confirmation: Confirmation) {
        self.confirmation = Some(confirmation);
        self.confirmation_received_at = Some(received_at);
    }

    /// Record the received response.
    pub fn record_response(&mut self, received_at: Instant, response_length: usize) {
        self.response_length = response_length;
        self.response_received_at = Some(received_at);
    }
}
