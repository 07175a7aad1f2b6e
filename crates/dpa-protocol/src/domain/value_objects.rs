//! # Value Objects
//!
//! Phases of the exchange, IQMESH node addresses and confirmation metadata.

use serde::{Deserialize, Serialize};

/// Phase of the request/confirmation/response exchange.
///
/// Exactly one phase is active at a time. The machine starts in
/// [`Phase::FreeForSend`] and cycles for the lifetime of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Channel is free, a new request may be sent.
    #[default]
    FreeForSend,
    /// Request sent, confirmation expected within the confirmation budget.
    WaitingForConfirmation,
    /// No confirmation arrived in time. Left only via reset.
    WaitingForConfirmationTimedOut,
    /// Confirmation received, no response follows; routing still in flight.
    WaitingAfterConfirmation,
    /// Response expected within the response budget.
    WaitingForResponse,
    /// No response arrived in time. Left only via reset.
    WaitingForResponseTimedOut,
    /// Response received; waiting until the mesh has drained.
    WaitingAfterResponse,
}

impl Phase {
    /// Phases left only by `reset_after_error`.
    pub fn is_timed_out(&self) -> bool {
        matches!(
            self,
            Phase::WaitingForConfirmationTimedOut | Phase::WaitingForResponseTimedOut
        )
    }

    /// Phases that expect an external event within a budget.
    pub fn expects_event(&self) -> bool {
        matches!(
            self,
            Phase::WaitingForConfirmation | Phase::WaitingForResponse
        )
    }

    /// Mandatory linger phases that end by themselves.
    pub fn is_linger(&self) -> bool {
        matches!(
            self,
            Phase::WaitingAfterConfirmation | Phase::WaitingAfterResponse
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::FreeForSend => "FREE_FOR_SEND",
            Phase::WaitingForConfirmation => "WAITING_FOR_CONFIRMATION",
            Phase::WaitingForConfirmationTimedOut => "WAITING_FOR_CONFIRMATION_TIMED_OUT",
            Phase::WaitingAfterConfirmation => "WAITING_AFTER_CONFIRMATION",
            Phase::WaitingForResponse => "WAITING_FOR_RESPONSE",
            Phase::WaitingForResponseTimedOut => "WAITING_FOR_RESPONSE_TIMED_OUT",
            Phase::WaitingAfterResponse => "WAITING_AFTER_RESPONSE",
        };
        write!(f, "{}", name)
    }
}

/// IQMESH network device address (NAdr).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(pub u16);

impl NodeAddress {
    /// IQMESH coordinator.
    pub const COORDINATOR: NodeAddress = NodeAddress(0x00);
    /// Lowest node address.
    pub const NODE_MIN: NodeAddress = NodeAddress(0x01);
    /// Highest node address.
    pub const NODE_MAX: NodeAddress = NodeAddress(0xEF);
    /// Local device reached over SPI.
    pub const LOCAL_DEVICE: NodeAddress = NodeAddress(0xFC);
    /// Temporary address held by a node during bonding. Reserved as a target.
    pub const TEMPORARY: NodeAddress = NodeAddress(0xFE);
    /// Broadcast to all nodes.
    pub const BROADCAST: NodeAddress = NodeAddress(0xFF);

    /// Address of a bonded node.
    pub fn node(id: u8) -> Self {
        NodeAddress(u16::from(id))
    }

    /// Broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Requests to these addresses never travel the mesh, so no
    /// confirmation is sent for them.
    pub fn is_coordinator_local(&self) -> bool {
        *self == Self::COORDINATOR || *self == Self::LOCAL_DEVICE
    }

    /// Address inside the bonded node range.
    pub fn is_node(&self) -> bool {
        (Self::NODE_MIN.0..=Self::NODE_MAX.0).contains(&self.0)
    }

    /// Reserved by the DPA framework; must not be used as a target.
    ///
    /// Covers `0xF0..=0xFB`, `0xFD`, [`TEMPORARY`](Self::TEMPORARY) and
    /// anything above one byte.
    pub fn is_reserved(&self) -> bool {
        !(self.is_coordinator_local() || self.is_node() || self.is_broadcast())
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Confirmation metadata used to predict the routing round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Hops the request travels.
    pub hop_count: u8,
    /// One hop's time slot, in 10 ms units.
    pub timeslot_length: u8,
    /// Hops the response travels. Zero when no response follows.
    pub hop_count_response: u8,
}

impl Confirmation {
    /// Create confirmation metadata.
    pub fn new(hop_count: u8, timeslot_length: u8, hop_count_response: u8) -> Self {
        Self {
            hop_count,
            timeslot_length,
            hop_count_response,
        }
    }

    /// Whether the confirmed request is followed by a routed response.
    pub fn announces_response(&self) -> bool {
        self.hop_count_response != 0
    }
}
