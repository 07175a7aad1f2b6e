//! # Outbound Ports
//!
//! Traits for the collaborators the state machine talks to: the
//! application-side listener and the transport that sends frames.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::ProtocolError;

/// Observer of channel availability - outbound port.
///
/// Invoked from the worker task. Implementations must return quickly.
/// A callback may call `register_listener` or `unregister_listener`; no
/// callback is delivered once `unregister_listener` has returned.
pub trait ProtocolStateListener: Send + Sync {
    /// The channel is free for the next request.
    fn on_free_for_send(&self) {}

    /// No confirmation arrived in time.
    fn on_confirmation_timed_out(&self) {}

    /// No response arrived in time.
    fn on_response_timed_out(&self) {}
}

/// Transport sending raw DPA frames - outbound port.
#[async_trait]
pub trait FrameSender: Send + Sync {
    /// Send one frame to the coordinator.
    async fn send_frame(&self, frame: &[u8]) -> Result<(), ProtocolError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Frame sender that records every frame.
#[derive(Default)]
pub struct MockFrameSender {
    /// Frames sent so far.
    pub sent: Mutex<Vec<Vec<u8>>>,
    /// Fail every send when set.
    pub fail: bool,
}

impl MockFrameSender {
    /// Recording sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Number of frames sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl FrameSender for MockFrameSender {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        if self.fail {
            return Err(ProtocolError::Send("mock transport down".to_string()));
        }
        self.sent.lock().push(frame.to_vec());
        Ok(())
    }
}
