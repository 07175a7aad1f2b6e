//! Ready-made [`ProtocolStateListener`] implementations.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::Notification;
use crate::ports::outbound::ProtocolStateListener;

/// Logs every notification.
#[derive(Debug, Default)]
pub struct TracingListener;

impl ProtocolStateListener for TracingListener {
    fn on_free_for_send(&self) {
        info!("Channel free for send");
    }

    fn on_confirmation_timed_out(&self) {
        warn!("Confirmation timed out");
    }

    fn on_response_timed_out(&self) {
        warn!("Response timed out");
    }
}

/// Counts notifications.
#[derive(Debug, Default)]
pub struct RecordingListener {
    free_for_send: AtomicUsize,
    confirmation_timeouts: AtomicUsize,
    response_timeouts: AtomicUsize,
}

impl RecordingListener {
    /// Listener with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `on_free_for_send` calls.
    pub fn free_for_send_count(&self) -> usize {
        self.free_for_send.load(Ordering::SeqCst)
    }

    /// Number of `on_confirmation_timed_out` calls.
    pub fn confirmation_timeouts(&self) -> usize {
        self.confirmation_timeouts.load(Ordering::SeqCst)
    }

    /// Number of `on_response_timed_out` calls.
    pub fn response_timeouts(&self) -> usize {
        self.response_timeouts.load(Ordering::SeqCst)
    }

    /// Total notifications of any kind.
    pub fn total(&self) -> usize {
        self.free_for_send_count() + self.confirmation_timeouts() + self.response_timeouts()
    }
}

impl ProtocolStateListener for RecordingListener {
    fn on_free_for_send(&self) {
        self.free_for_send.fetch_add(1, Ordering::SeqCst);
    }

    fn on_confirmation_timed_out(&self) {
        self.confirmation_timeouts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_response_timed_out(&self) {
        self.response_timeouts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Forwards notifications into a channel so they can be awaited.
///
/// The channel is unbounded so the worker never blocks on a slow consumer.
#[derive(Debug)]
pub struct NotificationForwarder {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationForwarder {
    /// Forwarder and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!(?notification, "Notification receiver dropped");
        }
    }
}

impl ProtocolStateListener for NotificationForwarder {
    fn on_free_for_send(&self) {
        self.forward(Notification::FreeForSend);
    }

    fn on_confirmation_timed_out(&self) {
        self.forward(Notification::ConfirmationTimedOut);
    }

    fn on_response_timed_out(&self) {
        self.forward(Notification::ResponseTimedOut);
    }
}
