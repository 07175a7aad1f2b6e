//! # Protocol State Machine Service
//!
//! Arbitrates the shared half-duplex IQMESH channel: one exchange at a
//! time, each going through request, confirmation and response with
//! wait budgets derived from the mesh routing metadata.
//!
//! ## Architecture
//!
//! The service implements the inbound port [`ProtocolStateApi`] and
//! notifies the outbound port [`ProtocolStateListener`].
//!
//! A single worker task owns the [`PhaseTracker`] and is the only writer
//! of the phase and the exchange context. Public operations hand a
//! [`Command`] to the worker through a single-slot channel and await the
//! reply on a oneshot channel, bounded by the state change guard timeout.
//! The worker publishes every phase on a watch channel, which backs the
//! snapshot queries.
//!
//! ## Race Policy
//!
//! The worker polls the phase deadline before the command slot. When a
//! deadline and an event become ready together the timeout wins, and the
//! event is refused with [`ProtocolError::StateTimeout`].

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::algorithms::PhaseTracker;
use crate::domain::{
    checked_millis, Confirmation, DpaRequest, Phase, ProtocolConfig, ProtocolError,
    TimingParameters,
};
use crate::events::{Command, CommandReply, Notification};
use crate::ports::inbound::ProtocolStateApi;
use crate::ports::outbound::ProtocolStateListener;

/// Listener slot shared by the handle and the worker.
///
/// Callbacks run while the worker holds the reentrant lock. Swapping the
/// listener from another thread therefore waits for an in-flight callback,
/// while a callback may still swap or remove its own registration.
struct ListenerSlot {
    inner: ReentrantMutex<RefCell<Option<Arc<dyn ProtocolStateListener>>>>,
}

impl ListenerSlot {
    fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    fn replace(&self, listener: Option<Arc<dyn ProtocolStateListener>>) {
        let slot = self.inner.lock();
        *slot.borrow_mut() = listener;
    }

    /// Deliver `notification`. Returns `false` when no listener is registered.
    fn notify(&self, notification: Notification) -> bool {
        let slot = self.inner.lock();
        // Release the borrow before the callback so it can re-enter `replace`.
        let listener = slot.borrow().clone();
        let Some(listener) = listener else {
            return false;
        };
        match notification {
            Notification::FreeForSend => listener.on_free_for_send(),
            Notification::ConfirmationTimedOut => listener.on_confirmation_timed_out(),
            Notification::ResponseTimedOut => listener.on_response_timed_out(),
        }
        true
    }
}

/// Halves of the channels moved into the worker on start.
struct WorkerParts {
    commands: mpsc::Receiver<Command>,
    phase_tx: watch::Sender<Phase>,
}

/// DPA protocol state machine.
///
/// Constructed once per communication session, started, used for the
/// session's duration and destroyed at its end. It is not reusable after
/// [`destroy`](Self::destroy).
///
/// ## Thread Safety
///
/// All operations take `&self`; share the machine via `Arc`.
pub struct ProtocolStateMachine {
    /// Guard timeouts and grace periods.
    config: ProtocolConfig,
    /// Protocol timing, read by the worker on every transition.
    timing: Arc<RwLock<TimingParameters>>,
    /// Registered listener.
    listener: Arc<ListenerSlot>,
    /// Single-slot handoff to the worker.
    command_tx: mpsc::Sender<Command>,
    /// Phase published by the worker.
    phase_rx: watch::Receiver<Phase>,
    /// Shutdown signal for the worker.
    shutdown_tx: watch::Sender<bool>,
    /// Channel halves waiting for `start`.
    parts: Mutex<Option<WorkerParts>>,
    /// Worker task, present between `start` and `destroy`.
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    running: AtomicBool,
}

impl ProtocolStateMachine {
    /// Create a machine from a validated configuration.
    pub fn new(config: ProtocolConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let timing = TimingParameters::from_config(&config)?;
        Ok(Self::build(config, timing))
    }

    /// Create a machine with default timing.
    pub fn with_defaults() -> Self {
        Self::build(ProtocolConfig::default(), TimingParameters::default())
    }

    fn build(config: ProtocolConfig, timing: TimingParameters) -> Self {
        let (command_tx, commands) = mpsc::channel(1);
        let (phase_tx, phase_rx) = watch::channel(Phase::FreeForSend);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            timing: Arc::new(RwLock::new(timing)),
            listener: Arc::new(ListenerSlot::new()),
            command_tx,
            phase_rx,
            shutdown_tx,
            parts: Mutex::new(Some(WorkerParts { commands, phase_tx })),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Spawn the worker task on the current Tokio runtime.
    pub fn start(&self) -> Result<(), ProtocolError> {
        debug!("start - start");

        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            self.started.store(false, Ordering::Release);
            warn!(error = %e, "No Tokio runtime to start the worker on");
            ProtocolError::NotRunning
        })?;
        let Some(parts) = self.parts.lock().take() else {
            return Err(ProtocolError::AlreadyStarted);
        };

        let worker = Worker {
            tracker: PhaseTracker::new(),
            commands: parts.commands,
            phase_tx: parts.phase_tx,
            timing: Arc::clone(&self.timing),
            listener: Arc::clone(&self.listener),
            shutdown: self.shutdown_tx.subscribe(),
        };
        *self.worker.lock() = Some(runtime.spawn(worker.run()));
        self.running.store(true, Ordering::Release);

        info!("Protocol state machine started");
        Ok(())
    }

    /// Stop the worker and release its resources.
    ///
    /// Waits at most the configured join grace period; a worker still
    /// running after that is aborted and the anomaly logged. Calling this
    /// more than once is a no-op.
    pub async fn destroy(&self) {
        debug!("destroy - start");

        // A destroyed machine never starts, whether or not it ran before.
        self.started.store(true, Ordering::Release);
        self.parts.lock().take();

        let Some(mut handle) = self.worker.lock().take() else {
            debug!("Protocol state machine not running, nothing to destroy");
            return;
        };
        self.running.store(false, Ordering::Release);
        if self.shutdown_tx.send(true).is_err() {
            debug!("Worker already gone before shutdown signal");
        }

        let grace = self.config.join_grace_period();
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => info!("Protocol state machine worker stopped"),
            Ok(Err(e)) => warn!(error = %e, "Protocol state machine worker ended abnormally"),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Protocol state machine worker did not stop in time, aborting"
                );
                handle.abort();
            }
        }

        info!("Protocol state machine destroyed");
    }

    /// Receiver of every phase the worker enters.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_rx.clone()
    }

    /// Wait until the channel is free for the next request.
    pub async fn wait_until_free_for_send(&self, timeout: Duration) -> Result<(), ProtocolError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ProtocolError::NotRunning);
        }
        let mut phases = self.phase_rx.clone();
        let outcome =
            tokio::time::timeout(timeout, phases.wait_for(|phase| *phase == Phase::FreeForSend))
                .await;
        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::NotRunning),
            Err(_) => Err(ProtocolError::StateChangeTimeout(timeout)),
        }
    }

    /// Configuration the machine was built with.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Hand a command to the worker and await its reply under the guard timeout.
    async fn dispatch<F>(&self, build: F) -> CommandReply
    where
        F: FnOnce(oneshot::Sender<CommandReply>) -> Command,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(ProtocolError::NotRunning);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = build(reply_tx);
        let operation = command.operation();
        let command_tx = self.command_tx.clone();

        let exchange = async move {
            if command_tx.send(command).await.is_err() {
                return Err(ProtocolError::NotRunning);
            }
            match reply_rx.await {
                Ok(reply) => reply,
                Err(_) => Err(ProtocolError::NotRunning),
            }
        };

        let guard = self.config.state_change_timeout();
        match tokio::time::timeout(guard, exchange).await {
            Ok(reply) => {
                debug!(operation, ?reply, "Command acknowledged");
                reply
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = guard.as_millis() as u64,
                    "Worker did not acknowledge state change in time"
                );
                Err(ProtocolError::StateChangeTimeout(guard))
            }
        }
    }
}

impl Default for ProtocolStateMachine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Drop for ProtocolStateMachine {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = self.shutdown_tx.send(true);
            handle.abort();
        }
    }
}

#[async_trait]
impl ProtocolStateApi for ProtocolStateMachine {
    fn register_listener(&self, listener: Arc<dyn ProtocolStateListener>) {
        self.listener.replace(Some(listener));
        info!("Listener registered");
    }

    fn unregister_listener(&self) {
        self.listener.replace(None);
        info!("Listener unregistered");
    }

    fn is_free_for_send(&self) -> bool {
        *self.phase_rx.borrow() == Phase::FreeForSend
    }

    fn get_state(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    fn time_to_wait_for_confirmation(&self) -> Duration {
        self.timing.read().time_to_wait_for_confirmation
    }

    fn set_time_to_wait_for_confirmation(&self, ms: i64) -> Result<(), ProtocolError> {
        let value = checked_millis("time_to_wait_for_confirmation", ms)?;
        self.timing.write().time_to_wait_for_confirmation = value;
        debug!(ms, "Time to wait for confirmation set");
        Ok(())
    }

    fn base_time_to_wait_for_response(&self) -> Duration {
        self.timing.read().base_time_to_wait_for_response
    }

    fn set_base_time_to_wait_for_response(&self, ms: i64) -> Result<(), ProtocolError> {
        let value = checked_millis("base_time_to_wait_for_response", ms)?;
        self.timing.write().base_time_to_wait_for_response = value;
        debug!(ms, "Base time to wait for response set");
        Ok(())
    }

    async fn new_request(&self, request: &DpaRequest) -> Result<Phase, ProtocolError> {
        debug!(address = %request.address, pnum = request.peripheral, pcmd = request.command, "new_request");
        let request = request.clone();
        self.dispatch(|reply| Command::NewRequest { request, reply })
            .await
    }

    async fn confirmation_received_at(
        &self,
        received_at: Instant,
        confirmation: Confirmation,
    ) -> Result<Phase, ProtocolError> {
        debug!(?confirmation, "confirmation_received");
        self.dispatch(|reply| Command::ConfirmationReceived {
            received_at,
            confirmation,
            reply,
        })
        .await
    }

    async fn response_received_at(
        &self,
        received_at: Instant,
        response: &[u8],
    ) -> Result<Phase, ProtocolError> {
        debug!(length = response.len(), "response_received");
        let response_length = response.len();
        self.dispatch(|reply| Command::ResponseReceived {
            received_at,
            response_length,
            reply,
        })
        .await
    }

    async fn reset_after_error(&self) -> Result<(), ProtocolError> {
        debug!("reset_after_error");
        self.dispatch(|reply| Command::ResetAfterError { reply })
            .await
            .map(|_| ())
    }
}

/// The single writer of phase and exchange context.
struct Worker {
    tracker: PhaseTracker,
    commands: mpsc::Receiver<Command>,
    phase_tx: watch::Sender<Phase>,
    timing: Arc<RwLock<TimingParameters>>,
    listener: Arc<ListenerSlot>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        info!("Protocol state machine worker running");

        loop {
            let deadline = self.tracker.deadline();
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    debug!("Shutdown signal received");
                    break;
                }
                _ = wait_for_deadline(deadline) => self.on_deadline(),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
            }
        }

        info!(phase = %self.tracker.phase(), "Protocol state machine worker finished");
    }

    fn on_deadline(&mut self) {
        let from = self.tracker.phase();
        let Some(notification) = self.tracker.deadline_expired() else {
            return;
        };
        let to = self.tracker.phase();

        if to.is_timed_out() {
            warn!(%from, %to, "Phase timed out");
        }
        self.publish(from, to);
        self.notify(notification);
    }

    fn on_command(&mut self, command: Command) {
        let now = Instant::now();
        let params = *self.timing.read();
        let from = self.tracker.phase();
        let operation = command.operation();

        let (reply, result, notification) = match command {
            Command::NewRequest { request, reply } => {
                let result = self.tracker.new_request(&request, &params, now);
                (reply, result, None)
            }
            Command::ConfirmationReceived {
                received_at,
                confirmation,
                reply,
            } => {
                let result =
                    self.tracker
                        .confirmation_received(received_at, confirmation, &params, now);
                (reply, result, None)
            }
            Command::ResponseReceived {
                received_at,
                response_length,
                reply,
            } => {
                let result = self
                    .tracker
                    .response_received(received_at, response_length, now);
                (reply, result, None)
            }
            Command::ResetAfterError { reply } => match self.tracker.reset_after_error() {
                Ok((phase, notification)) => (reply, Ok(phase), Some(notification)),
                Err(e) => (reply, Err(e), None),
            },
        };

        match &result {
            Ok(to) => {
                self.publish(from, *to);
                if let Some(remaining) = self.tracker.remaining(now) {
                    debug!(phase = %to, wait_ms = remaining.as_millis() as u64, "Time to wait");
                }
            }
            Err(e) => warn!(operation, phase = %from, error = %e, "Command refused"),
        }

        if reply.send(result).is_err() {
            warn!(operation, "Caller gave up before the reply was sent");
        }
        if let Some(notification) = notification {
            self.notify(notification);
        }
    }

    fn publish(&self, from: Phase, to: Phase) {
        info!(%from, %to, "Phase changed");
        self.phase_tx.send_replace(to);
    }

    fn notify(&self, notification: Notification) {
        if !self.listener.notify(notification) {
            debug!(?notification, "No listener registered");
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
