//! Simulated coordinator and mesh.
//!
//! [`SimulatedMesh`] is a [`FrameSender`] that answers every request frame
//! with the confirmation and response frames a real coordinator would
//! deliver, scheduled on the Tokio clock. A pump task feeds them back into
//! the channel when they fall due.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use dpa_protocol::{
    encode_confirmation, encode_response, Confirmation, DpaChannel, DpaRequest, FrameSender,
    NodeAddress, Phase, ProtocolConfig, ProtocolError, ProtocolStateApi, ProtocolStateMachine,
    RecordingListener,
};

/// How the simulated mesh answers requests.
#[derive(Clone, Debug)]
pub struct MeshBehaviour {
    /// Routing metadata put in confirmations.
    pub confirmation: Confirmation,
    /// Delay from request to confirmation.
    pub confirmation_delay: Duration,
    /// Delay from confirmation (or request, for the coordinator) to response.
    pub response_delay: Duration,
    /// Response payload after the 8-byte header.
    pub response_data: Vec<u8>,
    pub drop_confirmation: bool,
    pub drop_response: bool,
}

impl Default for MeshBehaviour {
    fn default() -> Self {
        Self {
            confirmation: Confirmation::new(1, 8, 1),
            confirmation_delay: Duration::from_millis(20),
            response_delay: Duration::from_millis(60),
            response_data: vec![0x00, 0x01],
            drop_confirmation: false,
            drop_response: false,
        }
    }
}

/// A frame due to arrive from the coordinator.
#[derive(Debug)]
pub struct Delivery {
    pub due: Instant,
    pub frame: Vec<u8>,
}

/// Frame sender answering like a coordinator in front of a mesh.
pub struct SimulatedMesh {
    behaviour: Mutex<MeshBehaviour>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl SimulatedMesh {
    pub fn new(behaviour: MeshBehaviour) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (deliveries, rx) = mpsc::unbounded_channel();
        let mesh = Self {
            behaviour: Mutex::new(behaviour),
            deliveries,
            sent: Mutex::new(Vec::new()),
        };
        (mesh, rx)
    }

    /// Change how later requests are answered.
    pub fn set_behaviour(&self, behaviour: MeshBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    fn schedule(&self, due: Instant, frame: Vec<u8>) -> Result<(), ProtocolError> {
        self.deliveries
            .send(Delivery { due, frame })
            .map_err(|_| ProtocolError::Send("mesh pump stopped".to_string()))
    }
}

/// Rebuild the request a frame was encoded from.
pub fn parse_request(frame: &[u8]) -> Result<DpaRequest, ProtocolError> {
    if frame.len() < 6 {
        return Err(ProtocolError::Frame(format!(
            "request frame too short: {} bytes",
            frame.len()
        )));
    }
    Ok(
        DpaRequest::new(NodeAddress(u16::from_le_bytes([frame[0], frame[1]])), frame[2], frame[3])
            .with_hw_profile(u16::from_le_bytes([frame[4], frame[5]]))
            .with_data(frame[6..].to_vec()),
    )
}

#[async_trait]
impl FrameSender for SimulatedMesh {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.sent.lock().push(frame.to_vec());
        let request = parse_request(frame)?;
        let behaviour = self.behaviour.lock().clone();
        let now = Instant::now();

        if request.is_for_coordinator() {
            if !behaviour.drop_response {
                let response = encode_response(&request, 0x00, &behaviour.response_data);
                self.schedule(now + behaviour.response_delay, response)?;
            }
            return Ok(());
        }

        if behaviour.drop_confirmation {
            debug!(address = %request.address, "Mesh dropping confirmation");
            return Ok(());
        }
        let confirmed_at = now + behaviour.confirmation_delay;
        self.schedule(
            confirmed_at,
            encode_confirmation(&request, &behaviour.confirmation),
        )?;

        if !request.is_broadcast() && !behaviour.drop_response {
            let response = encode_response(&request, 0x00, &behaviour.response_data);
            self.schedule(confirmed_at + behaviour.response_delay, response)?;
        }
        Ok(())
    }
}

/// Machine, channel, mesh and pump wired together.
pub struct MeshHarness {
    pub channel: Arc<DpaChannel<SimulatedMesh>>,
    pub listener: Arc<RecordingListener>,
    /// Outcome of every delivered frame, in delivery order.
    pub outcomes: Arc<Mutex<Vec<Result<Phase, ProtocolError>>>>,
    pump: JoinHandle<()>,
}

impl MeshHarness {
    /// Start a machine with `config` in front of a mesh behaving as `behaviour`.
    pub fn start(config: ProtocolConfig, behaviour: MeshBehaviour) -> Result<Self, ProtocolError> {
        let machine = ProtocolStateMachine::new(config)?;
        let listener = Arc::new(RecordingListener::new());
        machine.register_listener(listener.clone());
        machine.start()?;

        let (mesh, mut deliveries) = SimulatedMesh::new(behaviour);
        let channel = Arc::new(DpaChannel::new(Arc::new(machine), mesh));
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        let pump_channel = Arc::clone(&channel);
        let pump_outcomes = Arc::clone(&outcomes);
        let pump = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                tokio::time::sleep_until(delivery.due).await;
                let outcome = pump_channel
                    .frame_received(&delivery.frame, delivery.due)
                    .await;
                pump_outcomes.lock().push(outcome);
            }
        });

        Ok(Self {
            channel,
            listener,
            outcomes,
            pump,
        })
    }

    pub fn machine(&self) -> &ProtocolStateMachine {
        self.channel.machine()
    }

    pub fn mesh(&self) -> &SimulatedMesh {
        self.channel.sender()
    }

    pub fn outcomes(&self) -> Vec<Result<Phase, ProtocolError>> {
        self.outcomes.lock().clone()
    }

    /// Wait until the machine enters `phase`.
    pub async fn wait_for_phase(&self, phase: Phase) {
        let mut phases = self.machine().subscribe_phase();
        let _ = phases.wait_for(|p| *p == phase).await;
    }

    pub async fn shutdown(self) {
        self.pump.abort();
        self.channel.machine().destroy().await;
    }
}
