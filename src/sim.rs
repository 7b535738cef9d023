//! In-process mesh for running a node on a host: a channel backed transport
//! and a gateway that behaves like the real one.

use std::time::Duration;

use common::{
    DeviceType, Envelope, KeepAlive, Payload, PeerAddress, SetCommand, ENVELOPE_LEN,
};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::config::SimulationConfig;
use crate::mesh::{AckEvent, Delivery, InboundFrame, MeshTransport, SequenceId};

/// A unicast frame on its way to the gateway.
#[derive(Clone, Debug)]
pub struct OutboundFrame {
    pub sequence_id: SequenceId,
    pub destination: PeerAddress,
    pub bytes: [u8; ENVELOPE_LEN],
}

pub struct SimTransport {
    address: PeerAddress,
    next_sequence: SequenceId,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    sent: u64,
}

impl SimTransport {
    pub fn new(address: PeerAddress, outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            address,
            next_sequence: 0,
            outbound,
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl MeshTransport for SimTransport {
    fn local_address(&self) -> PeerAddress {
        self.address
    }

    fn send_unicast(&mut self, frame: &[u8; ENVELOPE_LEN], destination: PeerAddress) -> SequenceId {
        let sequence_id = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.sent += 1;

        let frame = OutboundFrame {
            sequence_id,
            destination,
            bytes: *frame,
        };
        if self.outbound.send(frame).is_err() {
            // Nobody listening, same as the radio losing it
            trace!("Frame #{} to {} went nowhere", sequence_id, destination);
        }
        sequence_id
    }

    fn maintenance(&mut self) {
        if self.outbound.is_closed() {
            trace!("Simulated gateway is gone");
        }
    }
}

/// Node end of the simulated link.
pub struct NodeLink {
    pub frames: mpsc::UnboundedReceiver<InboundFrame>,
    pub acks: mpsc::UnboundedReceiver<AckEvent>,
}

pub struct SimulatedGateway {
    settings: SimulationConfig,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    frames: mpsc::UnboundedSender<InboundFrame>,
    acks: mpsc::UnboundedSender<AckEvent>,
    rng: StdRng,
    keep_alives: u32,
    bridge_online: bool,
}

/// Wires a transport, the node's receive side and a gateway together.
pub fn link(settings: &SimulationConfig) -> (SimTransport, NodeLink, SimulatedGateway) {
    link_with_rng(settings, StdRng::from_entropy())
}

pub fn link_with_rng(
    settings: &SimulationConfig,
    rng: StdRng,
) -> (SimTransport, NodeLink, SimulatedGateway) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (acks_tx, acks_rx) = mpsc::unbounded_channel();

    let transport = SimTransport::new(settings.node_address, outbound_tx);
    let node = NodeLink {
        frames: frames_rx,
        acks: acks_rx,
    };
    let gateway = SimulatedGateway {
        settings: settings.clone(),
        outbound: outbound_rx,
        frames: frames_tx,
        acks: acks_tx,
        rng,
        keep_alives: 0,
        bridge_online: true,
    };
    (transport, node, gateway)
}

impl SimulatedGateway {
    /// Runs until the node side goes away.
    pub async fn run(mut self) {
        info!("Simulated gateway {} up", self.settings.gateway_address);

        let mut keep_alive = interval(Duration::from_secs(self.settings.keep_alive_secs));
        let mut commands = interval(Duration::from_secs(self.settings.set_command_secs));
        // Let the node bind before the first command
        commands.tick().await;

        loop {
            tokio::select! {
                _ = keep_alive.tick() => {
                    if !self.broadcast_keep_alive() {
                        break;
                    }
                }
                _ = commands.tick() => {
                    let command = self.random_command();
                    if !self.send(Delivery::Unicast, Payload::Set(command)) {
                        break;
                    }
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => self.receive(frame),
                    None => break,
                },
            }
        }

        info!("Simulated gateway {} down", self.settings.gateway_address);
    }

    /// Decodes a frame from the node and acknowledges it, sometimes negatively.
    pub fn receive(&mut self, frame: OutboundFrame) {
        let success = !self.rng.gen_bool(self.settings.ack_failure_rate.clamp(0.0, 1.0));

        if success {
            match Envelope::decode(&frame.bytes) {
                Ok(envelope) => debug!(
                    "Gateway got {:?} #{}: {:?}",
                    envelope.kind(),
                    frame.sequence_id,
                    envelope.payload
                ),
                Err(e) => warn!("Gateway got an undecodable frame #{}: {}", frame.sequence_id, e),
            }
        } else {
            debug!("Gateway dropped #{}", frame.sequence_id);
        }

        let _ = self.acks.send(AckEvent {
            destination: frame.destination,
            sequence_id: frame.sequence_id,
            success,
        });
    }

    /// Returns false once the node has hung up.
    pub fn broadcast_keep_alive(&mut self) -> bool {
        self.keep_alives += 1;
        let toggle_every = self.settings.bridge_toggle_every;
        if toggle_every > 0 && self.keep_alives % toggle_every == 0 {
            self.bridge_online = !self.bridge_online;
            info!(
                "Simulated bridge {}",
                if self.bridge_online { "online" } else { "offline" }
            );
        }

        let keep_alive = KeepAlive::from_gateway(self.bridge_online);
        self.send(Delivery::Broadcast, Payload::KeepAlive(keep_alive))
    }

    fn send(&mut self, delivery: Delivery, payload: Payload) -> bool {
        let bytes = match Envelope::new(DeviceType::Gateway, payload).encode() {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!("Gateway failed to encode a frame: {}", e);
                return true;
            }
        };
        self.frames
            .send(InboundFrame {
                sender: self.settings.gateway_address,
                delivery,
                bytes,
            })
            .is_ok()
    }

    fn random_command(&mut self) -> SetCommand {
        let rng = &mut self.rng;
        let mut command = SetCommand::default();

        if rng.gen_bool(0.3) {
            command.power = Some(if rng.gen_bool(0.8) { "ON" } else { "OFF" }.to_string());
        }
        if rng.gen_bool(0.5) {
            command.brightness = Some(rng.gen_range(0..=255));
        }
        if rng.gen_bool(0.3) {
            command.color_temperature = Some(rng.gen_range(153..=500));
        }
        if rng.gen_bool(0.3) {
            command.rgb = Some(if rng.gen_bool(0.4) {
                "255,255,255".to_string()
            } else {
                format!(
                    "{},{},{}",
                    rng.gen_range(0..=255u8),
                    rng.gen_range(0..=255u8),
                    rng.gen_range(0..=255u8)
                )
            });
        }
        command
    }
}
