//! Everything between the node and the radio.

use common::{PeerAddress, ENVELOPE_LEN};

mod delivery;
mod presence;

pub use delivery::*;
pub use presence::*;

/// Id the transport hands out per unicast send; echoed by its acknowledgment.
pub type SequenceId = u16;

/// Send side of the mesh radio.
pub trait MeshTransport {
    fn local_address(&self) -> PeerAddress;

    /// Queues a frame for `destination` and returns without waiting. The result
    /// arrives later as an [`AckEvent`] carrying the returned id.
    fn send_unicast(&mut self, frame: &[u8; ENVELOPE_LEN], destination: PeerAddress) -> SequenceId;

    /// Housekeeping slot, called once per loop iteration.
    fn maintenance(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Broadcast,
    Unicast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFrame {
    pub sender: PeerAddress,
    pub delivery: Delivery,
    pub bytes: Vec<u8>,
}

/// Outcome of one unicast send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckEvent {
    pub destination: PeerAddress,
    pub sequence_id: SequenceId,
    pub success: bool,
}
