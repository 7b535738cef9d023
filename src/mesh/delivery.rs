use std::collections::HashMap;

use common::{Envelope, EnvelopeError, PeerAddress, ENVELOPE_LEN};
use log::{debug, info, warn};

use super::{MeshTransport, SequenceId};

/// A reliable send that has not been positively acknowledged yet.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub sequence_id: SequenceId,
    pub envelope: Envelope,
    pub destination: PeerAddress,
    frame: [u8; ENVELOPE_LEN],
}

/// At-least-once unicast on top of a fire-and-forget transport.
///
/// Each negative acknowledgment resends the same frame right away and the entry
/// moves to the new sequence id. There is no retry limit and no timer; entries
/// leave only through a positive acknowledgment or [`DeliveryManager::flush`].
pub struct DeliveryManager<T> {
    transport: T,
    pending: HashMap<SequenceId, OutboundMessage>,
    resends: u64,
}

impl<T: MeshTransport> DeliveryManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending: HashMap::new(),
            resends: 0,
        }
    }

    pub fn submit(
        &mut self,
        envelope: Envelope,
        destination: PeerAddress,
    ) -> Result<SequenceId, EnvelopeError> {
        let frame = envelope.encode()?;
        let sequence_id = self.transport.send_unicast(&frame, destination);
        debug!(
            "Sent {:?} to {} as #{}",
            envelope.kind(),
            destination,
            sequence_id
        );

        self.track(OutboundMessage {
            sequence_id,
            envelope,
            destination,
            frame,
        });
        Ok(sequence_id)
    }

    pub fn on_acknowledge(&mut self, sequence_id: SequenceId, success: bool) {
        let Some(mut message) = self.pending.remove(&sequence_id) else {
            // Already flushed, or superseded by a resend
            debug!("Acknowledgment for unknown #{} ignored", sequence_id);
            return;
        };

        if success {
            debug!(
                "{:?} #{} delivered to {}",
                message.envelope.kind(),
                sequence_id,
                message.destination
            );
            return;
        }

        let resent_as = self
            .transport
            .send_unicast(&message.frame, message.destination);
        self.resends += 1;
        info!(
            "{:?} to {} failed as #{}, resent as #{}",
            message.envelope.kind(),
            message.destination,
            sequence_id,
            resent_as
        );

        message.sequence_id = resent_as;
        self.track(message);
    }

    /// Drops every pending message, returns how many there were.
    pub fn flush(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn pending(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.pending.values()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, sequence_id: SequenceId) -> bool {
        self.pending.contains_key(&sequence_id)
    }

    /// Total resends since creation.
    pub fn resends(&self) -> u64 {
        self.resends
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn track(&mut self, message: OutboundMessage) {
        let sequence_id = message.sequence_id;
        if let Some(replaced) = self.pending.insert(sequence_id, message) {
            warn!(
                "Sequence id #{} reused while {:?} to {} was pending, dropping it",
                sequence_id,
                replaced.envelope.kind(),
                replaced.destination
            );
        }
    }
}
