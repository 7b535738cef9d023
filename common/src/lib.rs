//! Wire protocol shared by light nodes and their gateway.

pub mod address;
pub mod envelope;
pub mod payload;

pub use address::{AddressParseError, PeerAddress};
pub use envelope::{
    DeviceType, Envelope, EnvelopeError, Payload, PayloadKind, ENVELOPE_LEN, HEADER_LEN,
    MAX_DOCUMENT_LEN, PAYLOAD_CAPACITY,
};
pub use payload::{
    Attributes, ConfigAnnouncement, KeepAlive, SetCommand, StateReport, SwitchState,
    LIGHT_COMPONENT, PAYLOAD_OFF, PAYLOAD_ON,
};

/// Version tag of this protocol library, reported by nodes in their attributes.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
