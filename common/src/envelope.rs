//! Fixed-size frame exchanged over the mesh.
//!
//! ```text
//! | byte 0      | byte 1       | bytes 2..202                       |
//! | device type | payload kind | JSON document, NUL padded          |
//! ```

use packed_struct::prelude::*;
use packed_struct::PackingError;
use thiserror::Error;

use crate::payload::{
    Attributes, ConfigAnnouncement, KeepAlive, SetCommand, StateReport,
};

pub const HEADER_LEN: usize = 2;
pub const PAYLOAD_CAPACITY: usize = 200;
pub const ENVELOPE_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;
/// Leaves room for the terminating NUL C peers expect.
pub const MAX_DOCUMENT_LEN: usize = PAYLOAD_CAPACITY - 1;

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Unspecified = 0,
    Switch = 1,
    Led = 2,
    Sensor = 3,
    RfGateway = 4,
    Gateway = 5,
}

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Attributes = 0,
    KeepAlive = 1,
    Set = 2,
    State = 3,
    Update = 4,
    Restart = 5,
    Config = 6,
}

#[derive(PackedStruct, Clone, Copy, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0")]
pub struct Header {
    #[packed_field(bytes = "0", ty = "enum")]
    pub device_type: DeviceType,
    #[packed_field(bytes = "1", ty = "enum")]
    pub payload_kind: PayloadKind,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is {0} bytes, expected {}", ENVELOPE_LEN)]
    WrongLength(usize),
    #[error("invalid envelope header: {0}")]
    Header(PackingError),
    #[error("payload document is {len} bytes, at most {max} fit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("payload document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload document is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Structured body of an envelope; the variant decides the payload kind tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Attributes(Attributes),
    KeepAlive(KeepAlive),
    Set(SetCommand),
    State(StateReport),
    Update,
    Restart,
    Config(ConfigAnnouncement),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Attributes(_) => PayloadKind::Attributes,
            Payload::KeepAlive(_) => PayloadKind::KeepAlive,
            Payload::Set(_) => PayloadKind::Set,
            Payload::State(_) => PayloadKind::State,
            Payload::Update => PayloadKind::Update,
            Payload::Restart => PayloadKind::Restart,
            Payload::Config(_) => PayloadKind::Config,
        }
    }

    fn to_document(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Payload::Attributes(attributes) => serde_json::to_vec(attributes),
            Payload::KeepAlive(keep_alive) => keep_alive.to_document(),
            Payload::Set(command) => serde_json::to_vec(command),
            Payload::State(report) => serde_json::to_vec(report),
            Payload::Update | Payload::Restart => Ok(Vec::new()),
            Payload::Config(config) => serde_json::to_vec(config),
        }
    }

    fn from_document(kind: PayloadKind, document: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            PayloadKind::Attributes => Payload::Attributes(serde_json::from_str(document)?),
            PayloadKind::KeepAlive => Payload::KeepAlive(KeepAlive::from_document(document)?),
            PayloadKind::Set => Payload::Set(serde_json::from_str(document)?),
            PayloadKind::State => Payload::State(serde_json::from_str(document)?),
            PayloadKind::Update => Payload::Update,
            PayloadKind::Restart => Payload::Restart,
            PayloadKind::Config => Payload::Config(serde_json::from_str(document)?),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub device_type: DeviceType,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(device_type: DeviceType, payload: Payload) -> Self {
        Envelope {
            device_type,
            payload,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    pub fn header(&self) -> Header {
        Header {
            device_type: self.device_type,
            payload_kind: self.kind(),
        }
    }

    /// Serializes into the fixed wire layout. Oversized documents are rejected,
    /// never truncated.
    pub fn encode(&self) -> Result<[u8; ENVELOPE_LEN], EnvelopeError> {
        let header = self.header().pack().map_err(EnvelopeError::Header)?;
        let document = self.payload.to_document()?;
        if document.len() > MAX_DOCUMENT_LEN {
            return Err(EnvelopeError::PayloadTooLarge {
                len: document.len(),
                max: MAX_DOCUMENT_LEN,
            });
        }

        let mut frame = [0u8; ENVELOPE_LEN];
        frame[..HEADER_LEN].copy_from_slice(&header);
        frame[HEADER_LEN..HEADER_LEN + document.len()].copy_from_slice(&document);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, EnvelopeError> {
        if frame.len() != ENVELOPE_LEN {
            return Err(EnvelopeError::WrongLength(frame.len()));
        }

        let header = Header::unpack(&[frame[0], frame[1]]).map_err(EnvelopeError::Header)?;

        let body = &frame[HEADER_LEN..];
        let end = body.iter().position(|byte| *byte == 0).unwrap_or(body.len());
        let document = std::str::from_utf8(&body[..end])?;

        Ok(Envelope {
            device_type: header.device_type,
            payload: Payload::from_document(header.payload_kind, document)?,
        })
    }
}
