//! Wire vocabulary shared by the session server and its clients.
//!
//! Every datagram on the wire is a bincode encoded [`Frame`]. Application data
//! travels inside `Frame::Data` as a [`MsgType`] discriminant plus an opaque
//! payload; the session layer only interprets the reserved discriminants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier the transport assigns to a connected peer.
pub type ClientId = u16;

/// Rate (Hz) at which the server broadcasts world snapshots.
pub const NETWORK_WORLD_UPDATE_RATE: f64 = 20.0;
pub const DEFAULT_PORT: u16 = 54000;
/// Silence after which the transport reports a peer as timed out.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Message discriminant.
///
/// Values `0..=3` are reserved by the session layer. Anything else is an
/// application defined type and is passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Sentinel meaning "no message"; never dispatched.
    Empty,
    Connect,
    ClientUpdate,
    Disconnect,
    Custom(u16),
}

impl MsgType {
    pub const fn as_u16(self) -> u16 {
        match self {
            MsgType::Empty => 0,
            MsgType::Connect => 1,
            MsgType::ClientUpdate => 2,
            MsgType::Disconnect => 3,
            MsgType::Custom(value) => value,
        }
    }

    pub fn is_reserved(self) -> bool {
        !matches!(self, MsgType::Custom(_))
    }
}

impl From<u16> for MsgType {
    fn from(value: u16) -> Self {
        match value {
            0 => MsgType::Empty,
            1 => MsgType::Connect,
            2 => MsgType::ClientUpdate,
            3 => MsgType::Disconnect,
            other => MsgType::Custom(other),
        }
    }
}

impl From<MsgType> for u16 {
    fn from(kind: MsgType) -> Self {
        kind.as_u16()
    }
}

/// A tagged unit of data exchanged between server and clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MsgType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: impl Into<MsgType>, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn connect() -> Self {
        Self::new(MsgType::Connect, Vec::new())
    }

    pub fn client_update(payload: Vec<u8>) -> Self {
        Self::new(MsgType::ClientUpdate, payload)
    }

    /// Disconnect notification carrying the id of the departing client.
    ///
    /// The id is written little-endian, which matches bincode's encoding of
    /// a `u16`, so clients may decode it either way.
    pub fn disconnect(id: ClientId) -> Self {
        Self::new(MsgType::Disconnect, id.to_le_bytes().to_vec())
    }

    /// Reads the departing client id out of a disconnect notification.
    pub fn disconnected_id(&self) -> Option<ClientId> {
        if self.kind != MsgType::Disconnect {
            return None;
        }
        let bytes: [u8; 2] = self.payload.get(..2)?.try_into().ok()?;
        Some(ClientId::from_le_bytes(bytes))
    }
}

/// Datagram envelope used by the UDP transport.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        kind: u16,
        /// Present when the sender expects an acknowledgement.
        reliable_id: Option<u32>,
        payload: Vec<u8>,
    },
    Ack {
        reliable_id: u32,
    },
}

impl Frame {
    pub fn data(message: &Message, reliable_id: Option<u32>) -> Self {
        Frame::Data {
            kind: message.kind.as_u16(),
            reliable_id,
            payload: message.payload.clone(),
        }
    }

    /// Splits a data frame into its message; acknowledgements yield `None`.
    pub fn into_message(self) -> Option<(Message, Option<u32>)> {
        match self {
            Frame::Data {
                kind,
                reliable_id,
                payload,
            } => Some((Message::new(kind, payload), reliable_id)),
            Frame::Ack { .. } => None,
        }
    }
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(frame)
}

pub fn decode_frame(bytes: &[u8]) -> Result<Frame, bincode::Error> {
    bincode::deserialize(bytes)
}
