//! Transport contract consumed by the session layer.
//!
//! The session layer never touches a socket directly. Everything goes through
//! a [`Transport`]: a non-blocking datagram channel that assigns client ids,
//! offers best-effort and reliable sends, and runs a per-peer timeout
//! watchdog from inside [`Transport::update`].

pub mod loopback;
pub mod udp;

pub use loopback::LoopbackTransport;
pub use udp::UdpTransport;

use shared::{ClientId, Message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode frame: {0}")]
    Decode(bincode::Error),
    #[error("transport is not bound")]
    NotBound,
    #[error("no connection for client {0}")]
    UnknownPeer(ClientId),
    #[error("datagram of {0} bytes exceeds the maximum size")]
    DatagramTooLarge(usize),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound half of a transport.
///
/// Split from [`Transport`] so the timeout callback can send notifications
/// while the transport is in the middle of its own `update`.
pub trait Outbound {
    /// Best-effort send.
    fn send(&mut self, message: &Message, to: ClientId) -> TransportResult<()>;

    /// Delivered eventually, or the peer is reported through the timeout
    /// callback.
    fn send_reliable(&mut self, message: &Message, to: ClientId) -> TransportResult<()>;
}

/// Callback the transport invokes for every peer it considers dead.
///
/// Returns `true` once the session layer has finished its cleanup.
pub type TimeoutCallback<'a> = dyn FnMut(&mut dyn Outbound, ClientId) -> bool + 'a;

pub trait Transport: Outbound {
    fn bind(&mut self, port: u16) -> bool;

    fn unbind(&mut self);

    /// Pops the next inbound message, `Ok(None)` when nothing is pending.
    fn receive(&mut self) -> TransportResult<Option<(Message, ClientId)>>;

    /// Drops all per-peer bookkeeping for `id`.
    fn remove_connection(&mut self, id: ClientId);

    /// Advances internal clocks. May call `on_timeout` zero or more times,
    /// synchronously, before returning.
    fn update(&mut self, on_timeout: &mut TimeoutCallback<'_>);
}
