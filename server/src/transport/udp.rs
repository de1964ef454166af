//! Non-blocking UDP transport.
//!
//! Peers are identified by their socket address and get a [`ClientId`] on their
//! first `Connect` frame. Reliable frames must be acknowledged by the receiver;
//! a peer that stays silent, or leaves a reliable frame unacknowledged, for
//! longer than the configured timeout is handed to the timeout callback.

use super::{Outbound, TimeoutCallback, Transport, TransportError, TransportResult};
use log::{debug, info, warn};
use shared::{
    decode_frame, encode_frame, ClientId, Frame, Message, MsgType, DEFAULT_PEER_TIMEOUT,
    MAX_DATAGRAM_SIZE,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// Transport-side bookkeeping for one remote peer.
#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    last_seen: Instant,
    next_reliable_id: u32,
    /// Reliable frames sent to the peer and not acknowledged yet.
    unacked: HashMap<u32, Instant>,
    /// Reliable ids already accepted from the peer.
    inbound: ReliableWindow,
}

impl Peer {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
            next_reliable_id: 0,
            unacked: HashMap::new(),
            inbound: ReliableWindow::default(),
        }
    }

    fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_seen) > timeout
            || self
                .unacked
                .values()
                .any(|sent_at| now.duration_since(*sent_at) > timeout)
    }
}

/// How an inbound reliable id relates to the ids already accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Fresh,
    Duplicate,
    /// Too far behind the newest id to tell. Left unacknowledged so the
    /// sender's unacked watchdog reports the failure.
    Stale,
}

/// Sliding record of accepted reliable ids: the newest id plus a bitmask of
/// the 64 ids before it. Ids wrap, so ordering uses serial arithmetic.
#[derive(Debug, Default, Clone, Copy)]
struct ReliableWindow {
    latest: Option<u32>,
    /// Bit `i` set means `latest - 1 - i` was accepted.
    mask: u64,
}

impl ReliableWindow {
    const SPAN: u32 = u64::BITS;

    fn is_newer(a: u32, b: u32) -> bool {
        a != b && a.wrapping_sub(b) < u32::MAX / 2
    }

    fn classify(&self, id: u32) -> Arrival {
        let Some(latest) = self.latest else {
            return Arrival::Fresh;
        };
        if id == latest {
            return Arrival::Duplicate;
        }
        if Self::is_newer(id, latest) {
            return Arrival::Fresh;
        }
        let back = latest.wrapping_sub(id);
        if back > Self::SPAN {
            Arrival::Stale
        } else if self.mask & (1 << (back - 1)) != 0 {
            Arrival::Duplicate
        } else {
            Arrival::Fresh
        }
    }

    fn mark(&mut self, id: u32) {
        let Some(latest) = self.latest else {
            self.latest = Some(id);
            return;
        };
        if Self::is_newer(id, latest) {
            let shift = id.wrapping_sub(latest);
            self.mask = self.mask.checked_shl(shift).unwrap_or(0);
            if shift <= Self::SPAN {
                self.mask |= 1 << (shift - 1);
            }
            self.latest = Some(id);
        } else {
            let back = latest.wrapping_sub(id);
            if (1..=Self::SPAN).contains(&back) {
                self.mask |= 1 << (back - 1);
            }
        }
    }
}

pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peers: HashMap<ClientId, Peer>,
    by_addr: HashMap<SocketAddr, ClientId>,
    next_client_id: ClientId,
    peer_timeout: Duration,
    buffer: Vec<u8>,
}

impl UdpTransport {
    pub fn new(peer_timeout: Duration) -> Self {
        Self {
            socket: None,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_client_id: 1,
            peer_timeout,
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Picks the next free id, skipping 0 and ids still held by live peers.
    fn allocate_id(&mut self) -> Option<ClientId> {
        if self.peers.len() >= usize::from(ClientId::MAX) {
            return None;
        }
        loop {
            let candidate = self.next_client_id;
            self.next_client_id = self.next_client_id.checked_add(1).unwrap_or(1);
            if candidate != 0 && !self.peers.contains_key(&candidate) {
                return Some(candidate);
            }
        }
    }

    fn write_frame(&self, frame: &Frame, addr: SocketAddr) -> TransportResult<()> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotBound)?;
        let data = encode_frame(frame).map_err(TransportError::Encode)?;
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge(data.len()));
        }
        socket.send_to(&data, addr)?;
        Ok(())
    }

    /// Handles one datagram. Returns a message when it should reach the
    /// session layer.
    fn accept_frame(
        &mut self,
        frame: Frame,
        addr: SocketAddr,
    ) -> TransportResult<Option<(Message, ClientId)>> {
        let known = self.by_addr.get(&addr).copied();

        let (message, reliable_id) = match frame {
            Frame::Ack { reliable_id } => {
                if let Some(peer) = known.and_then(|id| self.peers.get_mut(&id)) {
                    peer.last_seen = Instant::now();
                    peer.unacked.remove(&reliable_id);
                }
                return Ok(None);
            }
            data => match data.into_message() {
                Some(parts) => parts,
                None => return Ok(None),
            },
        };

        let id = match known {
            Some(id) => id,
            None if message.kind == MsgType::Connect => match self.allocate_id() {
                Some(id) => {
                    info!("Assigned client id {} to {}", id, addr);
                    self.peers.insert(id, Peer::new(addr));
                    self.by_addr.insert(addr, id);
                    id
                }
                None => {
                    warn!("No free client id for {}", addr);
                    return Ok(None);
                }
            },
            None => {
                debug!("Dropping {:?} from unknown address {}", message.kind, addr);
                return Ok(None);
            }
        };

        let Some(peer) = self.peers.get_mut(&id) else {
            return Ok(None);
        };
        peer.last_seen = Instant::now();

        if let Some(reliable_id) = reliable_id {
            match peer.inbound.classify(reliable_id) {
                Arrival::Stale => {
                    debug!("Dropping stale reliable frame {} from {}", reliable_id, id);
                    return Ok(None);
                }
                Arrival::Duplicate => {
                    self.write_frame(&Frame::Ack { reliable_id }, addr)?;
                    return Ok(None);
                }
                Arrival::Fresh => {
                    self.write_frame(&Frame::Ack { reliable_id }, addr)?;
                    if let Some(peer) = self.peers.get_mut(&id) {
                        peer.inbound.mark(reliable_id);
                    }
                }
            }
        }

        if message.kind == MsgType::Empty {
            return Ok(None);
        }

        Ok(Some((message, id)))
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_TIMEOUT)
    }
}

impl Outbound for UdpTransport {
    fn send(&mut self, message: &Message, to: ClientId) -> TransportResult<()> {
        let addr = self
            .peers
            .get(&to)
            .map(|peer| peer.addr)
            .ok_or(TransportError::UnknownPeer(to))?;
        self.write_frame(&Frame::data(message, None), addr)
    }

    fn send_reliable(&mut self, message: &Message, to: ClientId) -> TransportResult<()> {
        let peer = self
            .peers
            .get_mut(&to)
            .ok_or(TransportError::UnknownPeer(to))?;
        let reliable_id = peer.next_reliable_id;
        peer.next_reliable_id = peer.next_reliable_id.wrapping_add(1);
        peer.unacked.insert(reliable_id, Instant::now());
        let addr = peer.addr;

        self.write_frame(&Frame::data(message, Some(reliable_id)), addr)
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, port: u16) -> bool {
        self.unbind();

        let socket = match UdpSocket::bind(("0.0.0.0", port)) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Failed to bind UDP port {}: {}", port, e);
                return false;
            }
        };
        if let Err(e) = socket.set_nonblocking(true) {
            warn!("Failed to make UDP socket non-blocking: {}", e);
            return false;
        }

        self.socket = Some(socket);
        true
    }

    fn unbind(&mut self) {
        if self.socket.take().is_some() {
            debug!("UDP socket closed, dropping {} peers", self.peers.len());
        }
        self.peers.clear();
        self.by_addr.clear();
    }

    fn receive(&mut self) -> TransportResult<Option<(Message, ClientId)>> {
        loop {
            let socket = self.socket.as_ref().ok_or(TransportError::NotBound)?;
            let (len, addr) = match socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(TransportError::Io(e)),
            };

            let frame = match decode_frame(&self.buffer[..len]) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to decode datagram from {}: {}", addr, e);
                    continue;
                }
            };

            if let Some(received) = self.accept_frame(frame, addr)? {
                return Ok(Some(received));
            }
        }
    }

    fn remove_connection(&mut self, id: ClientId) {
        if let Some(peer) = self.peers.remove(&id) {
            self.by_addr.remove(&peer.addr);
        }
    }

    fn update(&mut self, on_timeout: &mut TimeoutCallback<'_>) {
        let now = Instant::now();
        let expired: Vec<ClientId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(now, self.peer_timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.remove_connection(id);
            if !on_timeout(&mut *self, id) {
                warn!("Timeout cleanup for client {} did not complete", id);
            }
        }
    }
}
