//! In-memory transport.
//!
//! Keeps the server in the same process as whatever feeds it messages, without
//! touching the network stack. The handle is cheap to clone; every clone sees
//! the same queues, so a test can keep one while the server owns another.

use super::{Outbound, TimeoutCallback, Transport, TransportError, TransportResult};
use log::debug;
use shared::{ClientId, Message};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Delivery path chosen for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    BestEffort,
    Reliable,
}

/// A message the server handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: ClientId,
    pub message: Message,
    pub delivery: Delivery,
}

#[derive(Debug, Default)]
struct LoopbackState {
    bound_port: Option<u16>,
    fail_bind: bool,
    calls: usize,
    inbox: VecDeque<(Message, ClientId)>,
    sent: Vec<SentMessage>,
    removed: Vec<ClientId>,
    pending_timeouts: Vec<ClientId>,
    timeout_results: Vec<(ClientId, bool)>,
    receive_error: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LoopbackState) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Queues a message as if `from` had sent it.
    pub fn push_inbound(&self, message: Message, from: ClientId) {
        self.with_state(|s| s.inbox.push_back((message, from)));
    }

    /// Reports `id` as timed out on the next `update`.
    pub fn expire(&self, id: ClientId) {
        self.with_state(|s| s.pending_timeouts.push(id));
    }

    /// Makes every following `bind` fail until [`Self::allow_bind`] is called.
    pub fn fail_bind(&self) {
        self.with_state(|s| s.fail_bind = true);
    }

    pub fn allow_bind(&self) {
        self.with_state(|s| s.fail_bind = false);
    }

    /// Makes the next `receive` return an error.
    pub fn fail_next_receive(&self) {
        self.with_state(|s| s.receive_error = true);
    }

    pub fn is_bound(&self) -> bool {
        self.with_state(|s| s.bound_port.is_some())
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.with_state(|s| s.bound_port)
    }

    /// Number of contract calls made on this transport so far.
    pub fn call_count(&self) -> usize {
        self.with_state(|s| s.calls)
    }

    pub fn pending_inbound(&self) -> usize {
        self.with_state(|s| s.inbox.len())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.with_state(|s| s.sent.clone())
    }

    pub fn take_sent(&self) -> Vec<SentMessage> {
        self.with_state(|s| std::mem::take(&mut s.sent))
    }

    pub fn sent_to(&self, id: ClientId) -> Vec<SentMessage> {
        self.with_state(|s| s.sent.iter().filter(|m| m.to == id).cloned().collect())
    }

    pub fn removed_connections(&self) -> Vec<ClientId> {
        self.with_state(|s| s.removed.clone())
    }

    /// What the timeout callback answered, per expired peer.
    pub fn timeout_results(&self) -> Vec<(ClientId, bool)> {
        self.with_state(|s| s.timeout_results.clone())
    }

    fn record_send(&mut self, message: &Message, to: ClientId, delivery: Delivery) -> TransportResult<()> {
        self.with_state(|s| {
            s.calls += 1;
            if s.bound_port.is_none() {
                return Err(TransportError::NotBound);
            }
            s.sent.push(SentMessage {
                to,
                message: message.clone(),
                delivery,
            });
            Ok(())
        })
    }
}

impl Outbound for LoopbackTransport {
    fn send(&mut self, message: &Message, to: ClientId) -> TransportResult<()> {
        self.record_send(message, to, Delivery::BestEffort)
    }

    fn send_reliable(&mut self, message: &Message, to: ClientId) -> TransportResult<()> {
        self.record_send(message, to, Delivery::Reliable)
    }
}

impl Transport for LoopbackTransport {
    fn bind(&mut self, port: u16) -> bool {
        self.with_state(|s| {
            s.calls += 1;
            if s.fail_bind {
                return false;
            }
            s.bound_port = Some(port);
            true
        })
    }

    fn unbind(&mut self) {
        self.with_state(|s| {
            s.calls += 1;
            s.bound_port = None;
        });
    }

    fn receive(&mut self) -> TransportResult<Option<(Message, ClientId)>> {
        self.with_state(|s| {
            s.calls += 1;
            if s.bound_port.is_none() {
                return Err(TransportError::NotBound);
            }
            if std::mem::take(&mut s.receive_error) {
                return Err(TransportError::Io(std::io::Error::other(
                    "injected receive failure",
                )));
            }
            Ok(s.inbox.pop_front())
        })
    }

    fn remove_connection(&mut self, id: ClientId) {
        self.with_state(|s| {
            s.calls += 1;
            s.removed.push(id);
        });
    }

    fn update(&mut self, on_timeout: &mut TimeoutCallback<'_>) {
        // The lock must be released before the callback sends through us.
        let expired = self.with_state(|s| {
            s.calls += 1;
            std::mem::take(&mut s.pending_timeouts)
        });

        for id in expired {
            debug!("Loopback peer {} expired", id);
            let done = on_timeout(&mut *self, id);
            self.with_state(|s| s.timeout_results.push((id, done)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_bind() {
        let mut transport = LoopbackTransport::new();
        assert!(matches!(
            transport.send(&Message::connect(), 1),
            Err(TransportError::NotBound)
        ));

        assert!(transport.bind(9000));
        assert!(transport.send(&Message::connect(), 1).is_ok());
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].delivery, Delivery::BestEffort);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = LoopbackTransport::new();
        let mut owned = handle.clone();

        owned.bind(1);
        handle.push_inbound(Message::connect(), 4);

        let (message, from) = owned.receive().unwrap().unwrap();
        assert_eq!(message, Message::connect());
        assert_eq!(from, 4);
        assert!(owned.receive().unwrap().is_none());
        assert_eq!(handle.bound_port(), Some(1));
    }

    #[test]
    fn test_failed_bind_stays_unbound() {
        let mut transport = LoopbackTransport::new();
        transport.fail_bind();
        assert!(!transport.bind(1));
        assert!(!transport.is_bound());

        transport.allow_bind();
        assert!(transport.bind(1));
    }

    #[test]
    fn test_update_invokes_callback_per_expired_peer() {
        let mut transport = LoopbackTransport::new();
        transport.bind(1);
        transport.expire(3);
        transport.expire(8);

        let mut seen = Vec::new();
        transport.update(&mut |out: &mut dyn Outbound, id: ClientId| {
            seen.push(id);
            out.send_reliable(&Message::disconnect(id), 1).is_ok()
        });

        assert_eq!(seen, vec![3, 8]);
        assert_eq!(transport.timeout_results(), vec![(3, true), (8, true)]);
        assert_eq!(transport.sent().len(), 2);
        assert!(transport.sent().iter().all(|m| m.delivery == Delivery::Reliable));

        // Expirations are reported once.
        transport.update(&mut |_: &mut dyn Outbound, _id: ClientId| -> bool {
            panic!("no peer should expire")
        });
    }

    #[test]
    fn test_injected_receive_error_is_one_shot() {
        let mut transport = LoopbackTransport::new();
        transport.bind(1);
        transport.fail_next_receive();
        assert!(transport.receive().is_err());
        assert!(transport.receive().unwrap().is_none());
    }
}
