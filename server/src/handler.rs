//! Application hooks invoked by the session layer.

use crate::network::ServerStats;
use log::debug;
use shared::{ClientId, Message};

/// Game-specific reactions to session events.
///
/// Every method runs synchronously inside [`crate::network::Server::tick`]
/// (or `stop`), on the thread driving the server.
pub trait SessionHandler {
    fn on_connect(&mut self, id: ClientId);

    /// Hot path; `payload` borrows the received buffer.
    fn on_client_update(&mut self, id: ClientId, payload: &[u8]);

    fn on_disconnect(&mut self, id: ClientId);

    /// Any message whose discriminant the session layer does not reserve.
    fn on_custom_message(&mut self, kind: u16, payload: &[u8], id: ClientId) {
        debug!(
            "Unhandled message type {} ({} bytes) from client {}",
            kind,
            payload.len(),
            id
        );
    }

    fn on_stop(&mut self) {}

    /// Produces the world snapshot sent to every registered client.
    /// `None` skips this broadcast.
    fn on_broadcast_due(&mut self) -> Option<Message>;

    /// Called once at the end of every running tick.
    fn on_tick(&mut self, _stats: &ServerStats) {}
}

/// Everything a [`RecordingHandler`] was told, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    Connect(ClientId),
    ClientUpdate(ClientId, Vec<u8>),
    Disconnect(ClientId),
    Custom(u16, Vec<u8>, ClientId),
    Stop,
    BroadcastDue,
    Tick,
}

/// Handler that records every call; broadcasts a fixed snapshot.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub events: Vec<HandlerEvent>,
    pub snapshot: Option<Message>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Message) -> Self {
        Self {
            events: Vec::new(),
            snapshot: Some(snapshot),
        }
    }

    pub fn count(&self, predicate: impl Fn(&HandlerEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    /// Events other than `Tick` and `BroadcastDue`.
    pub fn session_events(&self) -> Vec<HandlerEvent> {
        self.events
            .iter()
            .filter(|e| !matches!(e, HandlerEvent::Tick | HandlerEvent::BroadcastDue))
            .cloned()
            .collect()
    }
}

impl SessionHandler for RecordingHandler {
    fn on_connect(&mut self, id: ClientId) {
        self.events.push(HandlerEvent::Connect(id));
    }

    fn on_client_update(&mut self, id: ClientId, payload: &[u8]) {
        self.events
            .push(HandlerEvent::ClientUpdate(id, payload.to_vec()));
    }

    fn on_disconnect(&mut self, id: ClientId) {
        self.events.push(HandlerEvent::Disconnect(id));
    }

    fn on_custom_message(&mut self, kind: u16, payload: &[u8], id: ClientId) {
        self.events
            .push(HandlerEvent::Custom(kind, payload.to_vec(), id));
    }

    fn on_stop(&mut self) {
        self.events.push(HandlerEvent::Stop);
    }

    fn on_broadcast_due(&mut self) -> Option<Message> {
        self.events.push(HandlerEvent::BroadcastDue);
        self.snapshot.clone()
    }

    fn on_tick(&mut self, _stats: &ServerStats) {
        self.events.push(HandlerEvent::Tick);
    }
}
