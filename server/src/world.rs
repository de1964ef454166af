//! Minimal authoritative world used by the server binary.
//!
//! Each client's most recent update payload is its state; every broadcast
//! ships all of them as one [`WorldSnapshot`].

use crate::handler::SessionHandler;
use crate::network::ServerStats;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::{ClientId, Message};
use std::collections::HashMap;

/// Message type of world snapshots sent by this handler.
pub const WORLD_SNAPSHOT: u16 = 16;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub updates: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub tick: u32,
    pub clients: Vec<ClientSnapshot>,
}

impl WorldSnapshot {
    pub fn decode(payload: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(payload)
    }
}

#[derive(Debug, Default)]
struct ClientState {
    updates: u32,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct WorldState {
    pub tick: u32,
    clients: HashMap<ClientId, ClientState>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let mut clients: Vec<ClientSnapshot> = self
            .clients
            .iter()
            .map(|(id, state)| ClientSnapshot {
                id: *id,
                updates: state.updates,
                data: state.data.clone(),
            })
            .collect();
        clients.sort_by_key(|c| c.id);

        WorldSnapshot {
            tick: self.tick,
            clients,
        }
    }
}

impl SessionHandler for WorldState {
    fn on_connect(&mut self, id: ClientId) {
        self.clients.insert(id, ClientState::default());
        info!("Added client {} to the world", id);
    }

    fn on_client_update(&mut self, id: ClientId, payload: &[u8]) {
        if let Some(state) = self.clients.get_mut(&id) {
            state.updates = state.updates.wrapping_add(1);
            state.data.clear();
            state.data.extend_from_slice(payload);
        }
    }

    fn on_disconnect(&mut self, id: ClientId) {
        self.clients.remove(&id);
        info!("Removed client {} from the world", id);
    }

    fn on_stop(&mut self) {
        self.clients.clear();
        info!("World cleared after shutdown");
    }

    fn on_broadcast_due(&mut self) -> Option<Message> {
        self.tick = self.tick.wrapping_add(1);
        if self.clients.is_empty() {
            return None;
        }

        match bincode::serialize(&self.snapshot()) {
            Ok(payload) => Some(Message::new(WORLD_SNAPSHOT, payload)),
            Err(e) => {
                warn!("Failed to encode world snapshot: {}", e);
                None
            }
        }
    }

    fn on_tick(&mut self, stats: &ServerStats) {
        if stats.ticks % 600 == 0 && stats.connected > 0 {
            debug!(
                "Tick {}: {} clients, {} messages, {} broadcasts, {} timeouts",
                stats.ticks,
                stats.connected,
                stats.messages_processed,
                stats.broadcasts,
                stats.timeouts
            );
        }
    }
}
