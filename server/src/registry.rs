//! Session registry: the set of clients the server considers connected.
//!
//! Membership is the whole session record at this layer. Per-client game
//! state belongs to the application handler, keyed by the same [`ClientId`].

use shared::ClientId;
use std::collections::HashSet;

/// Authoritative set of connected client ids.
///
/// Owned by a single server instance and only mutated from within its tick,
/// so no synchronisation is needed. Iteration order is unspecified.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    clients: HashSet<ClientId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client. Returns false if it was already present.
    pub fn insert(&mut self, id: ClientId) -> bool {
        self.clients.insert(id)
    }

    /// Removes a client. Removing an absent id is a no-op that returns false.
    pub fn remove(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains(&id)
    }

    /// Visits every registered client, used for fan-out sends.
    pub fn for_each(&self, mut f: impl FnMut(ClientId)) {
        for id in &self.clients {
            f(*id);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.iter().copied()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
