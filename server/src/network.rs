//! Server lifecycle: start, per-frame tick, and teardown.

use crate::dispatcher::dispatch_one;
use crate::handler::SessionHandler;
use crate::registry::SessionRegistry;
use crate::scheduler::BroadcastScheduler;
use crate::timeout::handle_timeout;
use crate::transport::{Outbound, Transport};
use log::{debug, info, warn};
use shared::{ClientId, Message, MsgType, NETWORK_WORLD_UPDATE_RATE};
use std::time::Instant;

/// Running totals, refreshed at the end of every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub ticks: u64,
    pub messages_processed: u64,
    /// Snapshots actually fanned out. A due broadcast the handler declines
    /// is not counted.
    pub broadcasts: u64,
    pub client_disconnects: u64,
    pub timeouts: u64,
    /// Registered clients after the last tick.
    pub connected: usize,
}

/// Session server driven by [`Server::tick`].
///
/// Single-threaded and poll-driven: the host calls `tick` once per frame and
/// every handler callback runs inside that call. Nothing happens while the
/// server is stopped.
pub struct Server<T: Transport, H: SessionHandler> {
    transport: T,
    handler: H,
    registry: SessionRegistry,
    scheduler: BroadcastScheduler,
    stats: ServerStats,
    working: bool,
}

impl<T: Transport, H: SessionHandler> Server<T, H> {
    pub fn new(transport: T, handler: H) -> Self {
        Self::with_broadcast_rate(transport, handler, NETWORK_WORLD_UPDATE_RATE)
    }

    pub fn with_broadcast_rate(transport: T, handler: H, broadcast_rate: f64) -> Self {
        Self {
            transport,
            handler,
            registry: SessionRegistry::new(),
            scheduler: BroadcastScheduler::new(broadcast_rate),
            stats: ServerStats::default(),
            working: false,
        }
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Binds the transport to `port`. Failure leaves the server stopped and
    /// can be retried.
    pub fn start(&mut self, port: u16) -> bool {
        if self.working {
            debug!("Server already running, ignoring start on port {}", port);
            return true;
        }

        self.working = self.transport.bind(port);
        if self.working {
            self.scheduler.reset();
            info!("Server successfully started on port {}", port);
        } else {
            warn!("Failed to start the server on port {}", port);
        }

        self.working
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// One frame: drain inbound messages, maybe broadcast, then let the
    /// transport run its own maintenance (which may evict timed-out peers).
    pub fn tick_at(&mut self, now: Instant) {
        if !self.working {
            return;
        }

        while self.process() {}

        if self.scheduler.poll(now) {
            self.broadcast();
        }

        let Self {
            transport,
            registry,
            handler,
            stats,
            ..
        } = self;
        transport.update(&mut |out: &mut dyn Outbound, id: ClientId| {
            stats.timeouts += 1;
            handle_timeout(out, &mut *registry, &mut *handler, id)
        });

        self.stats.ticks += 1;
        self.stats.connected = self.registry.len();
        self.handler.on_tick(&self.stats);
    }

    /// Disconnects everyone, releases the transport and stops processing.
    pub fn stop(&mut self) {
        if !self.working {
            debug!("Server is not running, nothing to stop");
            return;
        }

        let Self {
            transport,
            registry,
            ..
        } = self;
        registry.for_each(|id| {
            if let Err(e) = transport.send(&Message::disconnect(id), id) {
                debug!("Could not send disconnect to client {}: {}", id, e);
            }
        });
        self.registry.clear();

        self.transport.unbind();
        self.working = false;

        self.handler.on_stop();

        info!("Server stopped, all clients were disconnected");
    }

    /// Receives and handles one message. Returns false once the transport
    /// has nothing more for this tick.
    fn process(&mut self) -> bool {
        match dispatch_one(&mut self.transport, &mut self.registry, &mut self.handler) {
            Some(kind) => {
                self.stats.messages_processed += 1;
                if kind == MsgType::Disconnect {
                    self.stats.client_disconnects += 1;
                }
                true
            }
            None => false,
        }
    }

    fn broadcast(&mut self) {
        let Some(snapshot) = self.handler.on_broadcast_due() else {
            return;
        };
        self.stats.broadcasts += 1;

        let Self {
            transport,
            registry,
            ..
        } = self;
        registry.for_each(|id| {
            if let Err(e) = transport.send(&snapshot, id) {
                warn!("Failed to send world snapshot to client {}: {}", id, e);
            }
        });
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport, H: SessionHandler> Drop for Server<T, H> {
    fn drop(&mut self) {
        if self.working {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerEvent, RecordingHandler};
    use crate::transport::loopback::{Delivery, LoopbackTransport};
    use std::time::Duration;

    const PORT: u16 = 4000;

    fn snapshot() -> Message {
        Message::new(200u16, b"world".to_vec())
    }

    fn test_server() -> (Server<LoopbackTransport, RecordingHandler>, LoopbackTransport) {
        let transport = LoopbackTransport::new();
        let server = Server::with_broadcast_rate(
            transport.clone(),
            RecordingHandler::with_snapshot(snapshot()),
            20.0,
        );
        (server, transport)
    }

    fn running_server(
        clients: &[ClientId],
    ) -> (Server<LoopbackTransport, RecordingHandler>, LoopbackTransport) {
        let (mut server, transport) = test_server();
        assert!(server.start(PORT));
        for id in clients {
            transport.push_inbound(Message::connect(), *id);
        }
        server.tick();
        transport.take_sent();
        server.handler_mut().events.clear();
        (server, transport)
    }

    #[test]
    fn test_start_binds_transport() {
        let (mut server, transport) = test_server();
        assert!(!server.is_working());
        assert!(server.start(PORT));
        assert!(server.is_working());
        assert_eq!(transport.bound_port(), Some(PORT));
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let (mut server, transport) = test_server();
        transport.fail_bind();
        assert!(!server.start(PORT));
        assert!(!server.is_working());

        transport.allow_bind();
        assert!(server.start(PORT));
        assert!(server.is_working());
    }

    #[test]
    fn test_tick_while_stopped_does_nothing() {
        let (mut server, transport) = test_server();
        transport.push_inbound(Message::connect(), 1);
        let calls = transport.call_count();

        server.tick();
        server.tick();

        assert_eq!(transport.call_count(), calls);
        assert!(server.handler().events.is_empty());
        assert!(server.registry().is_empty());
        assert_eq!(transport.pending_inbound(), 1);
        assert_eq!(server.stats().ticks, 0);
    }

    #[test]
    fn test_tick_drains_all_pending_messages() {
        let (mut server, transport) = test_server();
        server.start(PORT);
        for id in 1..=5 {
            transport.push_inbound(Message::connect(), id);
        }
        transport.push_inbound(Message::client_update(vec![1]), 3);

        server.tick();

        assert_eq!(transport.pending_inbound(), 0);
        assert_eq!(server.registry().len(), 5);
        assert_eq!(server.stats().messages_processed, 6);
        assert_eq!(server.stats().connected, 5);
    }

    #[test]
    fn test_tick_order() {
        let (mut server, transport) = test_server();
        server.start(PORT);
        transport.push_inbound(Message::connect(), 1);
        transport.expire(1);

        server.tick();

        assert_eq!(
            server.handler().events,
            vec![
                HandlerEvent::Connect(1),
                HandlerEvent::BroadcastDue,
                HandlerEvent::Disconnect(1),
                HandlerEvent::Tick,
            ]
        );
    }

    #[test]
    fn test_broadcast_reaches_every_client_best_effort() {
        let (mut server, transport) = running_server(&[1, 2]);

        // Past the first broadcast's interval.
        server.tick_at(Instant::now() + Duration::from_secs(1));

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.message == snapshot()));
        assert!(sent.iter().all(|m| m.delivery == Delivery::BestEffort));
        assert_eq!(server.stats().broadcasts, 2);
    }

    #[test]
    fn test_declined_broadcast_is_not_counted() {
        let transport = LoopbackTransport::new();
        let mut server =
            Server::with_broadcast_rate(transport.clone(), RecordingHandler::new(), 20.0);
        server.start(PORT);
        transport.push_inbound(Message::connect(), 1);
        let start = Instant::now();

        server.tick_at(start);
        server.tick_at(start + Duration::from_millis(50));

        assert_eq!(server.handler().count(|e| *e == HandlerEvent::BroadcastDue), 2);
        assert_eq!(server.stats().broadcasts, 0);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_broadcast_gated_by_rate() {
        let (mut server, _transport) = test_server();
        server.start(PORT);
        let start = Instant::now();

        server.tick_at(start);
        server.tick_at(start + Duration::from_millis(10));
        server.tick_at(start + Duration::from_millis(49));
        assert_eq!(server.stats().broadcasts, 1);

        server.tick_at(start + Duration::from_millis(50));
        assert_eq!(server.stats().broadcasts, 2);

        // A long stall still yields a single broadcast.
        server.tick_at(start + Duration::from_secs(5));
        assert_eq!(server.stats().broadcasts, 3);
    }

    #[test]
    fn test_timeout_eviction_through_update() {
        let (mut server, transport) = running_server(&[1, 2, 3]);
        transport.expire(2);

        server.tick();

        assert!(!server.registry().contains(2));
        assert_eq!(server.registry().len(), 2);
        for client in [1, 3] {
            let notices: Vec<_> = transport
                .sent_to(client)
                .into_iter()
                .filter(|m| m.message.kind == MsgType::Disconnect)
                .collect();
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].message.disconnected_id(), Some(2));
            assert_eq!(notices[0].delivery, Delivery::Reliable);
        }
        assert!(transport
            .sent_to(2)
            .iter()
            .all(|m| m.message.kind != MsgType::Disconnect));
        assert_eq!(
            server.handler().count(|e| *e == HandlerEvent::Disconnect(2)),
            1
        );
        assert_eq!(transport.timeout_results(), vec![(2, true)]);
        assert_eq!(server.stats().timeouts, 1);
    }

    #[test]
    fn test_client_disconnect_scenario() {
        let (mut server, transport) = running_server(&[1, 2, 3]);
        transport.push_inbound(Message::disconnect(2), 2);

        server.tick();

        let mut remaining: Vec<ClientId> = server.registry().ids().collect();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 3]);

        for client in [1, 3] {
            let notices: Vec<_> = transport
                .sent_to(client)
                .into_iter()
                .filter(|m| m.delivery == Delivery::Reliable)
                .collect();
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].message, Message::disconnect(2));
        }
        assert!(transport.sent_to(2).is_empty());
        assert_eq!(server.handler().session_events(), vec![HandlerEvent::Disconnect(2)]);
        assert_eq!(server.stats().client_disconnects, 1);
    }

    #[test]
    fn test_custom_message_scenario() {
        let (mut server, transport) = running_server(&[4]);
        transport.push_inbound(Message::new(99u16, b"X".to_vec()), 4);

        server.tick();

        assert_eq!(
            server.handler().session_events(),
            vec![HandlerEvent::Custom(99, b"X".to_vec(), 4)]
        );
        assert_eq!(server.registry().len(), 1);
    }

    #[test]
    fn test_stop_scenario() {
        let (mut server, transport) = running_server(&[5, 7]);

        server.stop();

        for client in [5, 7] {
            let sent = transport.sent_to(client);
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].message, Message::disconnect(client));
            assert_eq!(sent[0].delivery, Delivery::BestEffort);
        }
        assert!(server.registry().is_empty());
        assert!(!transport.is_bound());
        assert!(!server.is_working());
        assert_eq!(server.handler().events, vec![HandlerEvent::Stop]);

        // Ticks are no-ops until the next successful start.
        transport.push_inbound(Message::connect(), 9);
        let calls = transport.call_count();
        server.tick();
        assert_eq!(transport.call_count(), calls);

        assert!(server.start(PORT));
        server.tick();
        assert!(server.registry().contains(9));
    }

    #[test]
    fn test_stop_twice_is_safe() {
        let (mut server, transport) = running_server(&[1]);
        server.stop();
        let calls = transport.call_count();

        server.stop();

        assert_eq!(transport.call_count(), calls);
        assert_eq!(server.handler().count(|e| *e == HandlerEvent::Stop), 1);
    }

    #[test]
    fn test_drop_while_running_stops() {
        let transport = LoopbackTransport::new();
        {
            let mut server = Server::new(transport.clone(), RecordingHandler::new());
            server.start(PORT);
            transport.push_inbound(Message::connect(), 3);
            server.tick();
            transport.take_sent();
        }

        assert!(!transport.is_bound());
        assert_eq!(transport.sent_to(3).len(), 1);
        assert_eq!(transport.sent_to(3)[0].message, Message::disconnect(3));
    }

    #[test]
    fn test_on_tick_sees_stats() {
        struct CountingHandler {
            last_seen: Option<ServerStats>,
        }

        impl SessionHandler for CountingHandler {
            fn on_connect(&mut self, _id: ClientId) {}
            fn on_client_update(&mut self, _id: ClientId, _payload: &[u8]) {}
            fn on_disconnect(&mut self, _id: ClientId) {}
            fn on_broadcast_due(&mut self) -> Option<Message> {
                None
            }
            fn on_tick(&mut self, stats: &ServerStats) {
                self.last_seen = Some(stats.clone());
            }
        }

        let transport = LoopbackTransport::new();
        let mut server = Server::new(transport.clone(), CountingHandler { last_seen: None });
        server.start(PORT);
        transport.push_inbound(Message::connect(), 1);
        transport.push_inbound(Message::connect(), 2);
        server.tick();

        let stats = server.handler().last_seen.clone().unwrap();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.messages_processed, 2);
        assert_eq!(stats.connected, 2);
        // Nothing to broadcast, so nothing sent or counted.
        assert_eq!(stats.broadcasts, 0);
        assert!(transport.sent().is_empty());
    }
}
