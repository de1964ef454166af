//! # Session Server Library
//!
//! This library provides the session and protocol-dispatch layer of a
//! real-time multiplayer server. It turns an unreliable, connectionless
//! datagram transport into a server that tracks which clients are connected,
//! reliably tells peers about departures, evicts silent clients, and
//! broadcasts authoritative world state at a fixed rate.
//!
//! ## Core Responsibilities
//!
//! ### Session Tracking
//! The server keeps the authoritative set of connected client ids. A client
//! joins with a `Connect` message and leaves through a `Disconnect` message,
//! a transport-reported timeout, or server shutdown.
//!
//! ### Departure Notification
//! Whenever a client leaves, every remaining client receives a reliable
//! `Disconnect` notice carrying the departed id.
//!
//! ### State Broadcasting
//! A fixed-rate gate asks the application for a world snapshot and sends it
//! best-effort to every connected client.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Poll Loop
//! Everything happens inside [`network::Server::tick`], called once per frame
//! by the host. No internal threads, no blocking calls. The timeout handler
//! runs as a synchronous callback from the transport's own `update`, on the
//! same call stack, so the registry needs no locking.
//!
//! ### Pluggable Transport
//! The session layer only depends on the [`transport::Transport`] contract.
//! [`transport::UdpTransport`] speaks bincode frames over a non-blocking UDP
//! socket; [`transport::LoopbackTransport`] keeps everything in memory.
//!
//! ### Pluggable Application
//! Game logic lives behind [`handler::SessionHandler`]. The session layer
//! forwards updates and unknown message types to it untouched.
//!
//! ## Module Organization
//!
//! - `registry`: the set of connected clients
//! - `dispatcher`: decoding one inbound message and applying it
//! - `timeout`: eviction of silent peers
//! - `scheduler`: broadcast cadence
//! - `network`: start / tick / stop
//! - `handler`: application hooks
//! - `transport`: transport contract and adapters
//! - `world`: the demonstration world used by the server binary
//! - `config`: host settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::transport::UdpTransport;
//! use server::world::WorldState;
//! use std::time::Duration;
//!
//! let mut server = Server::new(UdpTransport::default(), WorldState::new());
//! if server.start(54000) {
//!     loop {
//!         server.tick();
//!         std::thread::sleep(Duration::from_millis(16));
//!     }
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod timeout;
pub mod transport;
pub mod world;
