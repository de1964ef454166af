use clap::Parser;
use log::{info, warn};
use server::config::ServerConfig;
use server::network::Server;
use server::transport::UdpTransport;
use server::world::WorldState;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Server ticks per second
    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    /// World snapshots per second
    #[arg(short, long, default_value_t = shared::NETWORK_WORLD_UPDATE_RATE)]
    broadcast_rate: f64,

    /// Milliseconds of silence before a client is dropped
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            port: args.port,
            tick_rate: args.tick_rate,
            broadcast_rate: args.broadcast_rate,
            peer_timeout: Duration::from_millis(args.timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on port {} ({} Hz ticks, {} Hz snapshots)",
        config.port, config.tick_rate, config.broadcast_rate
    );

    let mut server = Server::with_broadcast_rate(
        UdpTransport::new(config.peer_timeout),
        WorldState::new(),
        config.broadcast_rate,
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Binding may fail while the port is still held; keep retrying.
    while !server.start(config.port) {
        tokio::select! {
            _ = sleep(Duration::from_secs(1)) => {}
            _ = &mut shutdown => return Ok(()),
        }
    }

    let mut ticker = interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => server.tick(),
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    server.stop();
    Ok(())
}
