//! Bot client: connects, streams random updates, prints what the server
//! sends back, then disconnects.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use server::world::{WorldSnapshot, WORLD_SNAPSHOT};
use shared::{decode_frame, encode_frame, Frame, Message, MsgType, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:54000")]
    server: SocketAddr,

    /// Number of updates to send before disconnecting
    #[arg(short, long, default_value_t = 100)]
    updates: u32,

    /// Milliseconds between updates
    #[arg(short, long, default_value_t = 50)]
    interval_ms: u64,
}

async fn send(socket: &UdpSocket, frame: &Frame, to: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&encode_frame(frame)?, to).await?;
    Ok(())
}

/// Handles one datagram from the server, acknowledging reliable frames.
async fn handle_datagram(
    socket: &UdpSocket,
    bytes: &[u8],
    server: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some((message, reliable_id)) = decode_frame(bytes)?.into_message() else {
        return Ok(());
    };

    if let Some(reliable_id) = reliable_id {
        send(socket, &Frame::Ack { reliable_id }, server).await?;
    }

    match message.kind {
        MsgType::Disconnect => match message.disconnected_id() {
            Some(id) => info!("Client {} left the server", id),
            None => info!("Server closed the session"),
        },
        MsgType::Custom(WORLD_SNAPSHOT) => {
            let snapshot = WorldSnapshot::decode(&message.payload)?;
            info!(
                "World tick {}: {} clients",
                snapshot.tick,
                snapshot.clients.len()
            );
        }
        other => warn!("Unexpected message {:?}", other),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    info!("Connecting to {}", args.server);
    send(&socket, &Frame::data(&Message::connect(), None), args.server).await?;

    let mut rng = rand::thread_rng();
    let mut ticker = interval(Duration::from_millis(args.interval_ms));
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    for _ in 0..args.updates {
        ticker.tick().await;

        let position: (f32, f32) = (rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0));
        let update = Message::client_update(bincode::serialize(&position)?);
        send(&socket, &Frame::data(&update, None), args.server).await?;

        // Drain whatever arrived since the last update.
        while let Ok(received) = timeout(Duration::from_millis(1), socket.recv_from(&mut buf)).await {
            let (len, from) = received?;
            if from != args.server {
                continue;
            }
            if let Err(e) = handle_datagram(&socket, &buf[..len], args.server).await {
                warn!("Bad datagram from server: {}", e);
            }
        }
    }

    info!("Sending disconnect");
    let disconnect = Message::new(MsgType::Disconnect, Vec::new());
    send(&socket, &Frame::data(&disconnect, None), args.server).await?;

    info!("Test client finished");
    Ok(())
}
