//! Probe client: discovers the server, registers, readies up, then flaps and
//! pings for a while, logging every decoded server message.

use clap::Parser;
use log::{info, warn};
use shared::{ClientMessage, ServerMessage, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    server: SocketAddr,

    /// How long to stay connected, in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Milliseconds between jump inputs
    #[arg(short, long, default_value = "400")]
    jump_every: u64,
}

async fn send(socket: &UdpSocket, server: SocketAddr, message: &ClientMessage) -> std::io::Result<()> {
    socket.send_to(message.encode().as_bytes(), server).await?;
    Ok(())
}

fn log_reply(text: &str, snapshots: &mut u64) {
    match ServerMessage::decode(text) {
        Ok(ServerMessage::State(snapshot)) => {
            *snapshots += 1;
            // One line per second at 60 Hz
            if snapshot.tick % 60 == 0 {
                info!(
                    "tick {}: P1 y={:.1} alive={} score={} | P2 y={:.1} alive={} score={} | {} obstacles",
                    snapshot.tick,
                    snapshot.players[0].y,
                    snapshot.players[0].alive,
                    snapshot.players[0].score,
                    snapshot.players[1].y,
                    snapshot.players[1].alive,
                    snapshot.players[1].score,
                    snapshot.obstacles.len()
                );
            }
        }
        Ok(message) => info!("<- {:?}", message),
        Err(e) => warn!("Undecodable reply {:?}: {}", text, e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    for message in [
        ClientMessage::Discover,
        ClientMessage::Connect,
        ClientMessage::Ready(true),
    ] {
        info!("-> {}", message.encode());
        send(&socket, args.server, &message).await?;
        sleep(Duration::from_millis(100)).await;
    }

    let mut buf = [0u8; 2048];
    let mut seq: u64 = 0;
    let mut snapshots: u64 = 0;
    let mut jump_timer = interval(Duration::from_millis(args.jump_every.max(1)));
    let mut ping_timer = interval(Duration::from_secs(1));
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = jump_timer.tick() => {
                seq += 1;
                send(&socket, args.server, &ClientMessage::Input { jump: true, seq: Some(seq) }).await?;
            }
            _ = ping_timer.tick() => {
                send(&socket, args.server, &ClientMessage::Ping).await?;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, _)) => {
                        let text = String::from_utf8_lossy(&buf[..len]);
                        log_reply(&text, &mut snapshots);
                    }
                    Err(e) => warn!("Error receiving reply: {}", e),
                }
            }
        }
    }

    info!("Sending disconnect after {} snapshots", snapshots);
    send(&socket, args.server, &ClientMessage::Disconnect).await?;

    info!("Test client finished");
    Ok(())
}
