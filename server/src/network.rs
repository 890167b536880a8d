//! Server network layer: UDP socket ownership, the receive loop and the
//! timeout sweeper

use crate::config::{GameConfig, ServerConfig};
use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const RECV_BUFFER_SIZE: usize = 2048;

/// Bound server, ready to run
pub struct Server {
    socket: Arc<UdpSocket>,
    context: Arc<ServerContext>,
    shutdown: CancellationToken,
}

impl Server {
    /// Binds the UDP socket. Failure here is fatal for the process.
    pub async fn bind(config: ServerConfig, game: GameConfig) -> ServerResult<Self> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let socket = Arc::new(socket);
        info!(target: "boot", "Server listening on {}", socket.local_addr()?);

        let context = Arc::new(ServerContext::new(config, game, socket.clone()));

        Ok(Server {
            socket,
            context,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Cancelling this token makes `run` return after aborting any match.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    /// Spawns task that periodically evicts silent sessions
    fn spawn_timeout_sweeper(&self) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        let token = self.shutdown.clone();
        let period = context.config().sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let evicted = context.evict_expired(Instant::now()).await;
                if !evicted.is_empty() {
                    debug!(target: "timeout", "Sweep evicted {:?}", evicted);
                }
            }
        })
    }

    /// Receives and dispatches datagrams until the shutdown token fires.
    pub async fn run(self) -> ServerResult<()> {
        let sweeper = self.spawn_timeout_sweeper();
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!(target: "boot", "Server started successfully");

        loop {
            let (len, from) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        error!(target: "recv", "Error receiving datagram: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                },
            };

            let text = String::from_utf8_lossy(&buffer[..len]);
            let text = text.trim();
            debug!(target: "recv", "{} -> {}", from, text);
            self.context.handle_datagram(text, from).await;
        }

        info!(target: "boot", "Server shutting down");
        self.context.shutdown().await;

        if let Err(e) = sweeper.await {
            error!(target: "timeout", "Sweeper task failed: {}", e);
        }
        Ok(())
    }
}
