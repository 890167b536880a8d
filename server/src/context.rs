//! Shared server state and every operation that touches more than one piece
//! of it.
//!
//! [`ServerContext`] owns the session registry, the match lifecycle, the
//! simulation and the outbound transport. The receive loop, the timeout
//! sweeper and the tick loop all work through one `Arc<ServerContext>`.
//!
//! Locking order:
//! 1. `lifecycle` (coarse): held for the whole of register, disconnect,
//!    eviction, ready-triggered start, abort and shutdown, so start/abort
//!    decisions always see registry and readiness together.
//! 2. `registry`: write guards are short-lived and are never held across a
//!    tick-loop join.
//! 3. `engine`
//!
//! The tick loop never takes `lifecycle`, so joining it while holding that
//! lock cannot deadlock.

use crate::config::{GameConfig, ServerConfig};
use crate::game::{JumpLatch, Simulation, MAX_TICK_DT};
use crate::lobby::MatchLifecycle;
use crate::session::{Registration, RegistryError, SessionRegistry};
use crate::transport::{self, Transport};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ErrorCode, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How long an aborted tick loop gets to unwind before it is left behind.
const ABORT_GRACE: Duration = Duration::from_millis(50);

/// Handle on a running tick loop.
struct TickLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct LifecycleState {
    lobby: MatchLifecycle,
    tick_loop: Option<TickLoop>,
}

pub struct ServerContext {
    config: ServerConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<RwLock<SessionRegistry>>,
    lifecycle: Mutex<LifecycleState>,
    engine: Arc<Mutex<Simulation>>,
    jumps: Arc<JumpLatch>,
}

impl ServerContext {
    pub fn new(config: ServerConfig, game: GameConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_simulation(config, Simulation::new(game), transport)
    }

    pub fn with_simulation(
        config: ServerConfig,
        simulation: Simulation,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let jumps = simulation.jump_latch();
        Self {
            config,
            transport,
            registry: Arc::new(RwLock::new(SessionRegistry::new())),
            lifecycle: Mutex::new(LifecycleState {
                lobby: MatchLifecycle::new(),
                tick_loop: None,
            }),
            engine: Arc::new(Mutex::new(simulation)),
            jumps,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn lookup(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.registry.read().await.lookup(addr)
    }

    pub async fn is_match_active(&self) -> bool {
        self.lifecycle.lock().await.lobby.is_active()
    }

    pub async fn ready_flags(&self) -> [bool; 2] {
        self.lifecycle.lock().await.lobby.ready_flags()
    }

    pub async fn has_tick_loop(&self) -> bool {
        self.lifecycle.lock().await.tick_loop.is_some()
    }

    async fn send(&self, message: &ServerMessage, addr: SocketAddr) {
        transport::send(self.transport.as_ref(), message, addr).await;
    }

    async fn broadcast(&self, message: &ServerMessage) {
        let targets = self.registry.read().await.addrs();
        transport::broadcast(self.transport.as_ref(), message, &targets).await;
    }

    /// Decodes and routes one inbound datagram.
    pub async fn handle_datagram(&self, text: &str, from: SocketAddr) {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "msg", "Ignoring datagram from {}: {}", from, e);
                return;
            }
        };

        let id = match message {
            ClientMessage::Discover => {
                self.send(&ServerMessage::DiscoveryReply, from).await;
                return;
            }
            ClientMessage::Connect => {
                self.register(from).await;
                return;
            }
            _ => match self.lookup(from).await {
                Some(id) => id,
                None => {
                    debug!(target: "msg", "{} from unregistered {}", text.trim(), from);
                    self.send(&ServerMessage::NotRegistered, from).await;
                    return;
                }
            },
        };

        self.registry.read().await.touch(id);

        match message {
            ClientMessage::Ping => self.send(&ServerMessage::Pong, from).await,
            ClientMessage::Disconnect => self.disconnect(id).await,
            ClientMessage::Ready(ready) => self.set_ready(id, ready).await,
            ClientMessage::Input { jump, .. } => self.input(id, jump).await,
            ClientMessage::Discover | ClientMessage::Connect => {}
        }
    }

    /// Claims a slot for `from` and tells everyone about the new lobby.
    ///
    /// A known endpoint is re-acknowledged without any registry change. Joining
    /// while a match runs still registers, but the joiner also gets `IN_GAME`.
    pub async fn register(&self, from: SocketAddr) -> Option<PlayerId> {
        let mut state = self.lifecycle.lock().await;

        let outcome = self.registry.write().await.register(from);
        match outcome {
            Err(RegistryError::Full) => {
                warn!(target: "join", "Rejecting {}: server full", from);
                self.send(&ServerMessage::error(ErrorCode::Full, "server_full"), from)
                    .await;
                None
            }
            Ok(Registration::Existing(id)) => {
                self.registry.read().await.touch(id);
                debug!(target: "join", "P{} reconnected from known endpoint {}", id, from);
                self.send(&ServerMessage::Connected, from).await;
                self.send(&ServerMessage::Registered(id), from).await;
                Some(id)
            }
            Ok(Registration::Added(id)) => {
                state.lobby.clear_ready(id);
                self.send(&ServerMessage::Connected, from).await;
                self.send(&ServerMessage::Registered(id), from).await;
                self.broadcast(&state.lobby.lobby_message()).await;

                if state.lobby.is_active() {
                    self.send(
                        &ServerMessage::error(ErrorCode::InGame, "match_in_progress"),
                        from,
                    )
                    .await;
                }
                Some(id)
            }
        }
    }

    /// Voluntary leave. Aborts a running match.
    pub async fn disconnect(&self, id: PlayerId) {
        let mut state = self.lifecycle.lock().await;
        info!(target: "leave", "P{} disconnected", id);
        self.remove_session(&mut state, id, format!("player_left_{}", id))
            .await;
    }

    pub async fn set_ready(&self, id: PlayerId, ready: bool) {
        let mut state = self.lifecycle.lock().await;

        // The session may have been evicted since the datagram was routed
        if !self.registry.read().await.contains(id) {
            return;
        }

        state.lobby.set_ready(id, ready);
        info!(target: "lobby", "P{} READY={}", id, u8::from(ready));
        self.broadcast(&state.lobby.lobby_message()).await;

        let occupied = self.registry.read().await.occupancy();
        if state.lobby.should_start(occupied) {
            self.start_match(&mut state).await;
        }
    }

    async fn input(&self, id: PlayerId, jump: bool) {
        if !jump {
            return;
        }
        if !self.lifecycle.lock().await.lobby.is_active() {
            return;
        }
        if !self.engine.lock().await.is_alive(id) {
            debug!(target: "input", "Dropping jump from dead P{}", id);
            return;
        }
        self.jumps.queue(id);
    }

    /// Ends a running match. Returns false if there was nothing to abort.
    pub async fn abort(&self, reason: &str) -> bool {
        let mut state = self.lifecycle.lock().await;
        self.abort_match(&mut state, reason).await
    }

    /// Evicts every session silent for longer than the configured timeout as
    /// of `now`, returning the ids removed.
    pub async fn evict_expired(&self, now: Instant) -> Vec<PlayerId> {
        let threshold = self.config.session_timeout;
        let candidates = self.registry.read().await.expired(now, threshold);
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut state = self.lifecycle.lock().await;
        let mut evicted = Vec::with_capacity(candidates.len());
        for id in candidates {
            // Skip sessions that spoke up or left while we waited for the lock
            if !self.registry.read().await.is_expired(id, now, threshold) {
                continue;
            }
            warn!(
                target: "timeout",
                "P{} timed out ({}ms)", id, threshold.as_millis()
            );
            self.remove_session(&mut state, id, format!("timeout_{}", id))
                .await;
            evicted.push(id);
        }
        evicted
    }

    /// Aborts any running match and waits for the tick loop to finish.
    pub async fn shutdown(&self) {
        let mut state = self.lifecycle.lock().await;
        self.abort_match(&mut state, "server_shutdown").await;
        if let Some(tick_loop) = state.tick_loop.take() {
            self.stop_tick_loop(tick_loop).await;
        }
    }

    async fn remove_session(&self, state: &mut LifecycleState, id: PlayerId, reason: String) {
        if self.registry.write().await.remove(id).is_none() {
            return;
        }
        state.lobby.clear_ready(id);

        if state.lobby.is_active() {
            self.abort_match(state, &reason).await;
        } else {
            self.broadcast(&state.lobby.lobby_message()).await;
        }
    }

    async fn start_match(&self, state: &mut LifecycleState) {
        if state.tick_loop.is_some() {
            return;
        }
        info!(target: "game", "Starting match");

        self.engine.lock().await.reset();
        state.lobby.begin();
        self.broadcast(&ServerMessage::MatchStarted).await;
        state.tick_loop = Some(self.spawn_tick_loop());
    }

    async fn abort_match(&self, state: &mut LifecycleState, reason: &str) -> bool {
        if !state.lobby.abort() {
            return false;
        }
        warn!(target: "game", "Aborting match: {}", reason);

        if let Some(tick_loop) = state.tick_loop.take() {
            self.stop_tick_loop(tick_loop).await;
        }

        self.broadcast(&ServerMessage::error(ErrorCode::Abort, reason))
            .await;
        self.broadcast(&ServerMessage::MatchAborted).await;
        self.broadcast(&state.lobby.lobby_message()).await;
        true
    }

    fn spawn_tick_loop(&self) -> TickLoop {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.registry),
            Arc::clone(&self.transport),
            self.config.tick_duration(),
            token.clone(),
        ));
        TickLoop { token, handle }
    }

    async fn stop_tick_loop(&self, tick_loop: TickLoop) {
        tick_loop.token.cancel();
        let mut handle = tick_loop.handle;
        match timeout(self.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(target: "sim", "Tick loop task failed: {}", e),
            Err(_) => {
                warn!(
                    target: "sim",
                    "Tick loop did not stop within {:?}, aborting it", self.config.stop_timeout
                );
                handle.abort();
                if timeout(ABORT_GRACE, handle).await.is_err() {
                    error!(target: "sim", "Aborted tick loop still running after {:?}", ABORT_GRACE);
                }
            }
        }
    }
}

/// Advances the simulation at a fixed rate and broadcasts a snapshot after
/// every step, until `token` is cancelled.
async fn run_tick_loop(
    engine: Arc<Mutex<Simulation>>,
    registry: Arc<RwLock<SessionRegistry>>,
    transport: Arc<dyn Transport>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_update = Instant::now();
    let mut tick: u64 = 0;

    info!(target: "sim", "Tick loop started ({:?} per tick)", period);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let delta_time = now.duration_since(last_update).as_secs_f32();
        last_update = now;

        if delta_time > MAX_TICK_DT {
            warn!(
                target: "sim",
                "Large delta time detected ({:.3}s), capping to {:.3}s", delta_time, MAX_TICK_DT
            );
        }

        let snapshot = {
            let mut engine = engine.lock().await;
            engine.tick(delta_time);
            engine.snapshot(tick)
        };

        let targets = registry.read().await.addrs();
        if token.is_cancelled() {
            break;
        }
        transport::broadcast(transport.as_ref(), &ServerMessage::State(snapshot), &targets).await;
        tick += 1;
    }

    info!(target: "sim", "Tick loop stopped after {} ticks", tick);
}
