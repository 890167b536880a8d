//! # Flappy Duel Server Library
//!
//! Authoritative UDP server for a two-player flappy game. The server owns the
//! only true game state; clients send inputs and render whatever snapshots
//! they receive.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! A fixed-timestep engine integrates both flyers, spawns and scrolls obstacle
//! pairs, latches scores and detects deaths. Its frame time is clamped so a
//! stalled scheduler never produces a huge integration step.
//!
//! ### Session and Lobby Management
//! Two player slots, handed out lowest-first. Players mark themselves ready in
//! the lobby; a match starts when both slots are filled and both are ready,
//! and is aborted as soon as either player leaves or goes silent.
//!
//! ### State Broadcasting
//! While a match runs, a tick loop broadcasts a full snapshot to both players
//! after every step. Sends are best effort: a failure is logged and dropped.
//!
//! ## Architecture Design
//!
//! Three concurrent tasks share one [`context::ServerContext`]:
//! - **Receive loop**: decodes one text command per datagram and dispatches it
//! - **Tick loop**: exists only while a match is active, cancelled through a
//!   `CancellationToken` and joined with a bounded wait
//! - **Timeout sweeper**: evicts sessions that have been silent too long
//!
//! Operations that look at both the registry and the lobby (register,
//! disconnect, eviction, match start, abort) are serialised by a single
//! lifecycle lock, so no task ever observes a half-applied change.
//!
//! ## Module Organization
//!
//! - `config`: network/timing settings and the game-balance table
//! - `entity`: flyers and obstacles
//! - `game`: the simulation engine and the cross-task jump latch
//! - `session`: the two-slot session registry
//! - `lobby`: readiness flags and the Lobby/Active phase
//! - `transport`: outbound send and broadcast over a pluggable transport
//! - `context`: compound operations, the dispatcher and the tick loop
//! - `network`: socket binding, the receive loop and the sweeper
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use flappy_server::config::{GameConfig, ServerConfig};
//! use flappy_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default(), GameConfig::default()).await?;
//!
//!     // Stop the server from elsewhere with `token.cancel()`
//!     let token = server.shutdown_token();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         token.cancel();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;
pub mod session;
pub mod transport;
