//! Session registry for the two player slots
//!
//! This module tracks which network endpoint owns which player slot:
//! - Slot assignment, always handing out the lowest free id
//! - Capacity enforcement (two sessions at most)
//! - Per-session activity timestamps for timeout detection
//!
//! Activity timestamps are atomics, so `touch` only needs shared access and
//! the sweeper can scan while the receive loop keeps refreshing sessions.
//! Structural changes (register, remove) need exclusive access; the server
//! wraps the registry in a `RwLock` for that.

use log::info;
use shared::{PlayerId, MAX_PLAYERS};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("both player slots are taken")]
    Full,
}

/// Result of a successful `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A free slot was claimed
    Added(PlayerId),
    /// The endpoint already owned this slot; nothing changed
    Existing(PlayerId),
}

/// A registered player's network identity and liveness state.
#[derive(Debug)]
pub struct Session {
    pub id: PlayerId,
    pub addr: SocketAddr,
    /// Milliseconds since the registry epoch
    last_active_ms: AtomicU64,
}

impl Session {
    fn new(id: PlayerId, addr: SocketAddr, now_ms: u64) -> Self {
        Self {
            id,
            addr,
            last_active_ms: AtomicU64::new(now_ms),
        }
    }

    fn idle_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_active_ms.load(Ordering::Acquire))
    }
}

pub struct SessionRegistry {
    slots: [Option<Session>; MAX_PLAYERS],
    epoch: Instant,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: [None, None],
            epoch: Instant::now(),
        }
    }

    fn millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Claims the lowest free slot for `addr`.
    ///
    /// A known endpoint gets its existing id back. When both slots are taken
    /// the registry is left untouched.
    pub fn register(&mut self, addr: SocketAddr) -> Result<Registration, RegistryError> {
        if let Some(id) = self.lookup(addr) {
            return Ok(Registration::Existing(id));
        }

        let id = PlayerId::ALL
            .into_iter()
            .find(|id| self.slots[id.index()].is_none())
            .ok_or(RegistryError::Full)?;

        let now_ms = self.millis(Instant::now());
        self.slots[id.index()] = Some(Session::new(id, addr, now_ms));
        info!(target: "join", "Session P{} registered from {}", id, addr);

        Ok(Registration::Added(id))
    }

    pub fn lookup(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.sessions()
            .find(|session| session.addr == addr)
            .map(|session| session.id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Session> {
        self.slots[id.index()].as_ref()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Frees the slot. Removing an empty slot is a no-op.
    pub fn remove(&mut self, id: PlayerId) -> Option<Session> {
        let removed = self.slots[id.index()].take();
        if let Some(session) = &removed {
            info!(target: "leave", "Session P{} removed ({})", id, session.addr);
        }
        removed
    }

    /// Marks the session as active now.
    pub fn touch(&self, id: PlayerId) {
        self.touch_at(id, Instant::now());
    }

    pub fn touch_at(&self, id: PlayerId, at: Instant) {
        if let Some(session) = self.get(id) {
            session
                .last_active_ms
                .store(self.millis(at), Ordering::Release);
        }
    }

    pub fn is_expired(&self, id: PlayerId, now: Instant, threshold: Duration) -> bool {
        let now_ms = self.millis(now);
        self.get(id)
            .is_some_and(|session| session.idle_for(now_ms) > threshold.as_millis() as u64)
    }

    /// Ids of sessions silent for longer than `threshold`. Does not remove
    /// anything; the caller decides what eviction means.
    pub fn expired(&self, now: Instant, threshold: Duration) -> Vec<PlayerId> {
        let now_ms = self.millis(now);
        let threshold_ms = threshold.as_millis() as u64;
        self.sessions()
            .filter(|session| session.idle_for(now_ms) > threshold_ms)
            .map(|session| session.id)
            .collect()
    }

    /// Every registered endpoint, slot 1 first.
    pub fn addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.sessions()
            .map(|session| (session.id, session.addr))
            .collect()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten()
    }

    /// Which slots are taken, indexed like `PlayerId::index`.
    pub fn occupancy(&self) -> [bool; MAX_PLAYERS] {
        [self.slots[0].is_some(), self.slots[1].is_some()]
    }

    pub fn len(&self) -> usize {
        self.sessions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
