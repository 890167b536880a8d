//! Match lifecycle state machine: per-slot readiness plus the Lobby/Active
//! phase.
//!
//! This type only records decisions. Starting the engine, spawning or
//! stopping the tick loop, and broadcasting are the server context's job; it
//! calls in here while holding the lifecycle lock so the registry and the
//! phase are always judged together.

use shared::{PlayerId, ServerMessage, MAX_PLAYERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Lobby,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchLifecycle {
    ready: [bool; MAX_PLAYERS],
    phase: Phase,
}

impl MatchLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn ready_flags(&self) -> [bool; MAX_PLAYERS] {
        self.ready
    }

    pub fn set_ready(&mut self, id: PlayerId, ready: bool) {
        self.ready[id.index()] = ready;
    }

    pub fn clear_ready(&mut self, id: PlayerId) {
        self.ready[id.index()] = false;
    }

    /// Both slots taken, both ready, and not already playing.
    pub fn should_start(&self, occupied: [bool; MAX_PLAYERS]) -> bool {
        self.phase == Phase::Lobby && occupied.iter().all(|&o| o) && self.ready.iter().all(|&r| r)
    }

    pub fn begin(&mut self) {
        self.phase = Phase::Active;
    }

    /// Returns to the lobby and forgets every ready flag. Returns false when
    /// there was no match to abort.
    pub fn abort(&mut self) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        self.phase = Phase::Lobby;
        self.ready = [false; MAX_PLAYERS];
        true
    }

    pub fn lobby_message(&self) -> ServerMessage {
        ServerMessage::Lobby { ready: self.ready }
    }
}
