//! Authoritative fixed-timestep simulation.
//!
//! The [`Simulation`] owns both flyers, the obstacle list and the score
//! counters. It is advanced by the tick loop and read by the dispatcher; jump
//! input crosses threads through the lock-free [`JumpLatch`].

use crate::config::GameConfig;
use crate::entity::{Flyer, Obstacle};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{PlayerId, Snapshot, MAX_PLAYERS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Largest step the integrator will take, whatever the wall clock says.
pub const MAX_TICK_DT: f32 = 0.05;

/// Bounds a measured frame time to `[0, MAX_TICK_DT]`. NaN counts as zero.
pub fn clamp_dt(dt: f32) -> f32 {
    if dt.is_nan() {
        0.0
    } else {
        dt.clamp(0.0, MAX_TICK_DT)
    }
}

/// One pending-jump flag per player.
///
/// Written by the receive loop, consumed by the tick loop. Any number of jump
/// inputs between two ticks coalesce into a single jump.
#[derive(Debug, Default)]
pub struct JumpLatch {
    queued: [AtomicBool; MAX_PLAYERS],
}

impl JumpLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, player: PlayerId) {
        self.queued[player.index()].store(true, Ordering::Release);
    }

    /// Returns whether a jump was pending and clears it.
    pub fn take(&self, player: PlayerId) -> bool {
        self.queued[player.index()].swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        for flag in &self.queued {
            flag.store(false, Ordering::Release);
        }
    }
}

pub struct Simulation {
    config: GameConfig,
    rng: StdRng,
    jumps: Arc<JumpLatch>,
    flyers: [Flyer; MAX_PLAYERS],
    obstacles: Vec<Obstacle>,
    scores: [u32; MAX_PLAYERS],
    spawn_timer: f32,
}

impl Simulation {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic obstacle placement, for tests and replays.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        let start_y = config.height / 2.0;
        let flyers = [
            Flyer::new(config.flyer_x, start_y, &config),
            Flyer::new(config.flyer_x, start_y, &config),
        ];

        let mut simulation = Self {
            config,
            rng,
            jumps: Arc::new(JumpLatch::new()),
            flyers,
            obstacles: Vec::new(),
            scores: [0; MAX_PLAYERS],
            spawn_timer: 0.0,
        };
        simulation.reset();
        simulation
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Handle the receive loop uses to queue jumps without locking the engine.
    pub fn jump_latch(&self) -> Arc<JumpLatch> {
        Arc::clone(&self.jumps)
    }

    /// Puts the world back to the start of a match.
    pub fn reset(&mut self) {
        let start_y = self.config.height / 2.0;
        for flyer in &mut self.flyers {
            *flyer = Flyer::new(self.config.flyer_x, start_y, &self.config);
        }

        self.obstacles.clear();
        self.scores = [0; MAX_PLAYERS];
        self.spawn_timer = 0.0;
        self.jumps.clear();

        for _ in 0..self.config.initial_obstacles {
            self.spawn_obstacle();
        }

        info!(
            target: "sim",
            "Simulation reset with {} obstacles",
            self.obstacles.len()
        );
    }

    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.flyers[player.index()].is_alive()
    }

    pub fn flyer(&self, player: PlayerId) -> &Flyer {
        &self.flyers[player.index()]
    }

    pub fn score(&self, player: PlayerId) -> u32 {
        self.scores[player.index()]
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Advances the world by one tick and returns the dt actually integrated.
    ///
    /// Order matters: jumps, integration, spawning, scrolling, scoring,
    /// retirement, bounds deaths, obstacle deaths. Both death checks see the
    /// positions produced earlier in the same tick.
    pub fn tick(&mut self, dt: f32) -> f32 {
        let dt = clamp_dt(dt);

        // A queued jump is consumed even if the flyer is dead
        for (flyer, id) in self.flyers.iter_mut().zip(PlayerId::ALL) {
            if self.jumps.take(id) && flyer.is_alive() {
                flyer.jump(self.config.jump_velocity);
            }
        }

        for flyer in self.flyers.iter_mut().filter(|f| f.is_alive()) {
            flyer.integrate(self.config.gravity, dt);
        }

        self.spawn_timer += dt;
        if self.spawn_timer >= self.config.spawn_interval {
            self.spawn_timer = 0.0;
            self.spawn_obstacle();
        }

        let distance = self.config.world_speed * dt;
        for obstacle in &mut self.obstacles {
            obstacle.scroll(distance);
        }

        for obstacle in &mut self.obstacles {
            for (flyer, id) in self.flyers.iter().zip(PlayerId::ALL) {
                if flyer.is_alive() && obstacle.try_score(id, flyer.x()) {
                    self.scores[id.index()] += 1;
                    debug!(target: "sim", "P{} scored ({})", id, self.scores[id.index()]);
                }
            }
        }

        self.obstacles.retain(|obstacle| !obstacle.is_offscreen());

        let ground = self.config.ground_height;
        let ceiling = self.config.height;
        for (flyer, id) in self.flyers.iter_mut().zip(PlayerId::ALL) {
            if flyer.is_alive() && (flyer.y() <= ground || flyer.y() + flyer.height() >= ceiling)
            {
                flyer.kill();
                debug!(target: "sim", "P{} left the playfield at y={:.2}", id, flyer.y());
            }
        }

        for obstacle in &self.obstacles {
            for (flyer, id) in self.flyers.iter_mut().zip(PlayerId::ALL) {
                if flyer.is_alive() && obstacle.hits(&flyer.bounds()) {
                    flyer.kill();
                    debug!(target: "sim", "P{} hit an obstacle at x={:.2}", id, obstacle.x());
                }
            }
        }

        dt
    }

    /// Read-only view of the world for broadcasting.
    pub fn snapshot(&self, tick: u64) -> Snapshot {
        Snapshot {
            tick,
            players: [
                self.flyers[0].state(self.scores[0]),
                self.flyers[1].state(self.scores[1]),
            ],
            obstacles: self.obstacles.iter().map(Obstacle::state).collect(),
        }
    }

    fn spawn_obstacle(&mut self) {
        let gap_center = self
            .rng
            .gen_range(self.config.gap_min_y..=self.config.gap_max_y);
        let x = self.config.width + self.config.spawn_margin;
        self.obstacles
            .push(Obstacle::new(x, gap_center, &self.config));
    }

    #[cfg(test)]
    fn insert_obstacle(&mut self, x: f32, gap_center: f32) {
        self.obstacles
            .push(Obstacle::new(x, gap_center, &self.config));
    }
}
