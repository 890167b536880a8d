//! Bodies owned by the simulation: the players' flyers and the scrolling
//! obstacle pairs.

use crate::config::GameConfig;
use shared::{Aabb, ObstacleState, PlayerId, PlayerState, MAX_PLAYERS};

/// A player's falling/jumping body. Its horizontal position never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Flyer {
    x: f32,
    y: f32,
    vy: f32,
    alive: bool,
    width: f32,
    height: f32,
    padding: f32,
}

impl Flyer {
    pub fn new(x: f32, y: f32, config: &GameConfig) -> Self {
        Self {
            x,
            y,
            vy: 0.0,
            alive: true,
            width: config.flyer_width,
            height: config.flyer_height,
            padding: config.flyer_padding.max(0.0),
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn vy(&self) -> f32 {
        self.vy
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Overwrites the vertical velocity, whatever it was.
    pub fn jump(&mut self, jump_velocity: f32) {
        self.vy = jump_velocity;
    }

    /// Semi-implicit Euler step: velocity first, then position.
    pub fn integrate(&mut self, gravity: f32, dt: f32) {
        self.vy += gravity * dt;
        self.y += self.vy * dt;
    }

    /// Death is permanent until the next match reset.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    /// Collision box, inset by the padding on every side.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            self.x + self.padding,
            self.y + self.padding,
            self.width - 2.0 * self.padding,
            self.height - 2.0 * self.padding,
        )
    }

    pub fn state(&self, score: u32) -> PlayerState {
        PlayerState {
            y: self.y,
            vy: self.vy,
            alive: self.alive,
            score,
        }
    }
}

/// A top/bottom bar pair with a vertical opening centred on `gap_center`.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    x: f32,
    gap_center: f32,
    width: f32,
    scored: [bool; MAX_PLAYERS],
    bottom: Aabb,
    top: Aabb,
}

impl Obstacle {
    pub fn new(x: f32, gap_center: f32, config: &GameConfig) -> Self {
        let half_gap = config.gap_height / 2.0;
        let bottom_top = gap_center - half_gap;
        let top_bottom = gap_center + half_gap;

        Self {
            x,
            gap_center,
            width: config.obstacle_width,
            scored: [false; MAX_PLAYERS],
            bottom: Aabb::new(
                x,
                config.ground_height,
                config.obstacle_width,
                bottom_top - config.ground_height,
            ),
            top: Aabb::new(
                x,
                top_bottom,
                config.obstacle_width,
                config.height - top_bottom,
            ),
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn gap_center(&self) -> f32 {
        self.gap_center
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> &Aabb {
        &self.bottom
    }

    pub fn top(&self) -> &Aabb {
        &self.top
    }

    /// Scrolls left by `distance`, dragging both boxes along.
    pub fn scroll(&mut self, distance: f32) {
        self.x -= distance;
        self.bottom.x = self.x;
        self.top.x = self.x;
    }

    /// Latches the score for `player` once `flyer_x` is past the right edge.
    /// Returns true only on the tick the latch flips.
    pub fn try_score(&mut self, player: PlayerId, flyer_x: f32) -> bool {
        let right = self.right();
        let latch = &mut self.scored[player.index()];
        if *latch || flyer_x <= right {
            return false;
        }
        *latch = true;
        true
    }

    pub fn is_offscreen(&self) -> bool {
        self.right() < 0.0
    }

    pub fn hits(&self, bounds: &Aabb) -> bool {
        self.top.overlaps(bounds) || self.bottom.overlaps(bounds)
    }

    pub fn state(&self) -> ObstacleState {
        ObstacleState {
            x: self.x,
            gap_center: self.gap_center,
        }
    }
}
