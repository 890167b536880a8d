//! Server and game-balance configuration
//!
//! Two tables are kept apart:
//! - [`ServerConfig`] covers networking and timing and is filled from the
//!   command line.
//! - [`GameConfig`] is the balance table (gravity, speeds, gap bounds, sizes).
//!   It has sensible defaults and may be overridden from a TOML file.
//!
//! World coordinates are y-up: the ground sits at `ground_height` and the
//! ceiling at `height`, so gravity is negative and the jump velocity positive.

use crate::error::ServerResult;
use log::{info, warn};
use serde::Deserialize;
use shared::DEFAULT_PORT;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse balance table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid balance table: {0}")]
    Invalid(String),
}

/// Numeric game-balance constants shared with clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Playfield width
    pub width: f32,
    /// Playfield height; reaching it with the top of a flyer is lethal
    pub height: f32,
    /// Top of the ground strip; touching it is lethal
    pub ground_height: f32,
    pub gravity: f32,
    /// Vertical velocity a jump sets, overwriting the current one
    pub jump_velocity: f32,
    /// Leftward obstacle speed in units per second
    pub world_speed: f32,
    /// Seconds between obstacle spawns
    pub spawn_interval: f32,
    /// Vertical size of the passable opening
    pub gap_height: f32,
    pub gap_min_y: f32,
    pub gap_max_y: f32,
    /// Fixed horizontal position of every flyer
    pub flyer_x: f32,
    pub flyer_width: f32,
    pub flyer_height: f32,
    /// Hitbox inset applied on all four sides of a flyer
    pub flyer_padding: f32,
    pub obstacle_width: f32,
    /// Distance past the right edge at which obstacles spawn
    pub spawn_margin: f32,
    /// Obstacles spawned immediately on match reset
    pub initial_obstacles: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 480.0,
            height: 800.0,
            ground_height: 100.0,
            gravity: -1000.0,
            jump_velocity: 350.0,
            world_speed: 160.0,
            spawn_interval: 1.5,
            gap_height: 220.0,
            gap_min_y: 300.0,
            gap_max_y: 600.0,
            flyer_x: 120.0,
            flyer_width: 48.0,
            flyer_height: 48.0,
            flyer_padding: 4.0,
            obstacle_width: 80.0,
            spawn_margin: 40.0,
            initial_obstacles: 2,
        }
    }
}

impl GameConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let numbers = [
            ("width", self.width),
            ("height", self.height),
            ("ground_height", self.ground_height),
            ("gravity", self.gravity),
            ("jump_velocity", self.jump_velocity),
            ("world_speed", self.world_speed),
            ("spawn_interval", self.spawn_interval),
            ("gap_height", self.gap_height),
            ("gap_min_y", self.gap_min_y),
            ("gap_max_y", self.gap_max_y),
            ("flyer_x", self.flyer_x),
            ("flyer_width", self.flyer_width),
            ("flyer_height", self.flyer_height),
            ("flyer_padding", self.flyer_padding),
            ("obstacle_width", self.obstacle_width),
            ("spawn_margin", self.spawn_margin),
        ];
        for (name, value) in numbers {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        let positive = [
            ("width", self.width),
            ("height", self.height),
            ("spawn_interval", self.spawn_interval),
            ("gap_height", self.gap_height),
            ("flyer_width", self.flyer_width),
            ("flyer_height", self.flyer_height),
            ("obstacle_width", self.obstacle_width),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.ground_height < 0.0 || self.ground_height >= self.height {
            return Err(ConfigError::Invalid(format!(
                "ground_height {} must lie in [0, {})",
                self.ground_height, self.height
            )));
        }

        if self.gap_min_y > self.gap_max_y {
            return Err(ConfigError::Invalid(format!(
                "gap_min_y {} exceeds gap_max_y {}",
                self.gap_min_y, self.gap_max_y
            )));
        }

        let max_padding = self.flyer_width.min(self.flyer_height) / 2.0;
        if self.flyer_padding < 0.0 || self.flyer_padding > max_padding {
            return Err(ConfigError::Invalid(format!(
                "flyer_padding {} must lie in [0, {}]",
                self.flyer_padding, max_padding
            )));
        }

        Ok(())
    }
}

/// Balance table from `path`, or the defaults when no file is given.
pub fn load_balance(path: Option<&Path>) -> ServerResult<GameConfig> {
    match path {
        Some(path) => {
            let game = GameConfig::from_toml_file(path)?;
            info!(target: "boot", "Loaded balance table from {}", path.display());
            Ok(game)
        }
        None => Ok(GameConfig::default()),
    }
}

/// Networking and timing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Simulation ticks per second while a match is running
    pub tick_rate: u32,
    /// Silence after which a session is evicted
    pub session_timeout: Duration,
    /// How often the timeout sweeper scans the registry
    pub sweep_interval: Duration,
    /// Upper bound on waiting for the tick loop to finish after cancellation
    pub stop_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_rate: 60,
            session_timeout: Duration::from_millis(5_000),
            sweep_interval: Duration::from_millis(1_000),
            stop_timeout: Duration::from_millis(250),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Falls back to [`DEFAULT_PORT`] when the value is missing or unparsable.
    pub fn resolve_port(raw: Option<&str>) -> u16 {
        match raw {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(
                    target: "boot",
                    "Invalid port {:?}, using {}", raw, DEFAULT_PORT
                );
                DEFAULT_PORT
            }),
        }
    }
}
