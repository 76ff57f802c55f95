//! Grid data model shared by the server and every client.

use crate::snake::Snake;
use crate::{
    DEFAULT_OBSTACLE_DENSITY, MAX_DIMENSION, MAX_PLAYERS, MIN_DIMENSION,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Grid coordinate. May lie outside the world for one tick when a snake
/// leaves a non-wrapping map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring cell one step in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    /// Unit offset for this direction, with `y` growing downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::None => (0, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::None => Direction::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    /// Ends once the server has been empty for the idle timeout.
    #[default]
    Standard,
    /// Ends when the elapsed time reaches the configured limit.
    Timed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldType {
    #[default]
    NoObstacles,
    WithObstacles,
}

/// Creation-time parameters of a game session.
///
/// Built once by whoever launches the server and copied into the session;
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub mode: GameMode,
    pub world_type: WorldType,
    pub width: i32,
    pub height: i32,
    /// Seconds, 0 for unlimited.
    pub time_limit: u32,
    /// When set, obstacles are loaded from this file instead of generated.
    pub map_file: Option<PathBuf>,
    /// 1 for singleplayer, up to `MAX_PLAYERS` for multiplayer.
    pub max_players: u32,
    pub obstacle_density: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Standard,
            world_type: WorldType::NoObstacles,
            width: 40,
            height: 20,
            time_limit: 0,
            map_file: None,
            max_players: MAX_PLAYERS as u32,
            obstacle_density: DEFAULT_OBSTACLE_DENSITY,
        }
    }
}

impl GameConfig {
    /// Clamps every field into the range the session can handle.
    pub fn sanitized(mut self) -> Self {
        self.width = self.width.clamp(MIN_DIMENSION, MAX_DIMENSION);
        self.height = self.height.clamp(MIN_DIMENSION, MAX_DIMENSION);
        self.max_players = self.max_players.clamp(1, MAX_PLAYERS as u32);
        self.obstacle_density = if self.obstacle_density.is_finite() {
            self.obstacle_density.clamp(0.0, 1.0)
        } else {
            DEFAULT_OBSTACLE_DENSITY
        };
        if self.mode == GameMode::Standard {
            self.time_limit = 0;
        }
        self
    }
}

/// Serializable snapshot of the whole world. This is the only structure
/// sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: u32,
    /// Indexed by slot. `None` means the slot has never been occupied.
    pub snakes: [Option<Snake>; MAX_PLAYERS],
    pub player_count: u32,
    /// At most `MAX_PLAYERS` items.
    pub food: Vec<Position>,
    pub width: i32,
    pub height: i32,
    /// Row-major `width * height` cells, non-zero for an obstacle.
    pub obstacles: Vec<u8>,
    /// Seconds since the session started.
    pub elapsed_time: u32,
    pub time_limit: u32,
    pub mode: GameMode,
    pub game_over: bool,
    pub max_players: u32,
}

impl GameState {
    pub fn new(game_id: u32, width: i32, height: i32, obstacles: Vec<u8>) -> Self {
        Self {
            game_id,
            snakes: Default::default(),
            player_count: 0,
            food: Vec::with_capacity(MAX_PLAYERS),
            width,
            height,
            obstacles,
            elapsed_time: 0,
            time_limit: 0,
            mode: GameMode::Standard,
            game_over: false,
            max_players: MAX_PLAYERS as u32,
        }
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Out-of-bounds cells are never obstacles.
    pub fn is_obstacle(&self, pos: Position) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        let index = pos.y as usize * self.width as usize + pos.x as usize;
        self.obstacles.get(index).is_some_and(|&cell| cell != 0)
    }

    /// The world wraps at its edges when there is no bitmap or the origin
    /// cell is free.
    pub fn wraps(&self) -> bool {
        self.obstacles.first().map_or(true, |&cell| cell == 0)
    }

    pub fn snake(&self, slot: usize) -> Option<&Snake> {
        self.snakes.get(slot).and_then(Option::as_ref)
    }
}
