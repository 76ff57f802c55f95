//! # Shared Game Library
//!
//! Types and rules used by both the authoritative server and its clients:
//! the grid data model, snake kinematics, and the binary wire protocol.
//!
//! ## Module Organization
//!
//! ### Types (`types`)
//! Grid coordinates, directions, game modes, the creation-time `GameConfig`
//! and the `GameState` snapshot that is broadcast every tick.
//!
//! ### Snake (`snake`)
//! Per-player movement, growth and collision tests. The server decides which
//! snakes move; the snake only knows its own body.
//!
//! ### Protocol (`protocol`)
//! Length-prefixed framing and the tagged `Packet` union. Game-state payloads
//! carry a variable-size obstacle bitmap sized by the embedded dimensions.

pub mod protocol;
pub mod snake;
pub mod types;

pub use protocol::{CodecError, Envelope, MessageType, Packet};
pub use snake::Snake;
pub use types::{Direction, GameConfig, GameMode, GameState, Position, WorldType};

pub const MAX_PLAYERS: usize = 8;
pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SNAKE_LENGTH: usize = 1000;
pub const INITIAL_SNAKE_LENGTH: usize = 3;
pub const FOOD_SCORE: u32 = 10;

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 10;
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_OBSTACLE_DENSITY: f32 = 0.10;

pub const MIN_DIMENSION: i32 = 10;
pub const MAX_DIMENSION: i32 = 200;

/// Upper bound on a single payload. A full snapshot of the largest world
/// with every snake at maximum length stays well below this.
pub const MAX_FRAME_SIZE: usize = 1 << 20;
