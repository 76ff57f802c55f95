//! Authoritative game session.
//!
//! `Game` owns the world snapshot, the slot table and the session clocks.
//! Every operation here runs while the caller holds the session lock
//! (`SharedGame`), so a tick and a join can never interleave.

use crate::client_manager::{ClientManager, FrameSender};
use crate::map::{build_obstacles, ObstacleMap};
use log::{debug, error, info};
use rand::Rng;
use shared::protocol::{self, Envelope, Packet};
use shared::{Direction, GameConfig, GameMode, GameState, Position, Snake, MAX_PLAYERS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

/// Ticks a snake stays frozen after joining or resuming.
pub const RESUME_COUNTDOWN_TICKS: u32 = 30;
/// An empty standard-mode game ends after this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const FOOD_PLACEMENT_ATTEMPTS: usize = 100;

/// The session shared between the dispatcher and the tick loop.
pub type SharedGame = Arc<Mutex<Game>>;

/// Why a join was refused. The `Display` text is sent verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Game is singleplayer only")]
    SingleplayerOnly,
    #[error("Game is full ({current}/{max} players)")]
    Full { current: u32, max: u32 },
    #[error("Server is shutting down")]
    ShuttingDown,
}

pub struct Game {
    state: GameState,
    clients: ClientManager,
    start_time: Instant,
    last_player_time: Instant,
    running: bool,
    shutdown: watch::Sender<bool>,
}

impl Game {
    /// Creates a session, building its obstacle map from `config`.
    pub fn new(config: &GameConfig) -> Self {
        let config = config.clone().sanitized();
        let map = build_obstacles(&config, &mut rand::thread_rng());
        Self::with_map(&config, map)
    }

    /// Creates a session around an existing map. The map's dimensions
    /// replace the configured ones.
    pub fn with_map(config: &GameConfig, map: ObstacleMap) -> Self {
        let mut state = GameState::new(rand::thread_rng().gen(), map.width, map.height, map.cells);
        state.mode = config.mode;
        state.time_limit = match config.mode {
            GameMode::Timed => config.time_limit,
            GameMode::Standard => 0,
        };
        state.max_players = config.max_players.clamp(1, MAX_PLAYERS as u32);

        info!(
            "Created game {} ({}x{}, {:?}, up to {} players)",
            state.game_id, state.width, state.height, state.mode, state.max_players
        );

        let now = Instant::now();
        let (shutdown, _) = watch::channel(false);
        Self {
            clients: ClientManager::new(state.max_players as usize),
            state,
            start_time: now,
            last_player_time: now,
            running: true,
            shutdown,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn player_count(&self) -> u32 {
        self.state.player_count
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.clients.is_connected(slot)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_game_over(&self) -> bool {
        self.state.game_over
    }

    /// Flips to `true` once the session is stopped. Connection handlers
    /// select on it so blocked reads end and their sockets get closed.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Clears the running flag, signals every connection handler and
    /// releases every slot. The accept and tick loops exit on their next
    /// check.
    pub fn stop(&mut self) {
        self.running = false;
        self.shutdown.send_replace(true);
        let slots: Vec<usize> = self.clients.connected_slots().collect();
        for slot in slots {
            self.leave(slot);
        }
    }

    fn capacity_error(&self) -> JoinError {
        if self.state.max_players == 1 {
            JoinError::SingleplayerOnly
        } else {
            JoinError::Full {
                current: self.state.player_count,
                max: self.state.max_players,
            }
        }
    }

    /// Seats a new player in the lowest free slot and returns the slot id.
    pub fn join(&mut self, sender: FrameSender, name: &str) -> Result<usize, JoinError> {
        if !self.running {
            return Err(JoinError::ShuttingDown);
        }
        if self.state.player_count >= self.state.max_players {
            return Err(self.capacity_error());
        }
        let slot = match self.clients.add_client(sender) {
            Some(slot) => slot,
            None => return Err(self.capacity_error()),
        };

        let spawn = self.spawn_position(slot);
        let mut snake = Snake::new(slot as u8, spawn.x, spawn.y, name);
        snake.spawn_time = self.state.elapsed_time;
        self.state.snakes[slot] = Some(snake);

        self.clients.arm_countdown(slot, RESUME_COUNTDOWN_TICKS);
        self.state.player_count += 1;
        self.last_player_time = Instant::now();
        self.generate_food();

        info!(
            "Player '{}' joined slot {} at ({}, {}), {}/{} players",
            name, slot, spawn.x, spawn.y, self.state.player_count, self.state.max_players
        );
        Ok(slot)
    }

    /// Spawn cells form a 4-column grid around the world center, pulled back
    /// so the initial body fits inside the world.
    fn spawn_position(&self, slot: usize) -> Position {
        let (width, height) = (self.state.width, self.state.height);
        let mut x = width / 2 + (slot % 4) as i32 * 5;
        let mut y = height / 2 + (slot / 4) as i32 * 5;

        while x >= width - 3 {
            x -= 5;
        }
        while y >= height - 3 {
            y -= 5;
        }
        Position::new(x.max(2), y.max(0))
    }

    /// Frees a slot. The snake stays in the snapshot, marked dead.
    pub fn leave(&mut self, slot: usize) {
        if !self.clients.remove_client(slot) {
            return;
        }
        if let Some(snake) = self.state.snakes[slot].as_mut() {
            snake.alive = false;
        }
        self.state.player_count = self.state.player_count.saturating_sub(1);
        self.last_player_time = Instant::now();

        info!(
            "Player in slot {} left, {}/{} players",
            slot, self.state.player_count, self.state.max_players
        );
    }

    fn connected_snake_mut(&mut self, slot: usize) -> Option<&mut Snake> {
        if !self.clients.is_connected(slot) {
            return None;
        }
        self.state.snakes.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn input(&mut self, slot: usize, direction: Direction) {
        if let Some(snake) = self.connected_snake_mut(slot) {
            snake.change_direction(direction);
        }
    }

    /// Pauses immediately and cancels any pending resume.
    pub fn pause(&mut self, slot: usize) {
        if let Some(snake) = self.connected_snake_mut(slot) {
            snake.paused = true;
            self.clients.arm_countdown(slot, 0);
            debug!("Slot {} paused", slot);
        }
    }

    /// Arms the resume countdown. `paused` is cleared by `update` once it
    /// runs out.
    pub fn resume(&mut self, slot: usize) {
        if self.connected_snake_mut(slot).is_some() {
            self.clients.arm_countdown(slot, RESUME_COUNTDOWN_TICKS);
            debug!("Slot {} resuming in {} ticks", slot, RESUME_COUNTDOWN_TICKS);
        }
    }

    /// Runs one simulation tick against the wall clock.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Runs one simulation tick as if the current time were `now`.
    pub fn update_at(&mut self, now: Instant) {
        self.state.elapsed_time = now.saturating_duration_since(self.start_time).as_secs() as u32;

        if self.check_game_over(now) {
            return;
        }

        for slot in self.clients.tick_countdowns() {
            if let Some(snake) = self.state.snakes[slot].as_mut() {
                snake.paused = false;
            }
        }

        let wrap = self.state.wraps();
        let (width, height) = (self.state.width, self.state.height);
        let movers: Vec<usize> = self
            .clients
            .connected_slots()
            .filter(|&slot| self.clients.countdown(slot) == 0)
            .collect();
        for slot in movers {
            if let Some(snake) = self.state.snakes[slot].as_mut() {
                snake.step(width, height, wrap);
            }
        }

        let connected: Vec<usize> = self.clients.connected_slots().collect();
        for &slot in &connected {
            let Some(snake) = self.state.snake(slot) else {
                continue;
            };
            if !snake.alive {
                continue;
            }

            if self.is_fatal(slot, snake, wrap, &connected) {
                if let Some(snake) = self.state.snakes[slot].as_mut() {
                    snake.alive = false;
                    debug!("Snake in slot {} died at tick time {}s", slot, self.state.elapsed_time);
                }
                continue;
            }

            let head = snake.head();
            if let Some(index) = self.state.food.iter().position(|&food| food == head) {
                self.state.food.remove(index);
                if let Some(snake) = self.state.snakes[slot].as_mut() {
                    snake.grow();
                }
            }
        }

        self.generate_food();
    }

    fn check_game_over(&mut self, now: Instant) -> bool {
        let over = match self.state.mode {
            GameMode::Timed => {
                self.state.time_limit > 0 && self.state.elapsed_time >= self.state.time_limit
            }
            GameMode::Standard => {
                self.state.player_count == 0
                    && now.saturating_duration_since(self.last_player_time) >= IDLE_TIMEOUT
            }
        };

        if over && !self.state.game_over {
            info!(
                "Game {} over after {}s",
                self.state.game_id, self.state.elapsed_time
            );
        }
        self.state.game_over |= over;
        over
    }

    /// Collision checks in order: world edge, obstacle, own body, other
    /// live snakes' bodies.
    fn is_fatal(&self, slot: usize, snake: &Snake, wrap: bool, connected: &[usize]) -> bool {
        let head = snake.head();
        if !wrap && !self.state.in_bounds(head) {
            return true;
        }
        if self.state.is_obstacle(head) {
            return true;
        }
        if snake.collides_with_self() {
            return true;
        }
        connected
            .iter()
            .filter(|&&other| other != slot)
            .filter_map(|&other| self.state.snake(other))
            .any(|other| other.alive && snake.collides_with(other))
    }

    /// Tops food up to one item per live player.
    ///
    /// Gives up on an item after `FOOD_PLACEMENT_ATTEMPTS` random cells so a
    /// crowded world cannot stall the tick.
    fn generate_food(&mut self) {
        let target = self
            .clients
            .connected_slots()
            .filter(|&slot| self.state.snake(slot).is_some_and(|snake| snake.alive))
            .count()
            .min(MAX_PLAYERS);

        let mut rng = rand::thread_rng();
        while self.state.food.len() < target {
            let cell = (0..FOOD_PLACEMENT_ATTEMPTS)
                .map(|_| {
                    Position::new(
                        rng.gen_range(0..self.state.width),
                        rng.gen_range(0..self.state.height),
                    )
                })
                .find(|&pos| self.is_free_cell(pos));

            match cell {
                Some(pos) => self.state.food.push(pos),
                None => {
                    debug!("No free cell for food after {} attempts", FOOD_PLACEMENT_ATTEMPTS);
                    break;
                }
            }
        }
    }

    fn is_free_cell(&self, pos: Position) -> bool {
        self.state.in_bounds(pos)
            && !self.state.is_obstacle(pos)
            && !self.state.food.contains(&pos)
            && !self.clients.connected_slots().any(|slot| {
                self.state
                    .snake(slot)
                    .is_some_and(|snake| snake.alive && snake.occupies(pos))
            })
    }

    /// Deep copy of the world for encoding.
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    /// Encodes the current snapshot once and queues it for every connected
    /// client. Returns how many clients accepted the frame.
    pub fn broadcast(&self) -> usize {
        let envelope = Envelope::from_server(Packet::GameState(Box::new(self.snapshot())));
        match protocol::encode(&envelope) {
            Ok(frame) => self.clients.broadcast(&Arc::new(frame)),
            Err(e) => {
                error!("Failed to encode game state: {}", e);
                0
            }
        }
    }
}
