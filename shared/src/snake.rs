//! Snake kinematics and collision primitives.
//!
//! These functions are pure with respect to the world: the session decides
//! which snakes move and which collisions apply, the snake only knows its own
//! body. Running the same primitives on the client keeps any local preview in
//! step with the authoritative server.

use crate::types::{Direction, Position};
use crate::{FOOD_SCORE, INITIAL_SNAKE_LENGTH, MAX_NAME_LENGTH, MAX_SNAKE_LENGTH};
use serde::{Deserialize, Serialize};

/// Per-player entity.
///
/// `body[0]` is the head; `body.len()` is the snake's length and always lies
/// in `1..=MAX_SNAKE_LENGTH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snake {
    pub body: Vec<Position>,
    /// Direction applied on the last move.
    pub direction: Direction,
    /// Turn queued for the next move; `None` when nothing is queued.
    pub pending_direction: Direction,
    pub player_id: u8,
    pub score: u32,
    pub alive: bool,
    pub paused: bool,
    pub name: String,
    /// Session elapsed seconds at the moment this snake spawned.
    pub spawn_time: u32,
}

impl Snake {
    /// Creates a horizontal snake facing right with its head at `(x, y)`.
    pub fn new(player_id: u8, x: i32, y: i32, name: &str) -> Self {
        let body = (0..INITIAL_SNAKE_LENGTH as i32)
            .map(|i| Position::new(x - i, y))
            .collect();

        Self {
            body,
            direction: Direction::Right,
            pending_direction: Direction::None,
            player_id,
            score: 0,
            alive: true,
            paused: false,
            name: truncate_name(name),
            spawn_time: 0,
        }
    }

    pub fn head(&self) -> Position {
        self.body[0]
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Advances the snake one cell.
    ///
    /// A queued turn is applied here and then cleared, so however many
    /// direction changes arrive between two ticks at most one of them takes
    /// effect per tick.
    pub fn step(&mut self, width: i32, height: i32, wrap: bool) {
        if !self.alive || self.paused || self.direction == Direction::None {
            return;
        }

        if self.pending_direction != Direction::None {
            self.direction = self.pending_direction;
            self.pending_direction = Direction::None;
        }

        let mut head = self.head().step(self.direction);
        if wrap {
            head.x = head.x.rem_euclid(width);
            head.y = head.y.rem_euclid(height);
        }

        self.body.rotate_right(1);
        self.body[0] = head;
    }

    /// Queues a turn. `None` and a reversal of the current direction are
    /// ignored; a later call overwrites an earlier queued turn.
    pub fn change_direction(&mut self, direction: Direction) {
        if direction == Direction::None || direction == self.direction.opposite() {
            return;
        }
        self.pending_direction = direction;
    }

    /// Extends the tail by one cell and awards the food score.
    pub fn grow(&mut self) {
        if self.body.len() >= MAX_SNAKE_LENGTH {
            return;
        }
        let tail = self.body[self.body.len() - 1];
        self.body.push(tail);
        self.score += FOOD_SCORE;
    }

    pub fn collides_with_self(&self) -> bool {
        let head = self.head();
        self.body[1..].contains(&head)
    }

    /// True when this snake's head touches the body of `other`. The other
    /// snake's head is excluded, so coincident heads are not a collision.
    pub fn collides_with(&self, other: &Snake) -> bool {
        other.body[1..].contains(&self.head())
    }

    pub fn occupies(&self, pos: Position) -> bool {
        self.body.contains(&pos)
    }
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LENGTH - 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_creation() {
        let snake = Snake::new(2, 10, 5, "alice");

        assert_eq!(snake.player_id, 2);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(10, 5));
        assert_eq!(
            snake.body,
            vec![
                Position::new(10, 5),
                Position::new(9, 5),
                Position::new(8, 5)
            ]
        );
        assert_eq!(snake.direction, Direction::Right);
        assert_eq!(snake.pending_direction, Direction::None);
        assert_eq!(snake.score, 0);
        assert!(snake.alive);
        assert!(!snake.paused);
    }

    #[test]
    fn test_snake_name_truncated() {
        let long_name = "x".repeat(64);
        let snake = Snake::new(0, 5, 5, &long_name);
        assert_eq!(snake.name.chars().count(), MAX_NAME_LENGTH - 1);
    }

    #[test]
    fn test_step_moves_body() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.step(20, 20, false);

        assert_eq!(
            snake.body,
            vec![
                Position::new(6, 5),
                Position::new(5, 5),
                Position::new(4, 5)
            ]
        );
    }

    #[test]
    fn test_step_wraps_right_edge() {
        let mut snake = Snake::new(0, 9, 5, "a");
        snake.step(10, 10, true);
        assert_eq!(snake.head(), Position::new(0, 5));
    }

    #[test]
    fn test_step_wraps_top_edge() {
        let mut snake = Snake::new(0, 4, 0, "a");
        snake.change_direction(Direction::Up);
        snake.step(10, 10, true);
        assert_eq!(snake.head(), Position::new(4, 9));
    }

    #[test]
    fn test_step_without_wrap_leaves_world() {
        let mut snake = Snake::new(0, 9, 5, "a");
        snake.step(10, 10, false);
        assert_eq!(snake.head(), Position::new(10, 5));
    }

    #[test]
    fn test_step_noop_when_dead_or_paused() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.paused = true;
        snake.step(20, 20, false);
        assert_eq!(snake.head(), Position::new(5, 5));

        snake.paused = false;
        snake.alive = false;
        snake.step(20, 20, false);
        assert_eq!(snake.head(), Position::new(5, 5));
    }

    #[test]
    fn test_reversal_is_rejected() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.change_direction(Direction::Left);
        assert_eq!(snake.pending_direction, Direction::None);

        snake.step(20, 20, false);
        assert_eq!(snake.direction, Direction::Right);
        assert_eq!(snake.head(), Position::new(6, 5));
    }

    #[test]
    fn test_none_direction_is_rejected() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.change_direction(Direction::Up);
        snake.change_direction(Direction::None);
        assert_eq!(snake.pending_direction, Direction::Up);
    }

    #[test]
    fn test_queued_turns_collapse_into_one() {
        let mut snake = Snake::new(0, 5, 5, "a");

        // Up then Left between two ticks must not reverse through the neck.
        snake.change_direction(Direction::Up);
        snake.change_direction(Direction::Left);
        assert_eq!(snake.pending_direction, Direction::Up);

        snake.change_direction(Direction::Down);
        assert_eq!(snake.pending_direction, Direction::Down);

        snake.step(20, 20, false);
        assert_eq!(snake.direction, Direction::Down);
        assert_eq!(snake.pending_direction, Direction::None);
        assert_eq!(snake.head(), Position::new(5, 6));

        snake.step(20, 20, false);
        assert_eq!(snake.head(), Position::new(5, 7));
    }

    #[test]
    fn test_grow() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.grow();

        assert_eq!(snake.len(), 4);
        assert_eq!(snake.score, FOOD_SCORE);
        assert_eq!(snake.body[3], snake.body[2]);

        snake.step(20, 20, false);
        assert_eq!(snake.body[3], Position::new(3, 5));
    }

    #[test]
    fn test_grow_capped_at_max_length() {
        let mut snake = Snake::new(0, 5, 5, "a");
        let tail = snake.body[2];
        snake.body.resize(MAX_SNAKE_LENGTH, tail);
        snake.score = 70;

        snake.grow();
        assert_eq!(snake.len(), MAX_SNAKE_LENGTH);
        assert_eq!(snake.score, 70);
    }

    #[test]
    fn test_self_collision() {
        let mut snake = Snake::new(0, 5, 5, "a");
        assert!(!snake.collides_with_self());

        snake.body = vec![
            Position::new(5, 5),
            Position::new(6, 5),
            Position::new(6, 6),
            Position::new(5, 6),
            Position::new(5, 5),
        ];
        assert!(snake.collides_with_self());
    }

    #[test]
    fn test_freshly_grown_tail_is_not_self_collision() {
        let mut snake = Snake::new(0, 5, 5, "a");
        snake.grow();
        assert!(!snake.collides_with_self());
    }

    #[test]
    fn test_collision_with_other_body() {
        let attacker = Snake::new(0, 9, 5, "a");
        let victim = Snake::new(1, 10, 5, "b");
        // victim body: (10,5) (9,5) (8,5); attacker head (9,5) hits index 1.
        assert!(attacker.collides_with(&victim));
        assert!(!victim.collides_with(&attacker));
    }

    #[test]
    fn test_head_to_head_is_not_collision() {
        let a = Snake::new(0, 5, 5, "a");
        let mut b = Snake::new(1, 5, 5, "b");
        b.body = vec![
            Position::new(5, 5),
            Position::new(5, 6),
            Position::new(5, 7),
        ];

        assert!(!a.collides_with(&b));
        assert!(!b.collides_with(&a));
    }

    #[test]
    fn test_occupies() {
        let snake = Snake::new(0, 5, 5, "a");
        assert!(snake.occupies(Position::new(5, 5)));
        assert!(snake.occupies(Position::new(3, 5)));
        assert!(!snake.occupies(Position::new(2, 5)));
        assert!(!snake.occupies(Position::new(5, 6)));
    }
}
