//! Headless bot used to exercise a running server.
//!
//! Joins, steers toward the nearest food every snapshot and leaves cleanly
//! after the configured duration.

use clap::Parser;
use log::{info, warn};
use shared::protocol::{self, read_frame, write_frame, Envelope, Packet};
use shared::{Direction, GameState, Position};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8888")]
    server: String,

    /// Player name
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Seconds to play before disconnecting
    #[arg(short = 'd', long, default_value = "10")]
    duration: u64,
}

/// Picks a turn toward the closest food, never reversing.
fn choose_direction(state: &GameState, slot: usize) -> Option<Direction> {
    let snake = state.snake(slot).filter(|snake| snake.alive)?;
    let head = snake.head();
    let target = state
        .food
        .iter()
        .min_by_key(|food| (food.x - head.x).abs() + (food.y - head.y).abs())?;

    let (dx, dy) = (target.x - head.x, target.y - head.y);
    let preferred = [
        if dx > 0 { Direction::Right } else { Direction::Left },
        if dy > 0 { Direction::Down } else { Direction::Up },
    ];
    let order = if dx.abs() >= dy.abs() {
        preferred
    } else {
        [preferred[1], preferred[0]]
    };

    order.into_iter().find(|&direction| {
        direction != snake.direction.opposite() && is_safe(state, head.step(direction))
    })
}

fn is_safe(state: &GameState, cell: Position) -> bool {
    !state.is_obstacle(cell)
        && state
            .snakes
            .iter()
            .flatten()
            .all(|snake| !snake.alive || !snake.occupies(cell))
}

async fn send(stream: &mut TcpStream, sender: i32, packet: Packet) -> std::io::Result<()> {
    let payload = protocol::encode_payload(&Envelope::new(sender, packet))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    write_frame(stream, &payload).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let port = stream.local_addr()?.port();
    send(
        &mut stream,
        -1,
        Packet::JoinGame {
            port,
            name: args.name.clone(),
        },
    )
    .await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut slot: Option<usize> = None;
    let mut last_score = None;

    loop {
        let payload = match timeout_at(deadline, read_frame(&mut stream)).await {
            Err(_) => break,
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!("Connection lost: {}", e);
                return Ok(());
            }
        };

        let envelope = match protocol::decode_payload(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Skipping malformed frame: {}", e);
                continue;
            }
        };

        match envelope.packet {
            Packet::GameState(state) => {
                // The server never tells us our slot; find the snake by name.
                if slot.is_none() {
                    slot = (0..state.snakes.len()).find(|&i| {
                        state
                            .snake(i)
                            .is_some_and(|snake| snake.alive && snake.name == args.name)
                    });
                }
                let Some(id) = slot else { continue };

                if let Some(snake) = state.snake(id) {
                    if last_score != Some(snake.score) {
                        info!(
                            "Score {} length {} at {}s",
                            snake.score,
                            snake.len(),
                            state.elapsed_time
                        );
                        last_score = Some(snake.score);
                    }
                    if !snake.alive {
                        info!("Snake died, leaving");
                        break;
                    }
                }

                if state.game_over {
                    info!("Game over");
                    break;
                }

                if let Some(direction) = choose_direction(&state, id) {
                    send(&mut stream, id as i32, Packet::PlayerInput { direction }).await?;
                }
            }
            Packet::Error { message } => {
                warn!("Server refused join: {}", message);
                return Ok(());
            }
            other => info!("Unexpected packet: {:?}", other.message_type()),
        }
    }

    let sender = slot.map_or(-1, |id| id as i32);
    send(&mut stream, sender, Packet::PlayerDisconnect).await?;
    info!("Test client finished");

    Ok(())
}
