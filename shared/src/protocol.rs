//! Wire protocol: typed messages, their binary encoding and stream framing.
//!
//! Every frame on the stream is a 4-byte big-endian length followed by the
//! payload. A payload starts with the message type byte and the sender's
//! player id, followed by a type-specific body. Fixed fields are encoded with
//! bincode (big-endian, fixed-width integers). The one variable region is the
//! obstacle bitmap inside a game-state body: it is written as `width * height`
//! raw bytes, and the decoder reads the embedded dimensions first to know how
//! many bytes to take.

use crate::snake::Snake;
use crate::types::{Direction, GameMode, GameState, Position};
use crate::{MAX_FRAME_SIZE, MAX_PLAYERS, MAX_SNAKE_LENGTH};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sender id used on frames the server originates.
pub const SERVER_SENDER_ID: i32 = -1;

/// Size of the length prefix in front of every payload.
pub const FRAME_HEADER_LEN: usize = 4;

/// Size of the type byte plus sender id that starts every payload.
pub const PAYLOAD_HEADER_LEN: usize = 5;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("frame truncated: declared {declared} bytes but {available} available")]
    LengthMismatch { declared: usize, available: usize },
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("invalid world dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("obstacle bitmap needs {needed} bytes but {available} remain")]
    BitmapOverflow { needed: usize, available: usize },
    #[error("{field} count {count} exceeds {max}")]
    CountOutOfRange {
        field: &'static str,
        count: u32,
        max: usize,
    },
    #[error("snake in slot {slot} has invalid length {length}")]
    InvalidSnakeLength { slot: usize, length: usize },
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("malformed field: {0}")]
    Field(#[from] bincode::Error),
}

/// Discriminant written as the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    JoinGame = 1,
    GameState = 2,
    PlayerInput = 3,
    PlayerDisconnect = 4,
    GameOver = 5,
    Error = 6,
    Pause = 7,
    Resume = 8,
    ListGames = 9,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        Ok(match value {
            1 => MessageType::JoinGame,
            2 => MessageType::GameState,
            3 => MessageType::PlayerInput,
            4 => MessageType::PlayerDisconnect,
            5 => MessageType::GameOver,
            6 => MessageType::Error,
            7 => MessageType::Pause,
            8 => MessageType::Resume,
            9 => MessageType::ListGames,
            other => return Err(CodecError::UnknownMessageType(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    JoinGame { port: u16, name: String },
    PlayerInput { direction: Direction },
    Pause,
    Resume,
    PlayerDisconnect,
    ListGames,

    // Server -> client
    GameState(Box<GameState>),
    GameOver,
    Error { message: String },
}

impl Packet {
    pub fn message_type(&self) -> MessageType {
        match self {
            Packet::JoinGame { .. } => MessageType::JoinGame,
            Packet::PlayerInput { .. } => MessageType::PlayerInput,
            Packet::Pause => MessageType::Pause,
            Packet::Resume => MessageType::Resume,
            Packet::PlayerDisconnect => MessageType::PlayerDisconnect,
            Packet::ListGames => MessageType::ListGames,
            Packet::GameState(_) => MessageType::GameState,
            Packet::GameOver => MessageType::GameOver,
            Packet::Error { .. } => MessageType::Error,
        }
    }
}

/// A packet together with the id of the player that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender: i32,
    pub packet: Packet,
}

impl Envelope {
    pub fn new(sender: i32, packet: Packet) -> Self {
        Self { sender, packet }
    }

    pub fn from_server(packet: Packet) -> Self {
        Self::new(SERVER_SENDER_ID, packet)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_SIZE as u64)
        .allow_trailing_bytes()
}

fn put<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> CodecResult<()> {
    wire_options().serialize_into(buf, value)?;
    Ok(())
}

fn take<T: DeserializeOwned>(cursor: &mut &[u8]) -> CodecResult<T> {
    Ok(wire_options().deserialize_from(cursor)?)
}

/// Encodes an envelope into a payload without the length prefix.
pub fn encode_payload(envelope: &Envelope) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    put(&mut buf, &(envelope.packet.message_type() as u8))?;
    put(&mut buf, &envelope.sender)?;

    match &envelope.packet {
        Packet::JoinGame { port, name } => {
            put(&mut buf, port)?;
            put(&mut buf, name)?;
        }
        Packet::PlayerInput { direction } => put(&mut buf, direction)?,
        Packet::Error { message } => put(&mut buf, message)?,
        Packet::GameState(state) => encode_state(&mut buf, state)?,
        Packet::Pause
        | Packet::Resume
        | Packet::PlayerDisconnect
        | Packet::GameOver
        | Packet::ListGames => {}
    }

    if buf.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(buf.len()));
    }
    Ok(buf)
}

fn encode_state(buf: &mut Vec<u8>, state: &GameState) -> CodecResult<()> {
    let mut food = [Position::default(); MAX_PLAYERS];
    for (slot, item) in food.iter_mut().zip(&state.food) {
        *slot = *item;
    }
    let food_count = state.food.len().min(MAX_PLAYERS) as u32;

    put(buf, &state.game_id)?;
    put(buf, &state.snakes)?;
    put(buf, &state.player_count)?;
    put(buf, &food)?;
    put(buf, &food_count)?;
    put(buf, &state.width)?;
    put(buf, &state.height)?;

    let cells = state.width.max(0) as usize * state.height.max(0) as usize;
    if state.obstacles.len() == cells {
        buf.extend_from_slice(&state.obstacles);
    } else {
        // No bitmap: every cell is free.
        buf.resize(buf.len() + cells, 0);
    }

    put(buf, &state.elapsed_time)?;
    put(buf, &state.time_limit)?;
    put(buf, &state.mode)?;
    put(buf, &state.game_over)?;
    put(buf, &state.max_players)?;
    Ok(())
}

/// Decodes a payload (without the length prefix).
pub fn decode_payload(payload: &[u8]) -> CodecResult<Envelope> {
    let mut cursor = payload;
    let kind: u8 = take(&mut cursor)?;
    let kind = MessageType::try_from(kind)?;
    let sender: i32 = take(&mut cursor)?;

    let packet = match kind {
        MessageType::JoinGame => Packet::JoinGame {
            port: take(&mut cursor)?,
            name: take(&mut cursor)?,
        },
        MessageType::PlayerInput => Packet::PlayerInput {
            direction: take(&mut cursor)?,
        },
        MessageType::Error => Packet::Error {
            message: take(&mut cursor)?,
        },
        MessageType::GameState => Packet::GameState(Box::new(decode_state(&mut cursor)?)),
        MessageType::Pause => Packet::Pause,
        MessageType::Resume => Packet::Resume,
        MessageType::PlayerDisconnect => Packet::PlayerDisconnect,
        MessageType::GameOver => Packet::GameOver,
        MessageType::ListGames => Packet::ListGames,
    };

    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes(cursor.len()));
    }
    Ok(Envelope { sender, packet })
}

fn decode_state(cursor: &mut &[u8]) -> CodecResult<GameState> {
    let game_id: u32 = take(cursor)?;
    let snakes: [Option<Snake>; MAX_PLAYERS] = take(cursor)?;
    for (slot, snake) in snakes.iter().enumerate() {
        if let Some(snake) = snake {
            if snake.is_empty() || snake.len() > MAX_SNAKE_LENGTH {
                return Err(CodecError::InvalidSnakeLength {
                    slot,
                    length: snake.len(),
                });
            }
        }
    }

    let player_count: u32 = take(cursor)?;
    check_count("player", player_count)?;
    let food_table: [Position; MAX_PLAYERS] = take(cursor)?;
    let food_count: u32 = take(cursor)?;
    check_count("food", food_count)?;

    let width: i32 = take(cursor)?;
    let height: i32 = take(cursor)?;
    if width <= 0 || height <= 0 {
        return Err(CodecError::InvalidDimensions { width, height });
    }
    let cells = (width as usize)
        .checked_mul(height as usize)
        .ok_or(CodecError::BitmapOverflow {
            needed: usize::MAX,
            available: cursor.len(),
        })?;
    if cells > cursor.len() {
        return Err(CodecError::BitmapOverflow {
            needed: cells,
            available: cursor.len(),
        });
    }
    let remaining: &[u8] = *cursor;
    let (bitmap, rest) = remaining.split_at(cells);
    let obstacles = bitmap.to_vec();
    *cursor = rest;

    let elapsed_time: u32 = take(cursor)?;
    let time_limit: u32 = take(cursor)?;
    let mode: GameMode = take(cursor)?;
    let game_over: bool = take(cursor)?;
    let max_players: u32 = take(cursor)?;

    Ok(GameState {
        game_id,
        snakes,
        player_count,
        food: food_table[..food_count as usize].to_vec(),
        width,
        height,
        obstacles,
        elapsed_time,
        time_limit,
        mode,
        game_over,
        max_players,
    })
}

fn check_count(field: &'static str, count: u32) -> CodecResult<()> {
    if count as usize > MAX_PLAYERS {
        return Err(CodecError::CountOutOfRange {
            field,
            count,
            max: MAX_PLAYERS,
        });
    }
    Ok(())
}

/// Prefixes a payload with its big-endian length.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Strips the length prefix, checking it against the bytes available.
pub fn unframe(bytes: &[u8]) -> CodecResult<&[u8]> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::LengthMismatch {
            declared: FRAME_HEADER_LEN,
            available: bytes.len(),
        });
    }
    let (header, payload) = bytes.split_at(FRAME_HEADER_LEN);
    let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if declared != payload.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            available: payload.len(),
        });
    }
    Ok(payload)
}

/// Encodes an envelope into a complete length-prefixed frame.
pub fn encode(envelope: &Envelope) -> CodecResult<Vec<u8>> {
    Ok(frame(&encode_payload(envelope)?))
}

/// Decodes a complete length-prefixed frame.
pub fn decode(bytes: &[u8]) -> CodecResult<Envelope> {
    decode_payload(unframe(bytes)?)
}

/// Reads one frame and returns its payload.
///
/// Fails with `InvalidData` when the declared length exceeds
/// `MAX_FRAME_SIZE`; the stream cannot be resynchronised after that.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            CodecError::FrameTooLarge(len),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame(payload)).await?;
    writer.flush().await
}
