//! # Snake Arena Server Library
//!
//! This library provides the authoritative server for the multiplayer snake
//! game. It owns the canonical world, runs the fixed-rate simulation and
//! broadcasts a full snapshot to every connected client each tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Movement, collisions, food and scoring are decided here only. Clients send
//! intents (turn, pause, resume, leave) and render whatever snapshot arrives.
//!
//! ### Player Lifecycle
//! Each connection moves through join, play, pause/resume, death and leave on
//! top of a fixed table of at most eight slots:
//! - Lowest free slot assignment and capacity errors
//! - A short freeze after joining or resuming
//! - Slot release on disconnect or transport failure
//!
//! ### State Broadcasting
//! The snapshot is encoded once per tick under the session lock and queued
//! to every client. A client whose queue is full skips that tick; the next
//! snapshot supersedes it.
//!
//! ## Architecture Design
//!
//! ### One Coarse Lock
//! All mutable session state lives in a single `Game` behind one
//! `tokio::sync::Mutex`. Collision checks scan every snake, so splitting the
//! lock per slot would make those scans racy.
//!
//! ### Task per Connection
//! Every accepted TCP stream gets a reader task that routes packets into the
//! session and a writer task that drains the client's outbound queue. A
//! single tick task drives the simulation.
//!
//! ## Module Organization
//!
//! ### Map Module (`map`)
//! Obstacle bitmap loading, random generation around a safe spawn zone and
//! the flood-fill connectivity check.
//!
//! ### Client Manager Module (`client_manager`)
//! The slot table: per-slot outbound queues and resume countdowns.
//!
//! ### Game Module (`game`)
//! The session itself: join/leave, input, pause/resume, the tick update and
//! snapshot broadcasting.
//!
//! ### Network Module (`network`)
//! Accept loop, per-connection handlers and the tick loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = GameConfig::default();
//!     let server = Server::new("0.0.0.0:8888", &config, Duration::from_millis(100)).await?;
//!
//!     // Runs until the game is over or `server.game()` is stopped.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod map;
pub mod network;
