//! Fixed-capacity slot table for connected players.
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Slot assignment (lowest free index) and capacity enforcement
//! - The outbound frame channel used to reach each client's socket
//! - Per-slot resume countdowns that briefly freeze a snake
//!
//! A slot id stays with its connection for the connection's whole lifetime
//! and only becomes free again once that client leaves.

use log::{debug, info};
use shared::MAX_PLAYERS;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A complete length-prefixed frame, shared between every recipient.
pub type Frame = Arc<Vec<u8>>;

/// Outbound half of a client's connection.
pub type FrameSender = mpsc::Sender<Frame>;

/// Represents a connected client occupying a slot
#[derive(Debug)]
pub struct Client {
    /// Queue drained by the connection's writer task
    pub sender: FrameSender,
    /// Ticks left before the client's snake may move again
    pub countdown: u32,
}

impl Client {
    pub fn new(sender: FrameSender) -> Self {
        Self {
            sender,
            countdown: 0,
        }
    }

    /// Queues a frame without waiting.
    ///
    /// Returns false when the client's queue is full or its connection is
    /// gone. A skipped frame is never resent; the next broadcast carries
    /// fresher state anyway.
    pub fn send(&self, frame: Frame) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}

/// Manages all connected clients, indexed by slot
pub struct ClientManager {
    slots: Vec<Option<Client>>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty table; `max_clients` is capped at `MAX_PLAYERS`.
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: (0..MAX_PLAYERS).map(|_| None).collect(),
            max_clients: max_clients.min(MAX_PLAYERS),
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Claims the lowest free slot for a new client.
    ///
    /// Returns None if the table is at capacity.
    pub fn add_client(&mut self, sender: FrameSender) -> Option<usize> {
        if self.len() >= self.max_clients {
            return None;
        }

        let slot = self.slots[..self.max_clients]
            .iter()
            .position(Option::is_none)?;
        self.slots[slot] = Some(Client::new(sender));
        info!("Client took slot {}", slot);

        Some(slot)
    }

    /// Frees a slot. Returns false if it was already free.
    pub fn remove_client(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot).and_then(Option::take) {
            Some(_) => {
                info!("Client released slot {}", slot);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    pub fn get(&self, slot: usize) -> Option<&Client> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Starts (or restarts) a slot's countdown.
    pub fn arm_countdown(&mut self, slot: usize, ticks: u32) {
        if let Some(client) = self.slots.get_mut(slot).and_then(Option::as_mut) {
            client.countdown = ticks;
        }
    }

    pub fn countdown(&self, slot: usize) -> u32 {
        self.get(slot).map_or(0, |client| client.countdown)
    }

    /// Advances every running countdown by one tick.
    ///
    /// Returns the slots whose countdown reached zero on this tick.
    pub fn tick_countdowns(&mut self) -> Vec<usize> {
        let mut finished = Vec::new();
        for (slot, client) in self.slots.iter_mut().enumerate() {
            if let Some(client) = client {
                if client.countdown > 0 {
                    client.countdown -= 1;
                    if client.countdown == 0 {
                        finished.push(slot);
                    }
                }
            }
        }
        finished
    }

    /// Slots currently occupied, in ascending order.
    pub fn connected_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, client)| client.is_some())
            .map(|(slot, _)| slot)
    }

    /// Queues a frame for every connected client and returns how many
    /// accepted it.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        let mut delivered = 0;
        for (slot, client) in self.slots.iter().enumerate() {
            if let Some(client) = client {
                if client.send(Arc::clone(frame)) {
                    delivered += 1;
                } else {
                    debug!("Skipped frame for slow or closed client {}", slot);
                }
            }
        }
        delivered
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|client| client.is_some()).count()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
