//! Connection registry for the two-player relay
//!
//! This module tracks which live connection holds which player slot:
//! - Slot assignment on connect (lowest free slot first)
//! - Refusal of connections beyond the two slots
//! - Slot release on disconnect, making it assignable to the next connection
//! - Outbound message routing to one or all bound connections
//!
//! A reconnecting player is not guaranteed its previous slot; whichever
//! connection arrives first while a slot is free receives it.

use log::{info, warn};
use shared::{ServerMessage, Slot, MAX_PLAYERS};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Identifier handed out by the network layer for every accepted socket.
pub type ConnectionId = u32;

/// A live connection bound to a player slot
#[derive(Debug)]
pub struct Connection {
    /// Network-layer identifier of the socket
    pub id: ConnectionId,
    /// Player identity this connection controls
    pub slot: Slot,
    /// Remote address, kept for log lines
    pub addr: SocketAddr,
    /// When the binding was created
    pub connected_at: Instant,
    /// Queue drained by the connection's writer task
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        slot: Slot,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            slot,
            addr,
            connected_at: Instant::now(),
            outbox,
        }
    }

    /// Queues a message for this connection's writer task
    ///
    /// Returns false if the writer has already gone away; the reader side
    /// will report the disconnect shortly after.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbox.send(message).is_ok()
    }
}

/// Fixed table of player slots and the connections bound to them
///
/// The registry never holds more than [`MAX_PLAYERS`] bindings. Dropping a
/// binding drops its outbox sender, which lets the writer task close the
/// socket.
pub struct ConnectionRegistry {
    slots: [Option<Connection>; MAX_PLAYERS],
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Binds a connection to the lowest free slot
    ///
    /// Returns None when both slots are taken. The outbox is dropped in that
    /// case, so the connection is closed without any payload being sent.
    pub fn connect(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<Slot> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            warn!("Refusing connection {} from {}: all slots taken", id, addr);
            return None;
        };
        let slot = Slot::from_index(index)?;

        info!("Connection {} from {} bound to {}", id, addr, slot);
        self.slots[index] = Some(Connection::new(id, slot, addr, outbox));
        Some(slot)
    }

    /// Releases the slot held by a connection
    ///
    /// Returns the freed slot, or None if the connection was never bound
    /// (for example a refused third connection reporting its close).
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Slot> {
        let entry = self
            .slots
            .iter_mut()
            .find(|entry| entry.as_ref().is_some_and(|c| c.id == id))?;
        let connection = entry.take()?;

        info!(
            "Connection {} released {} after {:.1}s",
            connection.id,
            connection.slot,
            connection.connected_at.elapsed().as_secs_f32()
        );
        Some(connection.slot)
    }

    pub fn slot_of(&self, id: ConnectionId) -> Option<Slot> {
        self.get(id).map(|c| c.slot)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots.iter().flatten().find(|c| c.id == id)
    }

    /// Sends a message to a single connection
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.get(id) {
            Some(connection) => {
                let kind = message.kind();
                let sent = connection.send(message);
                if !sent {
                    warn!("Dropped {} for connection {}: writer closed", kind, id);
                }
                sent
            }
            None => false,
        }
    }

    /// Sends a message to every bound connection except `exclude`
    ///
    /// Returns how many connections the message was queued for.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for connection in self.slots.iter().flatten() {
            if Some(connection.id) == exclude {
                continue;
            }
            if connection.send(message.clone()) {
                delivered += 1;
            } else {
                warn!(
                    "Dropped {} for connection {}: writer closed",
                    message.kind(),
                    connection.id
                );
            }
        }
        delivered
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.slots.iter().flatten().map(|c| c.id).collect()
    }

    /// Returns the number of bound connections
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns true if no connection is bound
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
