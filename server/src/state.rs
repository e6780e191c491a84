//! Server-wide state and the per-message handlers that mutate it.
//!
//! One `ServerState` is built at startup and owned by the event loop task.
//! Every inbound event is handled to completion before the next one, which
//! gives accepted ops a total order equal to their arrival order.

use crate::applier::{apply_op, OpResult};
use crate::broadcast::BroadcastChannel;
use crate::game::GameState;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::store::WorldStore;
use log::{debug, info, warn};
use serde_json::Value;
use shared::{
    timestamp_ms, ClientMessage, InputPayload, ServerMessage, Slot, WorldId, WorldPayload,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct ServerState {
    pub registry: ConnectionRegistry,
    pub store: WorldStore,
    pub game: GameState,
    pub channel: BroadcastChannel,
}

impl ServerState {
    pub fn new(resync_delay: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store: WorldStore::new(),
            game: GameState::new(),
            channel: BroadcastChannel::new(resync_delay),
        }
    }

    /// Binds a new connection and brings it up to date.
    ///
    /// Sends `welcome`, the log history, the active world if there is one,
    /// and then a snapshot to everyone. Returns None if the connection was
    /// refused; its outbox is dropped and nothing is sent.
    pub fn handle_connect(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<Slot> {
        let slot = self.registry.connect(id, addr, outbox)?;

        self.registry
            .send_to(id, ServerMessage::Welcome { player_id: slot });
        self.registry.send_to(
            id,
            ServerMessage::LogInit {
                seq: self.store.last_seq(),
                entries: self.store.log_history(),
            },
        );
        self.send_active_world(id);
        self.flush_snapshot();

        Some(slot)
    }

    pub fn handle_disconnect(&mut self, id: ConnectionId) {
        if let Some(slot) = self.registry.disconnect(id) {
            info!("{} is free ({} connected)", slot, self.registry.len());
        }
    }

    /// Decodes and handles one text frame.
    ///
    /// Unreadable frames are logged and dropped. Everything else is followed
    /// by a snapshot, except an accepted world op, whose snapshot is left to
    /// the debounced resync so bursts of ops share one.
    pub fn handle_text(&mut self, id: ConnectionId, text: &str) {
        let Some(slot) = self.registry.slot_of(id) else {
            debug!("Ignoring frame from unbound connection {}", id);
            return;
        };

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame from {}: {}", slot, e);
                return;
            }
        };

        if !self.handle_message(id, slot, message) {
            self.flush_snapshot();
        }
    }

    /// Handles a decoded message. Returns true if it changed the world.
    pub fn handle_message(&mut self, id: ConnectionId, slot: Slot, message: ClientMessage) -> bool {
        match message {
            ClientMessage::WorldRequest => {
                self.send_active_world(id);
                false
            }
            ClientMessage::WorldSet { world_id, world } => {
                self.propose_world(world_id, world);
                false
            }
            ClientMessage::WorldOp { op } => self.apply_world_op(id, op),
            ClientMessage::Input { payload } => match payload {
                InputPayload::Move { x, y } => {
                    self.game.move_player(slot, x, y);
                    false
                }
                InputPayload::Log { text } => {
                    self.append_log(slot, &text);
                    false
                }
                InputPayload::WorldOp { op } => self.apply_world_op(id, op),
            },
        }
    }

    /// Sends a snapshot to every connection, draining pending ops and logs.
    pub fn flush_snapshot(&mut self) -> usize {
        self.channel
            .broadcast_snapshot(&self.registry, &mut self.store, self.game.players())
    }

    pub async fn resync_due(&mut self) {
        self.channel.resync_due().await
    }

    fn send_active_world(&self, id: ConnectionId) {
        if let Some((world_id, world)) = self.store.active_world() {
            self.registry.send_to(
                id,
                ServerMessage::World {
                    world_id,
                    world: world.clone(),
                },
            );
        }
    }

    fn propose_world(&mut self, world_id: WorldId, world: WorldPayload) {
        if self.store.propose_world(world_id, world).is_err() {
            return;
        }
        if let Some((world_id, world)) = self.store.active_world() {
            let message = ServerMessage::World {
                world_id,
                world: world.clone(),
            };
            self.registry.broadcast(&message, None);
        }
    }

    fn apply_world_op(&mut self, id: ConnectionId, raw: Value) -> bool {
        match apply_op(&mut self.store, raw) {
            OpResult::Changed(op) => {
                self.channel.broadcast_op(&self.registry, &op, Some(id));
                self.channel.schedule_resync();
                true
            }
            OpResult::NoEffect | OpResult::Rejected(_) => false,
        }
    }

    fn append_log(&mut self, slot: Slot, text: &str) {
        if let Some(entry) = self.store.append_log(text, slot.as_str(), timestamp_ms()) {
            self.registry
                .broadcast(&ServerMessage::LogEntry { entry }, None);
        }
    }
}
