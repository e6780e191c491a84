use crate::bot::{ActionPlanner, PlayerAction};
use crate::game::ClientGameState;
use crate::worldgen::generate_world;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage, Slot, WorldId};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub seed: u64,
    pub world_width: usize,
    pub world_height: usize,
    /// Bot cadence; `None` keeps the client passive.
    pub action_interval: Option<Duration>,
    /// How long to wait for an existing world before proposing one.
    pub world_wait: Duration,
    pub status_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            seed: 0,
            world_width: 48,
            world_height: 32,
            action_interval: None,
            world_wait: Duration::from_millis(500),
            status_interval: Duration::from_secs(5),
        }
    }
}

/// Protocol state of one client, independent of the socket.
///
/// Every handler returns the messages to send back, so the whole exchange can
/// be driven without a server.
pub struct SyncSession {
    pub player_id: Option<Slot>,
    pub game_state: ClientGameState,
    planner: ActionPlanner,
    seed: u64,
    world_size: (usize, usize),
    proposed: Option<WorldId>,
}

impl SyncSession {
    pub fn new(seed: u64, world_width: usize, world_height: usize) -> Self {
        Self {
            player_id: None,
            game_state: ClientGameState::new(),
            planner: ActionPlanner::new(seed),
            seed,
            world_size: (world_width, world_height),
            proposed: None,
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage) -> Vec<ClientMessage> {
        match message {
            ServerMessage::Welcome { player_id } => {
                info!("Joined as {}", player_id);
                self.player_id = Some(player_id);
                return vec![ClientMessage::WorldRequest];
            }

            ServerMessage::World { world_id, world } => {
                let (width, height) = world.dimensions();
                match self.proposed {
                    Some(proposed) if proposed != world_id => {
                        info!("Proposal {} lost, adopting world {}", proposed, world_id)
                    }
                    _ => info!("Adopting world {} ({}x{})", world_id, width, height),
                }
                self.game_state.apply_world(world_id, world);
            }

            ServerMessage::WorldOp { op } => {
                debug!("Point op {:?}", op);
                self.game_state.apply_op(&op);
            }

            ServerMessage::Snapshot { state, ops, logs } => {
                if !ops.is_empty() {
                    debug!("Snapshot with {} ops", ops.len());
                }
                self.game_state.apply_snapshot(state.players, &ops, logs);
            }

            ServerMessage::LogInit { seq, entries } => {
                debug!("Log history: {} entries up to seq {}", entries.len(), seq);
                self.game_state.apply_log_init(seq, entries);
            }

            ServerMessage::LogEntry { entry } => {
                let text = entry.text.clone();
                if self.game_state.push_log(entry) {
                    info!("[log] {}", text);
                }
            }
        }
        Vec::new()
    }

    /// Builds a world proposal if none has been adopted or proposed yet.
    pub fn propose_world(&mut self, world_id: WorldId) -> Option<ClientMessage> {
        if self.game_state.has_world() || self.proposed.is_some() {
            return None;
        }
        let (width, height) = self.world_size;
        self.proposed = Some(world_id);
        info!("No world yet, proposing world {}", world_id);

        Some(ClientMessage::WorldSet {
            world_id,
            world: generate_world(self.seed, width, height),
        })
    }

    /// Plans one bot action, applies it locally and returns what to send.
    pub fn act(&mut self) -> Vec<ClientMessage> {
        let Some(slot) = self.player_id else {
            return Vec::new();
        };
        let Some(world) = self.game_state.world.as_ref() else {
            return Vec::new();
        };

        let action = self.planner.next_action(world);
        match action {
            PlayerAction::Walk { x, y } => self.game_state.predict_move(slot, x, y),
            _ => {
                for op in action.ops() {
                    self.game_state.apply_op(&op);
                }
            }
        }
        debug!("{} does {:?}", slot, action);
        action.messages(slot)
    }

    pub fn status_line(&self) -> String {
        let players: Vec<String> = self
            .game_state
            .players
            .iter()
            .map(|p| format!("{}@({:.0}, {:.0})", p.id, p.x, p.y))
            .collect();

        format!(
            "player {}, world {}, players [{}], {} log entries, {} snapshots",
            self.player_id.map_or("-", Slot::as_str),
            self.game_state
                .world_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            players.join(", "),
            self.game_state.logs.len(),
            self.game_state.snapshots_applied
        )
    }
}

pub struct Client {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    session: SyncSession,
    config: ClientConfig,
    world_deadline: Option<Instant>,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", config.server_url);
        // Nagle off: ops go out as bursts of small frames.
        let (ws, _) = connect_async_with_config(config.server_url.as_str(), None, true).await?;
        let (sink, stream) = ws.split();

        Ok(Client {
            sink,
            stream,
            session: SyncSession::new(config.seed, config.world_width, config.world_height),
            config,
            world_deadline: None,
        })
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        let text = message.encode()?;
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn send_all(
        &mut self,
        messages: Vec<ClientMessage>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for message in &messages {
            self.send(message).await?;
        }
        Ok(())
    }

    async fn handle_frame(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring frame: {}", e);
                return Ok(());
            }
        };

        let first_welcome =
            matches!(message, ServerMessage::Welcome { .. }) && self.session.player_id.is_none();
        let replies = self.session.handle_message(message);

        if first_welcome {
            self.world_deadline = Some(Instant::now() + self.config.world_wait);
        }
        if self.session.game_state.has_world() {
            self.world_deadline = None;
        }

        self.send_all(replies).await
    }

    /// Runs until the server closes the connection.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let bot_enabled = self.config.action_interval.is_some();
        let mut action_interval = interval(
            self.config
                .action_interval
                .unwrap_or(Duration::from_secs(1))
                .max(Duration::from_millis(1)),
        );
        action_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut status_interval =
            interval(self.config.status_interval.max(Duration::from_millis(1)));

        loop {
            let world_deadline = self.world_deadline;

            tokio::select! {
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text).await?,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Connection error: {}", e);
                            return Err(e.into());
                        }
                    }
                },

                _ = async {
                    match world_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.world_deadline = None;
                    let world_id = WorldId::from(rand::random::<u32>());
                    if let Some(proposal) = self.session.propose_world(world_id) {
                        self.send(&proposal).await?;
                    }
                },

                _ = action_interval.tick(), if bot_enabled => {
                    let messages = self.session.act();
                    self.send_all(messages).await?;
                },

                _ = status_interval.tick() => {
                    info!("{}", self.session.status_line());
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::{ActivityLogEntry, PlayerState, SnapshotState, WorldOp, WorldPayload};

    fn one_cell_world() -> WorldPayload {
        WorldPayload {
            tiles: vec![vec!["grass".to_string()]],
            objects: vec![vec![Value::Null]],
        }
    }

    #[test]
    fn test_handles_wire_welcome() {
        let message =
            tokio_test::assert_ok!(ServerMessage::decode(r#"{"type":"welcome","playerId":"p1"}"#));
        let mut session = SyncSession::new(1, 4, 4);
        session.handle_message(message);
        assert_eq!(session.player_id, Some(Slot::P1));
    }

    #[test]
    fn test_welcome_requests_world() {
        let mut session = SyncSession::new(1, 4, 4);
        let replies = session.handle_message(ServerMessage::Welcome {
            player_id: Slot::P2,
        });

        assert_eq!(session.player_id, Some(Slot::P2));
        assert_eq!(replies, vec![ClientMessage::WorldRequest]);
    }

    #[test]
    fn test_proposes_generated_world_once() {
        let mut session = SyncSession::new(9, 6, 3);

        match session.propose_world(77) {
            Some(ClientMessage::WorldSet { world_id, world }) => {
                assert_eq!(world_id, 77);
                assert_eq!(world, generate_world(9, 6, 3));
            }
            other => panic!("Unexpected proposal {:?}", other),
        }
        assert!(session.propose_world(78).is_none());
    }

    #[test]
    fn test_no_proposal_once_world_adopted() {
        let mut session = SyncSession::new(1, 4, 4);
        session.handle_message(ServerMessage::World {
            world_id: 5,
            world: one_cell_world(),
        });

        assert!(session.propose_world(6).is_none());
        assert_eq!(session.game_state.world_id, Some(5));
    }

    #[test]
    fn test_losing_proposal_adopts_winner() {
        let mut session = SyncSession::new(1, 4, 4);
        session.propose_world(10);
        session.handle_message(ServerMessage::World {
            world_id: 20,
            world: one_cell_world(),
        });

        assert_eq!(session.game_state.world_id, Some(20));
        assert_eq!(session.game_state.world, Some(one_cell_world()));
    }

    #[test]
    fn test_snapshot_and_point_op_converge() {
        let mut session = SyncSession::new(1, 4, 4);
        session.handle_message(ServerMessage::World {
            world_id: 1,
            world: one_cell_world(),
        });

        let op = WorldOp::set_tile(0, 0, "sand");
        session.handle_message(ServerMessage::WorldOp { op: op.clone() });
        session.handle_message(ServerMessage::Snapshot {
            state: SnapshotState {
                players: vec![PlayerState::spawn(Slot::P1)],
            },
            ops: vec![op],
            logs: vec![],
        });

        let world = session.game_state.world.as_ref().unwrap();
        assert_eq!(world.tile(0, 0), Some("sand"));
        assert_eq!(session.game_state.players.len(), 1);
    }

    #[test]
    fn test_log_entry_after_init_not_duplicated() {
        let mut session = SyncSession::new(1, 4, 4);
        let entry = ActivityLogEntry {
            seq: 3,
            text: "p1 tilled soil at (0, 0)".to_string(),
            by: "p1".to_string(),
            at: 0,
        };

        session.handle_message(ServerMessage::LogInit {
            seq: 3,
            entries: vec![entry.clone()],
        });
        session.handle_message(ServerMessage::LogEntry { entry });

        assert_eq!(session.game_state.logs.len(), 1);
    }

    #[test]
    fn test_act_needs_slot_and_world() {
        let mut session = SyncSession::new(1, 4, 4);
        assert!(session.act().is_empty());

        session.handle_message(ServerMessage::Welcome {
            player_id: Slot::P1,
        });
        assert!(session.act().is_empty());

        session.handle_message(ServerMessage::World {
            world_id: 1,
            world: one_cell_world(),
        });
        assert!(!session.act().is_empty());
    }

    #[test]
    fn test_act_applies_edits_optimistically() {
        let mut session = SyncSession::new(4, 4, 4);
        session.handle_message(ServerMessage::Welcome {
            player_id: Slot::P1,
        });
        session.handle_message(ServerMessage::World {
            world_id: 1,
            world: one_cell_world(),
        });

        // A bare grass cell is either tilled or fenced.
        let messages = session.act();
        let world = session.game_state.world.as_ref().unwrap();
        let tilled = world.tile(0, 0) == Some("soil");
        let fenced = world.object(0, 0).map_or(false, |o| !o.is_null());
        assert!(tilled ^ fenced);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_status_line_before_join() {
        let session = SyncSession::new(1, 4, 4);
        assert!(session.status_line().starts_with("player -, world -"));
    }
}
