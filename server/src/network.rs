//! Server network layer handling WebSocket connections and the event loop

use crate::registry::ConnectionId;
use crate::state::ServerState;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Timing knobs for the relay
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Fixed cadence of the fallback snapshot
    pub snapshot_interval: Duration,
    /// Delay between an accepted op and its trailing snapshot
    pub resync_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_millis(100),
            resync_delay: Duration::from_millis(30),
        }
    }
}

/// Events sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    },
    Frame {
        conn_id: ConnectionId,
        text: String,
    },
    Disconnected {
        conn_id: ConnectionId,
    },
    Shutdown,
}

/// Main server coordinating connections and the authoritative state
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    state: ServerState,
    snapshot_interval: Duration,

    // Communication channels
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            state: ServerState::new(config.resync_delay),
            snapshot_interval: config.snapshot_interval,
            event_tx,
            event_rx,
        })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that accepts sockets and starts one connection task each
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut next_conn_id: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id = next_conn_id.wrapping_add(1);

                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, addr, conn_id, event_tx).await
                            {
                                warn!("Connection {} from {} failed: {}", conn_id, addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Connected {
                conn_id,
                addr,
                outbox,
            } => {
                self.state.handle_connect(conn_id, addr, outbox);
            }
            ServerEvent::Frame { conn_id, text } => {
                self.state.handle_text(conn_id, &text);
            }
            ServerEvent::Disconnected { conn_id } => {
                self.state.handle_disconnect(conn_id);
            }
            ServerEvent::Shutdown => return false,
        }
        true
    }

    /// Main server loop: inbound events, debounced resyncs and the fixed
    /// snapshot cadence, all handled on this one task
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut snapshot_interval = interval(self.snapshot_interval);
        snapshot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if !self.handle_event(event) {
                                info!("Server shutting down");
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = self.state.resync_due() => {
                    self.state.flush_snapshot();
                },

                _ = snapshot_interval.tick() => {
                    self.state.flush_snapshot();
                    self.state.game.tick += 1;

                    // Periodic status line
                    if self.state.game.tick % 600 == 0 && !self.state.registry.is_empty() {
                        debug!(
                            "Tick {}: {} connected, world {:?}, {} snapshots sent",
                            self.state.game.tick,
                            self.state.registry.len(),
                            self.state.store.active_world().map(|(id, _)| id),
                            self.state.channel.snapshots_sent()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Runs one WebSocket connection until either side closes it.
///
/// Inbound text frames are forwarded to the server loop. Outbound messages
/// are drained from the outbox by a writer task; once the server drops the
/// outbox (disconnect, or a refused third connection) the writer closes the
/// socket.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for connection {}: {}", conn_id, e);
    }
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.kind(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!("Write to connection {} failed: {}", conn_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    event_tx.send(ServerEvent::Connected {
        conn_id,
        addr,
        outbox,
    })?;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                event_tx.send(ServerEvent::Frame {
                    conn_id,
                    text: text.to_string(),
                })?;
            }
            Ok(Message::Binary(_)) => {
                warn!("Dropping binary frame from connection {}", conn_id);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from connection {} failed: {}", conn_id, e);
                break;
            }
        }
    }

    event_tx.send(ServerEvent::Disconnected { conn_id })?;
    // The writer stops once the server loop drops the outbox.
    let _ = writer.await;
    Ok(())
}
