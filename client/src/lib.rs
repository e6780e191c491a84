//! # Sync Client Library
//!
//! Client side of the two-player farming sandbox. A client holds a read
//! replica of the shared world, proposes edits to the server and converges on
//! whatever the server accepts.
//!
//! ## Replica Model
//!
//! The server is the only authority. The replica applies three kinds of
//! updates, all with the same last-write-wins rule:
//!
//! - full `world` pushes, which replace the grids outright
//! - point `world_op` messages for edits made by the partner
//! - `snapshot` messages carrying player positions and the ops accepted since
//!   the previous snapshot
//!
//! Local edits are applied optimistically before they are sent. Because every
//! op is an overwrite of one cell, seeing the same op again from the server
//! changes nothing.
//!
//! ## Module Organization
//!
//! - `game`: the replica and its activity log
//! - `worldgen`: deterministic starting worlds
//! - `bot`: scripted player actions standing in for user input
//! - `network`: the WebSocket session and its event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(ClientConfig::default()).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod game;
pub mod network;
pub mod worldgen;
