//! # Relay Server Library
//!
//! This library provides the authoritative relay for the two-player farming
//! sandbox. It owns the single shared world, validates every mutation a peer
//! proposes, and keeps both clients converged on the same tile and object
//! grids.
//!
//! ## Core Responsibilities
//!
//! ### World Authority
//! The first valid world a peer proposes becomes the world for the lifetime of
//! the process. Later proposals are rejected outright, so two peers that
//! generate a world at the same moment cannot fight over which one is
//! canonical.
//!
//! ### Mutation Funnel
//! Peers never change shared state directly. Each proposed op is decoded,
//! bounds-checked against the target grid and applied in arrival order. An
//! op is a last-write-wins overwrite of one cell, so applying it twice is the
//! same as applying it once.
//!
//! ### Snapshot Delivery
//! Accepted ops are pushed immediately to the partner as a point message and
//! also queued for the next snapshot. The snapshot is the durable delivery
//! path; point messages only shave latency.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All state lives in one [`state::ServerState`] owned by the loop in
//! [`network::Server::run`]. Connection tasks only move frames between
//! sockets and channels, so handlers never need locks.
//!
//! ### WebSocket Transport
//! Each peer holds one WebSocket; frames are JSON text, one message per
//! frame. The transport is ordered per connection, which is what lets a
//! client replay a snapshot's ops in array order.
//!
//! ## Module Organization
//!
//! - `registry`: two fixed player slots and the connections bound to them
//! - `store`: the accepted world, pending ops and the activity log
//! - `applier`: decoding and applying proposed ops
//! - `broadcast`: point ops, snapshots and the debounced resync timer
//! - `game`: authoritative player positions
//! - `state`: per-message handlers tying the above together
//! - `network`: sockets, connection tasks and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod applier;
pub mod broadcast;
pub mod game;
pub mod network;
pub mod registry;
pub mod state;
pub mod store;
