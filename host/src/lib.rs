//! # Platformer host
//!
//! The authoritative side of a session. The host owns the only simulating
//! copy of the world; peers receive its state and send input.
//!
//! ## Module Organization
//!
//! - `slots`: fixed-capacity player slots (spawn position and colour)
//! - `replicator`: network id allocation and the outbox of replication events
//! - `session`: roster and level lifecycle, including mid-session level swaps
//! - `physics`: movement constants and box contact resolution
//! - `game`: the per-tick simulation over the host world
//! - `client_manager`: connected peers, input buffering and timeouts
//! - `room`: room code generation and matching
//! - `network`: UDP transport tasks and the main tick loop
//!
//! ## Tick Ordering
//!
//! Within one tick the host applies buffered inputs, runs the simulation,
//! broadcasts the replication events the tick produced and finally broadcasts
//! the world snapshot. A joining peer is sent creation events for every
//! networked entity and a snapshot before its own player is spawned.
//!
//! ```rust,no_run
//! use host::network::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         tick_duration: Duration::from_millis(16),
//!         max_clients: 8,
//!         room_code: host::room::generate_room_code(),
//!     })
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod physics;
pub mod replicator;
pub mod room;
pub mod session;
pub mod slots;
