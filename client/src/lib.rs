//! # Platformer client
//!
//! An observer of a host-authoritative session. The client sends sequenced
//! input and applies whatever the host replicates; it never runs game rules
//! of its own.
//!
//! ## Module Organization
//!
//! - `connection`: the join handshake as one cancellable, time-limited
//!   operation, and the connection status it reports
//! - `game`: the replica world. Applies creation events, remote calls and
//!   full snapshots, and rebuilds level geometry from the level index
//! - `input`: key samples to sequenced inputs with change detection
//! - `network`: the UDP loop tying the above together
//!
//! ## Applying Host State
//!
//! Snapshots are full: every networked entity is present in each one. An
//! entity the client has not seen is created from the prefab the snapshot
//! carries, and an entity missing from a snapshot is removed. Snapshots older
//! than the last one applied are dropped, and remote calls are deduplicated
//! by their sequence number.
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(ClientConfig {
//!         host: "127.0.0.1:8080".to_string(),
//!         room_code: "QZKX".to_string(),
//!         connect_timeout: Duration::from_secs(5),
//!         fake_ping_ms: 0,
//!     })
//!     .await?;
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod game;
pub mod input;
pub mod network;
