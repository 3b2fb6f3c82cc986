//! # Lockstep Relay Server Library
//!
//! This library implements the relay that coordinates a fixed-size group of
//! game clients into a lockstep simulation. The relay is content-agnostic:
//! it never simulates anything, it only guarantees that every simulated tick
//! advances after exactly one 7-byte input packet per player has been
//! collected, recorded, and rebroadcast.
//!
//! ## Session lifecycle
//!
//! A session moves through four states:
//!
//! - **WAITING**: clients connect and send a handshake; the first handshake's
//!   settings blob declares the player count.
//! - **STARTED**: every client receives the settings blob plus its assigned
//!   player id.
//! - **RELAYING**: each tick, one packet per player is collected (a strict
//!   barrier), appended to the demo recording, and every client receives the
//!   other players' packets in ascending player-id order.
//! - **TERMINATED**: reached when any packet carries the quit flag, or when
//!   a protocol violation, disconnect, or timeout fails the session. All
//!   connections are discarded and the relay waits for the next session.
//!
//! ## Module Organization
//!
//! - [`registry`]: arrival-ordered mapping of peer addresses to dense player
//!   slots.
//! - [`session`]: the coordinator state machine driving one session.
//! - [`aggregator`]: the per-tick barrier and personalized broadcast builder.
//! - [`recorder`]: the durable, flush-per-tick demo log.
//! - [`network`]: identity-routed message transport over TCP.
//! - [`error`]: session-level error types.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::RelayTransport;
//! use server::session::{SessionConfig, SessionCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = RelayTransport::bind("0.0.0.0:32456").await?;
//!     let config = SessionConfig::default();
//!
//!     // Sessions run strictly sequentially; a failed session only ends
//!     // that attempt.
//!     loop {
//!         let outcome = SessionCoordinator::new(&mut transport, config.clone())
//!             .run()
//!             .await?;
//!         println!("Relayed {} ticks for {} players", outcome.ticks, outcome.players);
//!     }
//! }
//! ```

pub mod aggregator;
pub mod error;
pub mod network;
pub mod recorder;
pub mod registry;
pub mod session;
