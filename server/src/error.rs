//! Session-level error types covering admission, relay, and transport faults

use shared::{PacketError, SettingsError};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Everything that can end a session abnormally.
///
/// Any of these terminates the current session attempt only; the binary logs
/// the failure and loops to await the next session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A handshake arrived after all declared slots were taken.
    #[error("session is full: all {0} player slots are taken")]
    SessionFull(usize),

    /// A packet or lookup referenced a player id outside `0..N`.
    #[error("unknown player id {0}")]
    UnknownPlayer(u8),

    /// The first handshake carried an unusable max-player field.
    #[error("invalid session settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    /// A registered peer's connection dropped mid-session.
    #[error("connection to player at {0} was lost")]
    ConnectionLost(SocketAddr),

    /// No message arrived within the configured bound while a session was in
    /// progress; a straggling or hung client must not stall the relay forever.
    #[error("no message received within {0:?}")]
    ReceiveTimeout(Duration),

    /// Two packets targeted the same slot within one tick.
    #[error("duplicate packet for player {player_id} in tick {tick}")]
    DuplicateSlot { player_id: u8, tick: u64 },

    /// A message body could not be parsed as an action packet.
    #[error("malformed action packet: {0}")]
    MalformedPacket(#[from] PacketError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
