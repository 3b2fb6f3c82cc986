//! Protocol types shared between the relay server and client tooling
//!
//! Everything on the wire is byte-exact: a 7-byte action packet with a packed
//! control byte, an ASCII handshake blob, and a length-prefixed frame codec
//! used for every TCP message.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 32456;

/// Total length of an action packet: control byte + payload.
pub const PACKET_LEN: usize = 7;
/// Opaque per-tick payload carried after the control byte.
pub const PAYLOAD_LEN: usize = 6;

/// A lockstep game needs at least two participants.
pub const MIN_PLAYERS: usize = 2;
/// The control byte has six id bits, so ids above 63 cannot exist on the wire.
pub const MAX_PLAYERS: usize = 64;

/// Upper bound on a single frame's payload, to keep a misbehaving peer from
/// forcing an arbitrarily large allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// 0-based index of the max-player field in the newline-separated handshake.
pub const SETTINGS_PLAYERS_FIELD: usize = 2;

const PLAYER_ID_MASK: u8 = 0x3F;
const FIRE_FLAG: u8 = 0x40;
const QUIT_FLAG: u8 = 0x80;

/// Errors produced when parsing raw bytes into an [`ActionPacket`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("action packet is {0} bytes, expected exactly {PACKET_LEN}")]
    WrongLength(usize),
}

/// Errors produced when validating the handshake settings blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings blob is not valid ASCII text")]
    NotText,
    #[error("settings blob has no field at index {SETTINGS_PLAYERS_FIELD}")]
    MissingPlayerField,
    #[error("max-player field {0:?} is not a number")]
    NotANumber(String),
    #[error("cannot start a game with less than {MIN_PLAYERS} players (got {0})")]
    TooFewPlayers(usize),
    #[error("declared player count {0} exceeds the protocol limit of {MAX_PLAYERS}")]
    TooManyPlayers(usize),
}

/// The packed first byte of every action packet.
///
/// Bits 0-5 carry the player id, bit 6 the fire flag, bit 7 the quit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlByte {
    pub player_id: u8,
    pub fire: bool,
    pub quit: bool,
}

impl ControlByte {
    /// Unpacks a raw control byte. Never fails: six bits of id plus two
    /// flags cover the whole byte.
    pub fn decode(byte: u8) -> Self {
        Self {
            player_id: byte & PLAYER_ID_MASK,
            fire: byte & FIRE_FLAG != 0,
            quit: byte & QUIT_FLAG != 0,
        }
    }

    /// Packs the fields back into a single byte.
    ///
    /// The player id is masked to its six bits; callers are expected to have
    /// validated the range already.
    pub fn encode(&self) -> u8 {
        let mut byte = self.player_id & PLAYER_ID_MASK;
        if self.fire {
            byte |= FIRE_FLAG;
        }
        if self.quit {
            byte |= QUIT_FLAG;
        }
        byte
    }
}

/// A fixed-layout 7-byte per-tick input packet.
///
/// The relay only ever interprets the control byte; the remaining six bytes
/// are opaque payload relayed and recorded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPacket {
    bytes: [u8; PACKET_LEN],
}

impl ActionPacket {
    /// Builds a packet from a control byte and payload, used by client
    /// tooling and tests.
    pub fn new(control: ControlByte, payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[0] = control.encode();
        bytes[1..].copy_from_slice(&payload);
        Self { bytes }
    }

    /// Parses a raw message body into a packet, rejecting any length other
    /// than exactly [`PACKET_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() != PACKET_LEN {
            return Err(PacketError::WrongLength(bytes.len()));
        }
        let mut packet = [0u8; PACKET_LEN];
        packet.copy_from_slice(bytes);
        Ok(Self { bytes: packet })
    }

    pub fn control(&self) -> ControlByte {
        ControlByte::decode(self.bytes[0])
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.bytes
    }
}

/// Extracts and validates the declared max-player count from the handshake
/// settings blob (newline-separated ASCII; the original client sends
/// `levelname\nseed\nmaxplayers`).
pub fn parse_max_players(settings: &[u8]) -> Result<usize, SettingsError> {
    let text = std::str::from_utf8(settings).map_err(|_| SettingsError::NotText)?;
    let field = text
        .split('\n')
        .nth(SETTINGS_PLAYERS_FIELD)
        .ok_or(SettingsError::MissingPlayerField)?;
    let count: usize = field
        .trim()
        .parse()
        .map_err(|_| SettingsError::NotANumber(field.to_string()))?;
    if count < MIN_PLAYERS {
        return Err(SettingsError::TooFewPlayers(count));
    }
    if count > MAX_PLAYERS {
        return Err(SettingsError::TooManyPlayers(count));
    }
    Ok(count)
}

/// Reads one length-prefixed frame. Returns `Ok(None)` on a clean EOF at a
/// frame boundary; a connection cut mid-frame surfaces as `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes one length-prefixed frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("refusing to send a {} byte frame", payload.len()),
        ));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_byte_decode_quit() {
        let control = ControlByte::decode(0b1000_0010);
        assert_eq!(control.player_id, 2);
        assert!(!control.fire);
        assert!(control.quit);
    }

    #[test]
    fn test_control_byte_decode_fire() {
        let control = ControlByte::decode(0b0100_0101);
        assert_eq!(control.player_id, 5);
        assert!(control.fire);
        assert!(!control.quit);
    }

    #[test]
    fn test_control_byte_decode_plain() {
        let control = ControlByte::decode(0b0011_1111);
        assert_eq!(control.player_id, 63);
        assert!(!control.fire);
        assert!(!control.quit);
    }

    #[test]
    fn test_control_byte_encode_roundtrip() {
        for byte in 0..=u8::MAX {
            assert_eq!(ControlByte::decode(byte).encode(), byte);
        }
    }

    #[test]
    fn test_control_byte_encode_masks_id() {
        let control = ControlByte {
            player_id: 64,
            fire: false,
            quit: false,
        };
        assert_eq!(control.encode(), 0);
    }

    #[test]
    fn test_packet_parse_valid() {
        let bytes = [0b0100_0001, 1, 2, 3, 4, 5, 6];
        let packet = ActionPacket::parse(&bytes).unwrap();
        assert_eq!(packet.control().player_id, 1);
        assert!(packet.control().fire);
        assert_eq!(packet.payload(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(packet.as_bytes(), &bytes);
    }

    #[test]
    fn test_packet_parse_too_short() {
        let result = ActionPacket::parse(&[0x00, 1, 2]);
        assert_eq!(result, Err(PacketError::WrongLength(3)));
    }

    #[test]
    fn test_packet_parse_too_long() {
        let result = ActionPacket::parse(&[0u8; 8]);
        assert_eq!(result, Err(PacketError::WrongLength(8)));
    }

    #[test]
    fn test_packet_new_matches_parse() {
        let control = ControlByte {
            player_id: 3,
            fire: true,
            quit: true,
        };
        let packet = ActionPacket::new(control, [9, 8, 7, 6, 5, 4]);
        assert_eq!(packet.control(), control);
        assert_eq!(ActionPacket::parse(packet.as_bytes()).unwrap(), packet);
    }

    #[test]
    fn test_parse_max_players_valid() {
        let settings = b"dungeon.lvl\n12345\n4";
        assert_eq!(parse_max_players(settings), Ok(4));
    }

    #[test]
    fn test_parse_max_players_trailing_fields() {
        let settings = b"dungeon.lvl\n12345\n8\nextra";
        assert_eq!(parse_max_players(settings), Ok(8));
    }

    #[test]
    fn test_parse_max_players_too_few() {
        let settings = b"dungeon.lvl\n12345\n1";
        assert_eq!(parse_max_players(settings), Err(SettingsError::TooFewPlayers(1)));
    }

    #[test]
    fn test_parse_max_players_not_a_number() {
        let settings = b"dungeon.lvl\n12345\nabc";
        assert_eq!(
            parse_max_players(settings),
            Err(SettingsError::NotANumber("abc".to_string()))
        );
    }

    #[test]
    fn test_parse_max_players_missing_field() {
        let settings = b"dungeon.lvl";
        assert_eq!(parse_max_players(settings), Err(SettingsError::MissingPlayerField));
    }

    #[test]
    fn test_parse_max_players_over_limit() {
        let settings = b"dungeon.lvl\n12345\n65";
        assert_eq!(parse_max_players(settings), Err(SettingsError::TooManyPlayers(65)));
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_frame(&mut client, b"hello relay").await.unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"hello relay"[..]));
    }

    #[tokio::test]
    async fn test_frame_empty_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, b"").await.unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_frame_clean_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame, None);
    }

    #[tokio::test]
    async fn test_frame_truncated_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);

        // Announce 10 bytes but deliver only 4 before hanging up.
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"oops").await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_frame_oversized_length_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client
            .write_all(&((MAX_FRAME_LEN as u32 + 1).to_be_bytes()))
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_frame_multiple_in_sequence() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"second").await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(&b"second"[..]));
    }
}
