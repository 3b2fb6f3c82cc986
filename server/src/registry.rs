//! Connection registry mapping peer addresses to dense player slots
//!
//! Player ids are a permutation of `0..N-1` where N is the declared
//! max-player count: the first address to hand in a handshake gets slot 0,
//! the next slot 1, and so on. Ids are stable for the session's lifetime and
//! the whole registry is discarded once the session terminates.

use crate::error::SessionError;
use log::info;
use std::net::SocketAddr;

/// Arrival-ordered address-to-slot table for one session.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Registered peer addresses; the index is the player id.
    slots: Vec<SocketAddr>,
    /// Declared max-player count for the session.
    max_players: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry sized to the declared player count.
    pub fn new(max_players: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_players),
            max_players,
        }
    }

    /// Assigns the next sequential player id to a previously-unseen address.
    ///
    /// A repeated address gets its existing id back (a client may resend its
    /// handshake); a new address once all slots are taken is refused with
    /// `SessionFull`.
    pub fn register(&mut self, addr: SocketAddr) -> Result<u8, SessionError> {
        if let Some(existing) = self.slots.iter().position(|&a| a == addr) {
            return Ok(existing as u8);
        }

        if self.slots.len() >= self.max_players {
            return Err(SessionError::SessionFull(self.max_players));
        }

        let player_id = self.slots.len() as u8;
        self.slots.push(addr);
        info!(
            "Player {} registered from {} ({}/{})",
            player_id,
            addr,
            self.slots.len(),
            self.max_players
        );

        Ok(player_id)
    }

    /// Looks up the address a player id was assigned to, for directed sends.
    pub fn resolve(&self, player_id: u8) -> Result<SocketAddr, SessionError> {
        self.slots
            .get(player_id as usize)
            .copied()
            .ok_or(SessionError::UnknownPlayer(player_id))
    }

    /// True if the address belongs to a registered player.
    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.slots.contains(&addr)
    }

    /// Iterates `(player_id, addr)` pairs in ascending id order.
    pub fn players(&self) -> impl Iterator<Item = (u8, SocketAddr)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(id, &addr)| (id as u8, addr))
    }

    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// True once every declared slot has a connection.
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = ConnectionRegistry::new(3);

        assert_eq!(registry.register(addr(5000)).unwrap(), 0);
        assert_eq!(registry.register(addr(5001)).unwrap(), 1);
        assert_eq!(registry.register(addr(5002)).unwrap(), 2);
        assert!(registry.is_full());
    }

    #[test]
    fn test_register_repeat_address_keeps_id() {
        let mut registry = ConnectionRegistry::new(2);

        assert_eq!(registry.register(addr(5000)).unwrap(), 0);
        assert_eq!(registry.register(addr(5001)).unwrap(), 1);
        assert_eq!(registry.register(addr(5000)).unwrap(), 0);
        assert_eq!(registry.player_count(), 2);
    }

    #[test]
    fn test_register_full_session_rejected() {
        let mut registry = ConnectionRegistry::new(2);

        registry.register(addr(5000)).unwrap();
        registry.register(addr(5001)).unwrap();

        match registry.register(addr(5002)) {
            Err(SessionError::SessionFull(2)) => {}
            other => panic!("Expected SessionFull, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_known_player() {
        let mut registry = ConnectionRegistry::new(2);
        registry.register(addr(6000)).unwrap();

        assert_eq!(registry.resolve(0).unwrap(), addr(6000));
    }

    #[test]
    fn test_resolve_unknown_player() {
        let registry = ConnectionRegistry::new(2);

        match registry.resolve(0) {
            Err(SessionError::UnknownPlayer(0)) => {}
            other => panic!("Expected UnknownPlayer, got {:?}", other),
        }
    }

    #[test]
    fn test_players_iterates_in_id_order() {
        let mut registry = ConnectionRegistry::new(3);
        registry.register(addr(7000)).unwrap();
        registry.register(addr(7001)).unwrap();
        registry.register(addr(7002)).unwrap();

        let players: Vec<(u8, SocketAddr)> = registry.players().collect();
        assert_eq!(
            players,
            vec![(0, addr(7000)), (1, addr(7001)), (2, addr(7002))]
        );
    }

    #[test]
    fn test_contains() {
        let mut registry = ConnectionRegistry::new(2);
        registry.register(addr(8000)).unwrap();

        assert!(registry.contains(addr(8000)));
        assert!(!registry.contains(addr(8001)));
    }
}
