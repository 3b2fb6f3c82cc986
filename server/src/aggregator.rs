//! Per-tick input collection and personalized broadcast assembly
//!
//! A tick is a strict barrier: it completes only when every registered player
//! has contributed exactly one packet, slotted by the player id decoded from
//! its control byte. Arrival order across connections is arbitrary; the
//! outbound view is always deterministic because broadcasts and demo records
//! are built in ascending player-id order, never arrival order.

use crate::error::SessionError;
use shared::{ActionPacket, PACKET_LEN};

/// Collects one tick's worth of packets for a fixed player count.
#[derive(Debug)]
pub struct TickAggregator {
    slots: Vec<Option<ActionPacket>>,
    filled: usize,
    quit_seen: bool,
    tick: u64,
}

impl TickAggregator {
    /// Creates an empty aggregator for the given player count; `tick` is only
    /// used to label protocol violations.
    pub fn new(player_count: usize, tick: u64) -> Self {
        Self {
            slots: vec![None; player_count],
            filled: 0,
            quit_seen: false,
            tick,
        }
    }

    /// Slots a packet by its decoded player id.
    ///
    /// Fails fast on an id outside `0..N` or on a second packet targeting an
    /// already-filled slot; either one means a client is off-protocol and the
    /// session cannot stay deterministic.
    pub fn insert(&mut self, packet: ActionPacket) -> Result<(), SessionError> {
        let control = packet.control();
        let slot = self
            .slots
            .get_mut(control.player_id as usize)
            .ok_or(SessionError::UnknownPlayer(control.player_id))?;

        if slot.is_some() {
            return Err(SessionError::DuplicateSlot {
                player_id: control.player_id,
                tick: self.tick,
            });
        }

        *slot = Some(packet);
        self.filled += 1;
        self.quit_seen |= control.quit;
        Ok(())
    }

    /// True once every slot holds a packet.
    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Logical OR of the quit flags seen so far.
    pub fn quit_requested(&self) -> bool {
        self.quit_seen
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// All packets in ascending player-id order, for the demo recorder.
    ///
    /// Panics if the tick is incomplete; callers gate on [`is_complete`].
    ///
    /// [`is_complete`]: TickAggregator::is_complete
    pub fn packets(&self) -> Vec<ActionPacket> {
        self.slots
            .iter()
            .map(|slot| slot.expect("tick must be complete before reading packets"))
            .collect()
    }

    /// Builds the outbound payload for one player: every *other* player's raw
    /// packet concatenated in ascending player-id order.
    ///
    /// Panics if the tick is incomplete; callers gate on [`is_complete`].
    ///
    /// [`is_complete`]: TickAggregator::is_complete
    pub fn broadcast_for(&self, player_id: u8) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.slots.len().saturating_sub(1) * PACKET_LEN);
        for (id, slot) in self.slots.iter().enumerate() {
            if id == player_id as usize {
                continue;
            }
            let packet = slot.expect("tick must be complete before building broadcasts");
            payload.extend_from_slice(packet.as_bytes());
        }
        payload
    }
}
