//! Top-level session state machine
//!
//! One `SessionCoordinator` drives exactly one game session from WAITING to
//! TERMINATED: it admits players until the declared count is reached, sends
//! each one the settings blob with its assigned id, then relays ticks until a
//! quit flag is observed or something goes off-protocol. Sessions run
//! strictly sequentially over the same transport; the binary just calls
//! `run()` in a loop.

use crate::aggregator::TickAggregator;
use crate::error::SessionError;
use crate::network::{RelayTransport, TransportEvent};
use crate::recorder::DemoRecorder;
use crate::registry::ConnectionRegistry;
use log::{debug, info, warn};
use shared::ActionPacket;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle states of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Started,
    Relaying,
    Terminated,
}

/// Tunables shared by every session the relay runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on any wait once a session is underway. The idle wait for a new
    /// session's first handshake is deliberately unbounded.
    pub receive_timeout: Duration,
    /// Directory demo recordings are written to.
    pub demo_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(30),
            demo_dir: PathBuf::from("."),
        }
    }
}

/// Summary of a session that reached TERMINATED normally.
#[derive(Debug)]
pub struct SessionOutcome {
    pub players: usize,
    pub ticks: u64,
    pub demo_path: PathBuf,
}

/// Drives one session over a borrowed transport.
pub struct SessionCoordinator<'a> {
    transport: &'a mut RelayTransport,
    config: SessionConfig,
    state: SessionState,
}

impl<'a> SessionCoordinator<'a> {
    pub fn new(transport: &'a mut RelayTransport, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Waiting,
        }
    }

    /// Current lifecycle state, mostly useful for logging and tests.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion. Whatever happens, the session ends in
    /// TERMINATED and every connection it admitted is discarded.
    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        let result = self.drive().await;
        self.state = SessionState::Terminated;
        self.transport.disconnect_all().await;
        result
    }

    async fn drive(&mut self) -> Result<SessionOutcome, SessionError> {
        let (settings, registry) = self.wait_for_players().await?;

        self.state = SessionState::Started;
        self.distribute_settings(&settings, &registry).await?;

        self.state = SessionState::Relaying;
        self.relay(&registry).await
    }

    /// WAITING: the first handshake declares the player count, every
    /// handshake registers its sender, and the phase ends once the registry
    /// holds one connection per declared slot.
    async fn wait_for_players(
        &mut self,
    ) -> Result<(Vec<u8>, ConnectionRegistry), SessionError> {
        let (first_addr, settings) = loop {
            match self.transport.recv().await? {
                TransportEvent::Message { addr, payload } => break (addr, payload),
                TransportEvent::Disconnected { addr } => {
                    debug!("Ignoring disconnect from {} before session start", addr);
                }
            }
        };

        let max_players = shared::parse_max_players(&settings)?;
        info!("Max players in game: {}", max_players);

        let mut registry = ConnectionRegistry::new(max_players);
        registry.register(first_addr)?;

        while !registry.is_full() {
            match self
                .transport
                .recv_timeout(self.config.receive_timeout)
                .await?
            {
                TransportEvent::Message { addr, .. } => {
                    // Later handshakes matter only for admission; the settings
                    // blob stays the first player's, forwarded verbatim.
                    registry.register(addr)?;
                }
                TransportEvent::Disconnected { addr } => {
                    if registry.contains(addr) {
                        return Err(SessionError::ConnectionLost(addr));
                    }
                    debug!("Ignoring disconnect from unregistered peer {}", addr);
                }
            }
        }

        Ok((settings, registry))
    }

    /// STARTED: each player receives the original settings bytes plus its own
    /// decimal id as a trailing line, in player-id order.
    async fn distribute_settings(
        &mut self,
        settings: &[u8],
        registry: &ConnectionRegistry,
    ) -> Result<(), SessionError> {
        for (player_id, addr) in registry.players() {
            let mut payload = settings.to_vec();
            payload.push(b'\n');
            payload.extend_from_slice(player_id.to_string().as_bytes());
            self.transport.send_to(addr, payload).await?;
            debug!("Sent settings to player {} at {}", player_id, addr);
        }

        info!(
            "Settings distributed to {} players, relaying",
            registry.player_count()
        );
        Ok(())
    }

    /// RELAYING: ticks are recorded and rebroadcast until a quit flag lands.
    async fn relay(
        &mut self,
        registry: &ConnectionRegistry,
    ) -> Result<SessionOutcome, SessionError> {
        let mut recorder = DemoRecorder::create(&self.config.demo_dir).await?;

        match self.run_ticks(registry, &mut recorder).await {
            Ok(ticks) => {
                let demo_path = recorder.finish().await?;
                info!(
                    "Session complete after {} ticks, demo saved to {}",
                    ticks,
                    demo_path.display()
                );
                Ok(SessionOutcome {
                    players: registry.player_count(),
                    ticks,
                    demo_path,
                })
            }
            Err(e) => {
                // Per-tick flushes already made the partial demo a valid
                // prefix; closing it is best effort.
                if let Err(close_err) = recorder.finish().await {
                    warn!("Failed to close partial demo: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn run_ticks(
        &mut self,
        registry: &ConnectionRegistry,
        recorder: &mut DemoRecorder,
    ) -> Result<u64, SessionError> {
        let player_count = registry.player_count();
        let mut tick: u64 = 0;

        loop {
            let mut aggregator = TickAggregator::new(player_count, tick);

            while !aggregator.is_complete() {
                match self
                    .transport
                    .recv_timeout(self.config.receive_timeout)
                    .await?
                {
                    TransportEvent::Message { addr, payload } => {
                        if !registry.contains(addr) {
                            warn!("Dropping message from unregistered peer {}", addr);
                            continue;
                        }

                        let packet = ActionPacket::parse(&payload)?;
                        let control = packet.control();
                        if registry.resolve(control.player_id)? != addr {
                            warn!(
                                "Player {} packet arrived from {}, not its registered address",
                                control.player_id, addr
                            );
                        }

                        debug!(
                            "Tick {}: player {} fire={} quit={}",
                            tick, control.player_id, control.fire, control.quit
                        );
                        aggregator.insert(packet)?;
                    }
                    TransportEvent::Disconnected { addr } => {
                        if registry.contains(addr) {
                            return Err(SessionError::ConnectionLost(addr));
                        }
                    }
                }
            }

            recorder.record_tick(&aggregator.packets()).await?;

            for (player_id, addr) in registry.players() {
                self.transport
                    .send_to(addr, aggregator.broadcast_for(player_id))
                    .await?;
            }

            tick += 1;

            if aggregator.quit_requested() {
                info!("Quit flag seen in tick {}, ending session", tick - 1);
                return Ok(tick);
            }
        }
    }
}
