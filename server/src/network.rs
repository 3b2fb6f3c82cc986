//! Identity-routed message transport over TCP
//!
//! The relay treats the transport as a stream of address-tagged envelopes:
//! each accepted connection gets a reader task that decodes length-prefixed
//! frames and feeds them, tagged with the peer address, into a single bounded
//! event channel. The session coordinator is the only consumer of that
//! channel, which is what enforces the tick barrier: no broadcast for tick
//! `t` can be queued until every receive contributing to tick `t` has been
//! consumed. Outbound messages are directed by peer address through a
//! per-connection writer task.

use crate::error::SessionError;
use log::{debug, error, info, warn};
use shared::{read_frame, write_frame};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Inbound events, one per received frame or lost connection.
#[derive(Debug)]
pub enum TransportEvent {
    Message { addr: SocketAddr, payload: Vec<u8> },
    Disconnected { addr: SocketAddr },
}

/// Per-connection handles: the outbound queue and the reader task.
struct Peer {
    send_tx: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
}

type PeerMap = Arc<Mutex<HashMap<SocketAddr, Peer>>>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const PEER_SEND_CAPACITY: usize = 64;

/// Message-oriented transport shared by all sequential sessions.
pub struct RelayTransport {
    local_addr: SocketAddr,
    events: mpsc::Receiver<TransportEvent>,
    peers: PeerMap,
}

impl RelayTransport {
    /// Binds the listener and spawns the accept loop.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));

        let accept_peers = Arc::clone(&peers);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                        }
                        spawn_peer_tasks(
                            stream,
                            peer_addr,
                            event_tx.clone(),
                            Arc::clone(&accept_peers),
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            events,
            peers,
        })
    }

    /// The bound listener address (useful when binding to port 0 in tests).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next inbound event with no time bound. Used only while
    /// idling for a brand-new session's first handshake.
    pub async fn recv(&mut self) -> Result<TransportEvent, SessionError> {
        self.events.recv().await.ok_or_else(channel_closed)
    }

    /// Waits for the next inbound event, failing with `ReceiveTimeout` if a
    /// straggling peer keeps the relay waiting past the bound.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<TransportEvent, SessionError> {
        match tokio::time::timeout(timeout, self.events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(channel_closed()),
            Err(_) => Err(SessionError::ReceiveTimeout(timeout)),
        }
    }

    /// Queues a payload for one peer, identified by its address token.
    pub async fn send_to(&self, addr: SocketAddr, payload: Vec<u8>) -> Result<(), SessionError> {
        let sender = {
            let peers = self.peers.lock().await;
            peers
                .get(&addr)
                .map(|peer| peer.send_tx.clone())
                .ok_or(SessionError::ConnectionLost(addr))?
        };

        sender
            .send(payload)
            .await
            .map_err(|_| SessionError::ConnectionLost(addr))
    }

    /// Drops every current connection and discards queued stale events.
    /// Called when a session terminates; connections are never reused.
    pub async fn disconnect_all(&mut self) {
        let mut peers = self.peers.lock().await;
        let count = peers.len();
        for (_, peer) in peers.drain() {
            // Dropping send_tx ends the writer task; aborting the reader
            // releases the socket's read half so the peer sees a full close.
            peer.reader.abort();
        }
        drop(peers);

        while self.events.try_recv().is_ok() {}

        if count > 0 {
            info!("Dropped {} session connections", count);
        }
    }
}

fn channel_closed() -> SessionError {
    SessionError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "transport event channel closed",
    ))
}

/// Registers a new peer and spawns its reader and writer tasks.
async fn spawn_peer_tasks(
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::Sender<TransportEvent>,
    peers: PeerMap,
) {
    let (read_half, write_half) = stream.into_split();
    let (send_tx, send_rx) = mpsc::channel::<Vec<u8>>(PEER_SEND_CAPACITY);

    // Hold the map lock across reader spawn and insert, so the peer is
    // addressable before any of its messages can reach the coordinator.
    let mut peers_guard = peers.lock().await;
    tokio::spawn(run_peer_writer(write_half, send_rx, addr));
    let reader = tokio::spawn(run_peer_reader(
        read_half,
        addr,
        event_tx,
        Arc::clone(&peers),
    ));
    peers_guard.insert(addr, Peer { send_tx, reader });
    drop(peers_guard);

    info!("Connection accepted from {}", addr);
}

async fn run_peer_writer(
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    addr: SocketAddr,
) {
    while let Some(payload) = send_rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &payload).await {
            warn!("Failed to send to {}: {}", addr, e);
            break;
        }
    }
}

async fn run_peer_reader(
    mut read_half: OwnedReadHalf,
    addr: SocketAddr,
    event_tx: mpsc::Sender<TransportEvent>,
    peers: PeerMap,
) {
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(payload)) => {
                if event_tx
                    .send(TransportEvent::Message { addr, payload })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => {
                debug!("Peer {} closed the connection", addr);
                break;
            }
            Err(e) => {
                warn!("Error reading from {}: {}", addr, e);
                break;
            }
        }
    }

    peers.lock().await.remove(&addr);
    let _ = event_tx.send(TransportEvent::Disconnected { addr }).await;
}
