//! Durable demo recording of every relayed tick
//!
//! The demo is a flat binary log: for each completed tick, the N raw 7-byte
//! packets in ascending player-id order, nothing else. After T ticks the file
//! is exactly `T * N * 7` bytes; a consumer only needs the player count to
//! parse it. Each tick is flushed as it is written so a crash mid-session
//! leaves a truncated-but-valid prefix instead of a dangling buffer.

use chrono::Utc;
use log::{debug, info};
use shared::{ActionPacket, PACKET_LEN};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// File extension for recorded sessions.
pub const DEMO_EXTENSION: &str = "rec";

/// Write-only, exclusively-owned recording of one session.
#[derive(Debug)]
pub struct DemoRecorder {
    file: File,
    path: PathBuf,
    bytes_written: u64,
}

impl DemoRecorder {
    /// Creates the demo file in `demo_dir`, named by the session-start UTC
    /// wall clock (`YYYYMMDD-HHMMSS.rec`).
    pub async fn create(demo_dir: &Path) -> io::Result<Self> {
        let name = format!("{}.{}", Utc::now().format("%Y%m%d-%H%M%S"), DEMO_EXTENSION);
        let path = demo_dir.join(name);
        let file = File::create(&path).await?;
        info!("Recording demo to {}", path.display());

        Ok(Self {
            file,
            path,
            bytes_written: 0,
        })
    }

    /// Appends one completed tick (packets already in ascending player-id
    /// order) and flushes it.
    pub async fn record_tick(&mut self, packets: &[ActionPacket]) -> io::Result<()> {
        for packet in packets {
            self.file.write_all(packet.as_bytes()).await?;
        }
        self.file.flush().await?;

        self.bytes_written += (packets.len() * PACKET_LEN) as u64;
        debug!(
            "Recorded tick of {} packets ({} bytes total)",
            packets.len(),
            self.bytes_written
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes and syncs the log, closing it. Called on normal termination;
    /// error paths rely on the per-tick flush plus drop.
    pub async fn finish(mut self) -> io::Result<PathBuf> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.path)
    }
}
