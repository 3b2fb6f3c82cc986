use clap::Parser;
use log::{error, info};
use server::network::RelayTransport;
use server::session::{SessionConfig, SessionCoordinator};
use std::path::PathBuf;
use std::time::Duration;

/// Relay server for lockstep multiplayer: admits a fixed-size group of
/// clients, then rebroadcasts every player's input each tick and records the
/// whole session to a demo file.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Seconds to wait for a straggling client before failing the session
    #[clap(short = 't', long, default_value_t = 30)]
    receive_timeout: u64,
    /// Directory demo recordings are written to
    #[clap(short, long, default_value = ".")]
    demo_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let mut transport = RelayTransport::bind(&address).await?;
    info!("Relay server listening on {}", transport.local_addr());

    let config = SessionConfig {
        receive_timeout: Duration::from_secs(args.receive_timeout),
        demo_dir: args.demo_dir,
    };

    // Handle shutdown gracefully
    tokio::select! {
        _ = run_sessions(&mut transport, config) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

/// Runs sessions back to back; a failed session never takes the relay down.
async fn run_sessions(transport: &mut RelayTransport, config: SessionConfig) {
    loop {
        match SessionCoordinator::new(transport, config.clone()).run().await {
            Ok(outcome) => info!(
                "Session finished: {} players, {} ticks, demo at {}",
                outcome.players,
                outcome.ticks,
                outcome.demo_path.display()
            ),
            Err(e) => error!("Session failed: {}", e),
        }
    }
}
