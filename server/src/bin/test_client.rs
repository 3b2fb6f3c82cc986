//! Scripted relay client for manual testing.
//!
//! Connects to a local relay, handshakes, then plays a fixed number of ticks
//! with synthetic inputs, setting the quit flag on the last one. Run one
//! instance per declared player; the relay won't advance a tick until every
//! instance has sent its packet.

use shared::{read_frame, write_frame, ActionPacket, ControlByte, PAYLOAD_LEN};
use tokio::net::TcpStream;

const TICKS_TO_PLAY: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let server_addr = args
        .next()
        .unwrap_or_else(|| format!("127.0.0.1:{}", shared::DEFAULT_PORT));
    let max_players: usize = args.next().as_deref().unwrap_or("2").parse()?;

    let mut stream = TcpStream::connect(&server_addr).await?;
    println!("Connected to relay at {}", server_addr);

    // Handshake: levelname, seed, max players.
    let handshake = format!("testmap.lvl\n1234\n{}", max_players);
    write_frame(&mut stream, handshake.as_bytes()).await?;
    println!("Sent handshake, waiting for the session to fill...");

    let settings = read_frame(&mut stream)
        .await?
        .ok_or("server closed the connection before the session started")?;
    let text = String::from_utf8(settings)?;
    println!("Received settings:\n{}", text);

    let player_id: u8 = text
        .lines()
        .last()
        .ok_or("settings broadcast was empty")?
        .parse()?;
    println!("Assigned player id {}", player_id);

    for tick in 0..TICKS_TO_PLAY {
        let control = ControlByte {
            player_id,
            fire: tick % 3 == 0,
            quit: tick == TICKS_TO_PLAY - 1,
        };
        // Synthetic movement payload; the relay never looks at it.
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = tick as u8;
        payload[1] = player_id;

        let packet = ActionPacket::new(control, payload);
        write_frame(&mut stream, packet.as_bytes()).await?;

        let broadcast = read_frame(&mut stream)
            .await?
            .ok_or("server closed the connection mid-session")?;

        print!("Tick {}: received {} bytes:", tick, broadcast.len());
        for chunk in broadcast.chunks(7) {
            if let Ok(other) = ActionPacket::parse(chunk) {
                let c = other.control();
                print!(" [player {} fire={} quit={}]", c.player_id, c.fire, c.quit);
            }
        }
        println!();
    }

    println!("Test client finished");
    Ok(())
}
