use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, env = "LOBBY_SERVER", default_value = "127.0.0.1:8080")]
    server: String,

    /// Room code printed by the host
    #[arg(short = 'r', long)]
    room_code: String,

    /// Give up joining after this many seconds
    #[arg(short = 't', long, default_value = "5")]
    timeout: u64,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let mut client = Client::new(ClientConfig {
        host: args.server,
        room_code: args.room_code,
        connect_timeout: Duration::from_secs(args.timeout),
        fake_ping_ms: args.fake_ping,
    })
    .await?;

    client.run().await?;

    info!("Client stopped: {:?}", client.status());
    Ok(())
}
