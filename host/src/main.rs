use clap::Parser;
use host::network::{Server, ServerConfig};
use host::room::generate_room_code;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the host socket to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum simultaneous connections
    #[arg(short = 'm', long, default_value = "8")]
    max_clients: usize,

    /// Room code peers must present; generated when omitted
    #[arg(short, long)]
    room_code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients,
        room_code: args.room_code.unwrap_or_else(generate_room_code),
    };

    info!("Starting host at {} Hz", tick_rate);
    let mut server = Server::new(config).await?;

    println!("Room code: {}", server.room_code());
    println!("Type a level number and press enter to switch levels");

    server.run().await?;

    Ok(())
}
