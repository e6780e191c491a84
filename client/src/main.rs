use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Seed for the generated world and the bot; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Width of a generated world in tiles
    #[arg(short = 'w', long, default_value = "48")]
    width: usize,

    /// Height of a generated world in tiles (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "32")]
    height: usize,

    /// Bot action cadence in milliseconds, 0 disables the bot
    #[arg(short = 'a', long, default_value = "0")]
    action_ms: u64,

    /// How long to wait for an existing world before proposing one
    #[arg(long, default_value = "500")]
    world_wait_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Seed: {}", seed);
    if args.action_ms > 0 {
        info!("Bot acting every {}ms", args.action_ms);
    }

    let config = ClientConfig {
        server_url: args.server,
        seed,
        world_width: args.width,
        world_height: args.height,
        action_interval: (args.action_ms > 0).then(|| Duration::from_millis(args.action_ms)),
        world_wait: Duration::from_millis(args.world_wait_ms),
        ..ClientConfig::default()
    };

    let mut client = Client::new(config).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
