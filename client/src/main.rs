use clap::Parser;
use client::game::ClientWorld;
use client::network::{Client, Transport};
use log::{error, info};
use macroquad::window::Conf;
use std::net::SocketAddr;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Scene reported to the server once connected
    #[arg(long, default_value = "arena")]
    scene: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Possession Client".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    if let Err(e) = run().await {
        error!("Client error: {}", e);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    info!("Starting client...");
    info!("Connecting to: {}", server_addr);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: A/D/W/S to move, Q/E to look, Space to jump, F to fire");
    info!("Press Tab to cycle pawns, Backspace to release, R to reconnect");

    // macroquad owns the main thread, the socket lives on a tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let transport = runtime.block_on(Transport::bind(server_addr, args.fake_ping, out_rx, in_tx))?;
    runtime.spawn(transport.run());

    let world = ClientWorld::new(&args.scene, out_tx);
    let mut client = Client::new(world, in_rx, args.fake_ping, args.width, args.height)?;

    client.run().await?;

    Ok(())
}
