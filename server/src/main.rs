use clap::Parser;
use log::info;
use server::config::{PropSpec, ServerConfig};
use server::network::Server;
use shared::{PawnKind, Transform};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected participants
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Spawn point as x,y or x,y,yaw (repeatable, used round robin)
    #[arg(long = "spawn-point")]
    spawn_points: Vec<Transform>,

    /// Kind of pawn spawned for each participant
    #[arg(long, default_value = "character")]
    pawn_kind: PawnKind,

    /// Keep a participant's pawn when they leave so it can be resumed
    #[arg(long)]
    keep_pawns: bool,

    /// Uncontrolled pawn placed at startup, as kind@x,y (repeatable)
    #[arg(long = "prop")]
    props: Vec<PropSpec>,
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
        host: args.host,
        port: args.port,
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients,
        spawn_points: args.spawn_points,
        pawn_kind: args.pawn_kind,
        destroy_on_disconnect: !args.keep_pawns,
        props: args.props,
        ..Default::default()
    };

    info!("Starting server on {}", config.bind_addr());
    info!(
        "Tick rate: {}Hz, max participants: {}, {} spawn points",
        tick_rate,
        config.max_clients,
        config.spawn_points.len()
    );

    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
