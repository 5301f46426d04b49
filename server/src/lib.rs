//! # Possession Authority
//!
//! The authoritative side of the possession layer. It owns every pawn and
//! agent in the world, decides who controls what, and tells all connected
//! participants about each change so their local agents can follow along.
//!
//! ## Core Responsibilities
//!
//! ### Possession Authority
//! Only the server moves ownership. A possession request from a client is
//! validated against the requesting participant, the agent's owner and the
//! pawn's current controller, then either applied and broadcast or rejected.
//!
//! ### Spawning
//! When a participant finishes loading the scene a pawn is spawned for them
//! at the next spawn point (round robin). If their agent already exists it
//! possesses the pawn right away. Otherwise the pawn is parked as an orphan
//! and a bounded retry loop waits for the agent to show up.
//!
//! ### Late Joiners
//! The last possession notification per agent is buffered and replayed to
//! participants who connect later, together with every pawn and agent.
//!
//! ## Module Organization
//!
//! ### Participants Module (`participants`)
//! - Connection tracking and participant id assignment
//! - Resume of a previous participant id on reconnect
//! - Timeout detection and per-pawn input sequence filtering
//!
//! ### Authority Module (`authority`)
//! - Possess/release validation and broadcast
//! - Orphan retry loop and scene-load spawning
//! - Participant join/leave bookkeeping
//!
//! ### Network Module (`network`)
//! - UDP socket management and packet processing
//! - Sender, receiver and timeout tasks
//! - Main event loop with a fixed tick
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod config;
pub mod network;
pub mod orphans;
pub mod ownership;
pub mod participants;
pub mod spawner;
pub mod world;
