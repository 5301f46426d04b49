//! # Possession Client Library
//!
//! The participant side of the possession layer. A participant keeps a
//! replica of every pawn and agent the authority knows about, lets its own
//! agent possess pawns, and routes local input only to the pawn that agent
//! controls.
//!
//! ## Architecture Overview
//!
//! ### Optimistic Possession
//! When the local agent possesses a pawn it binds input and runs the pawn's
//! start hook immediately, then asks the authority for ownership. The
//! authority's broadcast confirms or overwrites that local guess.
//!
//! ### Input Routing
//! Keyboard samples become transitions on named actions (Move, Look, Jump,
//! Fire). Pawns declare which actions they listen to; the agent's
//! `InputBinder` owns those subscriptions for exactly one possession and
//! releases all of them when control changes hands.
//!
//! ## Module Organization
//!
//! ### Actions Module (`actions`)
//! - Configured action set with started/active/ended transitions
//! - Subscription and trigger plumbing
//!
//! ### Binder Module (`binder`)
//! - Per-possession subscription ownership
//! - Reverse-order, idempotent unbinding
//!
//! ### Pawn Module (`pawn`)
//! - Character, camera rig, vehicle and cutscene camera variants
//! - Possession hooks and cached input bindings
//!
//! ### Agent Module (`agent`)
//! - Idle / Possessing / Possessed state machine
//! - Reconciliation with authoritative broadcasts
//!
//! ### Game Module (`game`)
//! - `ClientWorld` replica driven by authority packets
//! - Input sending for the locally possessed pawn
//!
//! ### Network, Input and Rendering Modules
//! - UDP transport task with optional fake latency
//! - Keyboard sampling with edge detection
//! - macroquad drawing of pawns and possession state
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::ClientWorld;
//! use shared::{NetworkId, Packet, ParticipantId, PawnKind, Transform};
//! use tokio::sync::mpsc;
//!
//! let (rpc, _requests) = mpsc::unbounded_channel();
//! let mut world = ClientWorld::new("arena", rpc).manual_join();
//!
//! world.handle_packet(Packet::Connected { client_id: ParticipantId(1) });
//! world.handle_packet(Packet::PawnSpawned {
//!     pawn: NetworkId(1),
//!     kind: PawnKind::Character,
//!     transform: Transform::default(),
//! });
//! world.handle_packet(Packet::AgentSpawned { agent: NetworkId(2), owner: ParticipantId(1) });
//! world.handle_packet(Packet::PossessionChanged {
//!     agent: NetworkId(2),
//!     pawn: Some(NetworkId(1)),
//! });
//!
//! assert_eq!(world.local_agent().unwrap().pawn(), Some(NetworkId(1)));
//! ```

pub mod actions;
pub mod agent;
pub mod binder;
pub mod game;
pub mod input;
pub mod network;
pub mod pawn;
pub mod rendering;
