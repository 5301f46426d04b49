use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;

pub use error::ParseError;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 2048;

pub const GRAVITY: f32 = 980.0;
pub const JUMP_VELOCITY: f32 = -400.0;
pub const FLOOR_Y: f32 = 550.0;
pub const WORLD_WIDTH: f32 = 800.0;
pub const PAWN_SIZE: f32 = 32.0;

/// Attempts made to hand an orphaned pawn to its agent before giving up.
pub const ORPHAN_RETRY_ATTEMPTS: u32 = 10;
pub const ORPHAN_RETRY_INTERVAL_MS: u64 = 100;

pub const ACTION_MOVE: &str = "Move";
pub const ACTION_LOOK: &str = "Look";
pub const ACTION_JUMP: &str = "Jump";
pub const ACTION_FIRE: &str = "Fire";

/// Identifier of a connected participant, issued by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Identity of a replicated object. Agents and pawns share one id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl Transform {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, yaw: 0.0 }
    }

    /// Resting position on the floor at the given horizontal offset
    pub fn on_floor(x: f32) -> Self {
        Self::new(x, FLOOR_Y - PAWN_SIZE)
    }
}

/// Parses `x,y` or `x,y,yaw`
impl FromStr for Transform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(ParseError::Transform(s.to_string()));
        }

        let mut values = [0.0f32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ParseError::Transform(s.to_string()))?;
        }

        Ok(Transform {
            x: values[0],
            y: values[1],
            yaw: values[2],
        })
    }
}

/// The concrete kinds of controllable entity the game knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PawnKind {
    Character,
    CameraRig,
    Vehicle,
    CutsceneCamera,
}

impl PawnKind {
    /// Horizontal speed applied to a full move input, in units per second
    pub fn move_speed(&self) -> f32 {
        match self {
            PawnKind::Character => 300.0,
            PawnKind::Vehicle => 450.0,
            PawnKind::CameraRig => 200.0,
            PawnKind::CutsceneCamera => 0.0,
        }
    }

    pub fn can_jump(&self) -> bool {
        matches!(self, PawnKind::Character)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PawnKind::Character => "character",
            PawnKind::CameraRig => "camera",
            PawnKind::Vehicle => "vehicle",
            PawnKind::CutsceneCamera => "cutscene",
        }
    }
}

impl fmt::Display for PawnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PawnKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" => Ok(PawnKind::Character),
            "camera" | "camera-rig" => Ok(PawnKind::CameraRig),
            "vehicle" => Ok(PawnKind::Vehicle),
            "cutscene" | "cutscene-camera" => Ok(PawnKind::CutsceneCamera),
            other => Err(ParseError::PawnKind(other.to_string())),
        }
    }
}

/// Synchronized input fields of a pawn, written by its controlling
/// participant and consumed by the authority.
///
/// `jump` and `primary` are edges: they stay set until the authority
/// consumes them in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PawnInput {
    pub move_x: f32,
    pub move_y: f32,
    pub look_x: f32,
    pub look_y: f32,
    pub jump: bool,
    pub primary: bool,
}

impl PawnInput {
    /// Folds a newer sample into this one, keeping unconsumed edges
    pub fn merge(&mut self, newer: &PawnInput) {
        self.move_x = newer.move_x;
        self.move_y = newer.move_y;
        self.look_x += newer.look_x;
        self.look_y += newer.look_y;
        self.jump |= newer.jump;
        self.primary |= newer.primary;
    }

    /// Clears the edge flags and accumulated look delta
    pub fn consume(&mut self) {
        self.look_x = 0.0;
        self.look_y = 0.0;
        self.jump = false;
        self.primary = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PawnState {
    pub pawn: NetworkId,
    pub transform: Transform,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        resume: Option<ParticipantId>,
    },
    RegisterAgent,
    SceneLoaded {
        scene: String,
    },
    RequestPossess {
        agent: NetworkId,
        pawn: NetworkId,
    },
    RequestRelease {
        agent: NetworkId,
        pawn: NetworkId,
    },
    PawnInput {
        pawn: NetworkId,
        sequence: u32,
        input: PawnInput,
    },
    /// Keeps a participant from timing out while it has no input to send
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ParticipantId,
    },
    AgentSpawned {
        agent: NetworkId,
        owner: ParticipantId,
    },
    AgentDespawned {
        agent: NetworkId,
    },
    PawnSpawned {
        pawn: NetworkId,
        kind: PawnKind,
        transform: Transform,
    },
    PawnDespawned {
        pawn: NetworkId,
    },
    PossessionChanged {
        agent: NetworkId,
        pawn: Option<NetworkId>,
    },
    PossessionRejected {
        agent: NetworkId,
        pawn: NetworkId,
        reason: String,
    },
    WorldState {
        tick: u32,
        pawns: Vec<PawnState>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// True for packets that only the authority may send
    pub fn is_from_authority(&self) -> bool {
        matches!(
            self,
            Packet::Connected { .. }
                | Packet::AgentSpawned { .. }
                | Packet::AgentDespawned { .. }
                | Packet::PawnSpawned { .. }
                | Packet::PawnDespawned { .. }
                | Packet::PossessionChanged { .. }
                | Packet::PossessionRejected { .. }
                | Packet::WorldState { .. }
                | Packet::Disconnected { .. }
        )
    }
}
