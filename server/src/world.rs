use log::{debug, info};
use shared::{
    NetworkId, ParticipantId, PawnInput, PawnKind, PawnState, Transform, FLOOR_Y, GRAVITY,
    JUMP_VELOCITY, PAWN_SIZE, WORLD_WIDTH,
};
use std::collections::HashMap;

/// Authoritative record of a pawn
#[derive(Debug, Clone)]
pub struct PawnRecord {
    pub id: NetworkId,
    pub kind: PawnKind,
    pub transform: Transform,
    pub vel_x: f32,
    pub vel_y: f32,
    pub on_ground: bool,
    /// Agent currently possessing this pawn
    pub controller: Option<NetworkId>,
    /// Input received since the last tick
    pub input: PawnInput,
}

impl PawnRecord {
    fn new(id: NetworkId, kind: PawnKind, transform: Transform) -> Self {
        Self {
            id,
            kind,
            transform,
            vel_x: 0.0,
            vel_y: 0.0,
            on_ground: true,
            controller: None,
            input: PawnInput::default(),
        }
    }

    /// Drops the controller along with any input it left behind
    pub fn release(&mut self) {
        self.controller = None;
        self.input = PawnInput::default();
    }

    fn falls(&self) -> bool {
        matches!(self.kind, PawnKind::Character | PawnKind::Vehicle)
    }
}

/// Authoritative record of an agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub id: NetworkId,
    pub owner: ParticipantId,
    pub pawn: Option<NetworkId>,
}

#[derive(Debug, Clone)]
pub struct World {
    pub tick: u32,
    pub pawns: HashMap<NetworkId, PawnRecord>,
    pub agents: HashMap<NetworkId, AgentRecord>,
    next_id: u32,
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            pawns: HashMap::new(),
            agents: HashMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> NetworkId {
        let id = NetworkId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn spawn_pawn(&mut self, kind: PawnKind, transform: Transform) -> NetworkId {
        let id = self.allocate_id();
        info!(
            "Spawned {} pawn {} at ({}, {})",
            kind, id, transform.x, transform.y
        );
        self.pawns.insert(id, PawnRecord::new(id, kind, transform));
        id
    }

    pub fn despawn_pawn(&mut self, id: NetworkId) -> Option<PawnRecord> {
        let removed = self.pawns.remove(&id);
        if removed.is_some() {
            info!("Despawned pawn {}", id);
        }
        removed
    }

    pub fn spawn_agent(&mut self, owner: ParticipantId) -> NetworkId {
        let id = self.allocate_id();
        info!("Registered agent {} for participant {}", id, owner);
        self.agents.insert(
            id,
            AgentRecord {
                id,
                owner,
                pawn: None,
            },
        );
        id
    }

    pub fn despawn_agent(&mut self, id: NetworkId) -> Option<AgentRecord> {
        self.agents.remove(&id)
    }

    /// The agent registered for `participant`, if any
    pub fn agent_of(&self, participant: ParticipantId) -> Option<NetworkId> {
        self.agents
            .values()
            .find(|agent| agent.owner == participant)
            .map(|agent| agent.id)
    }

    /// Queues an input sample for the next tick
    pub fn apply_input(&mut self, pawn: NetworkId, input: &PawnInput) -> bool {
        match self.pawns.get_mut(&pawn) {
            Some(record) => {
                record.input.merge(input);
                true
            }
            None => false,
        }
    }

    /// Consumes pending input and advances every pawn by `dt`
    pub fn update_physics(&mut self, dt: f32) {
        for pawn in self.pawns.values_mut() {
            let input = pawn.input;

            pawn.vel_x = input.move_x.clamp(-1.0, 1.0) * pawn.kind.move_speed();
            pawn.transform.yaw = (pawn.transform.yaw + input.look_x).rem_euclid(360.0);

            if input.jump && pawn.on_ground && pawn.kind.can_jump() {
                pawn.vel_y = JUMP_VELOCITY;
                pawn.on_ground = false;
            }
            if input.primary {
                debug!("Pawn {} fired its primary action", pawn.id);
            }
            pawn.input.consume();

            if pawn.falls() && !pawn.on_ground {
                pawn.vel_y += GRAVITY * dt;
            }

            pawn.transform.x += pawn.vel_x * dt;
            pawn.transform.y += pawn.vel_y * dt;

            pawn.transform.x = pawn.transform.x.clamp(0.0, WORLD_WIDTH - PAWN_SIZE);

            if pawn.transform.y + PAWN_SIZE >= FLOOR_Y {
                pawn.transform.y = FLOOR_Y - PAWN_SIZE;
                pawn.vel_y = 0.0;
                pawn.on_ground = true;
            }

            if pawn.transform.y <= 0.0 {
                pawn.transform.y = 0.0;
                pawn.vel_y = 0.0;
            }
        }
    }

    pub fn pawn_states(&self) -> Vec<PawnState> {
        let mut states: Vec<PawnState> = self
            .pawns
            .values()
            .map(|pawn| PawnState {
                pawn: pawn.id,
                transform: pawn.transform,
            })
            .collect();
        states.sort_by_key(|state| state.pawn);
        states
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
