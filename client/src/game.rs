use crate::actions::ActionSet;
use crate::agent::{Agent, PossessionError};
use crate::pawn::{spawn_pawn, Pawn, PawnEntry, PawnTable};
use log::{debug, error, info, warn};
use shared::{NetworkId, Packet, ParticipantId, PawnKind, Transform, PROTOCOL_VERSION};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Builds the local representation of a replicated pawn
pub type PawnFactory = Box<dyn Fn(NetworkId, PawnKind, Transform) -> Box<dyn Pawn> + Send>;

/// One participant's replica of the possession world
///
/// Every packet from the authority goes through [`ClientWorld::handle_packet`];
/// every request towards it leaves through the `rpc` channel.
pub struct ClientWorld {
    scene: String,
    local: Option<ParticipantId>,
    /// Id to ask for again after a disconnect
    resume: Option<ParticipantId>,
    join_on_connect: bool,
    actions: ActionSet,
    pawns: PawnTable,
    agents: HashMap<NetworkId, Agent>,
    rpc: mpsc::UnboundedSender<Packet>,
    factory: PawnFactory,
    input_sequence: u32,
    pub tick: u32,
}

impl ClientWorld {
    pub fn new(scene: &str, rpc: mpsc::UnboundedSender<Packet>) -> Self {
        Self::with_factory(scene, rpc, Box::new(spawn_pawn))
    }

    pub fn with_factory(
        scene: &str,
        rpc: mpsc::UnboundedSender<Packet>,
        factory: PawnFactory,
    ) -> Self {
        Self {
            scene: scene.to_string(),
            local: None,
            resume: None,
            join_on_connect: true,
            actions: ActionSet::standard(),
            pawns: PawnTable::new(),
            agents: HashMap::new(),
            rpc,
            factory,
            input_sequence: 0,
            tick: 0,
        }
    }

    /// Leaves scene loading and agent registration to the caller instead of
    /// doing both as soon as the authority accepts the connection
    pub fn manual_join(mut self) -> Self {
        self.join_on_connect = false;
        self
    }

    /// Replaces the configured action set; must happen before any agent exists
    pub fn with_actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local
    }

    pub fn is_connected(&self) -> bool {
        self.local.is_some()
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    pub fn agent(&self, id: NetworkId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// The agent owned by this participant
    pub fn local_agent(&self) -> Option<&Agent> {
        self.local.and_then(|local| {
            self.agents
                .values()
                .find(|agent| agent.owner() == Some(local))
        })
    }

    fn local_agent_id(&self) -> Option<NetworkId> {
        self.local_agent().map(Agent::id)
    }

    pub fn pawn(&self, id: NetworkId) -> Option<&dyn Pawn> {
        self.pawns.get(&id).map(|entry| entry.pawn.as_ref())
    }

    /// Pawns ordered by id
    pub fn pawns(&self) -> Vec<&dyn Pawn> {
        let mut pawns: Vec<&dyn Pawn> = self
            .pawns
            .values()
            .map(|entry| entry.pawn.as_ref())
            .collect();
        pawns.sort_by_key(|pawn| pawn.id());
        pawns
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn send(&self, packet: Packet) {
        if let Err(e) = self.rpc.send(packet) {
            error!("Failed to queue packet: {}", e);
        }
    }

    pub fn connect(&mut self) {
        info!("Connecting (resume: {:?})", self.resume);
        self.send(Packet::Connect {
            client_version: PROTOCOL_VERSION,
            resume: self.resume,
        });
    }

    pub fn disconnect(&mut self) {
        if self.is_connected() {
            self.send(Packet::Disconnect);
        }
        self.reset();
    }

    pub fn load_scene(&self) {
        if self.is_connected() {
            self.send(Packet::SceneLoaded {
                scene: self.scene.clone(),
            });
        }
    }

    pub fn register_agent(&self) {
        if self.is_connected() {
            self.send(Packet::RegisterAgent);
        }
    }

    /// Possesses `pawn` with the local agent
    pub fn possess(&mut self, pawn: NetworkId) {
        let Some(agent_id) = self.local_agent_id() else {
            warn!("No local agent to possess pawn {}", pawn);
            return;
        };
        if let Some(agent) = self.agents.get_mut(&agent_id) {
            agent.possess(pawn, &mut self.pawns);
        }
    }

    /// Releases whatever the local agent holds
    pub fn unpossess(&mut self) {
        let Some(agent_id) = self.local_agent_id() else {
            return;
        };
        if let Some(agent) = self.agents.get_mut(&agent_id) {
            if let Some(pawn) = agent.pawn() {
                agent.unpossess(pawn, &mut self.pawns);
            }
        }
    }

    /// Possesses the next free pawn after the current one, wrapping
    pub fn cycle_possession(&mut self) -> Option<NetworkId> {
        let agent_id = self.local_agent_id()?;
        let current = self.agents.get(&agent_id).and_then(Agent::pawn);

        let mut free: Vec<NetworkId> = self
            .pawns
            .values()
            .filter(|entry| entry.pawn.controller().is_none())
            .map(|entry| entry.pawn.id())
            .filter(|id| Some(*id) != current)
            .collect();
        free.sort();

        let next = match current {
            Some(current) => free
                .iter()
                .copied()
                .find(|id| *id > current)
                .or_else(|| free.first().copied()),
            None => free.first().copied(),
        }?;

        self.possess(next);
        Some(next)
    }

    /// Sends the possessed pawn's input; returns the sequence used
    pub fn send_input(&mut self) -> Option<u32> {
        let agent = self.local_agent()?;
        let pawn = agent.pawn()?;
        if !agent.has_binder() {
            return None;
        }

        let input = self.pawns.get_mut(&pawn)?.pawn.take_input();
        self.input_sequence += 1;
        self.send(Packet::PawnInput {
            pawn,
            sequence: self.input_sequence,
            input,
        });
        Some(self.input_sequence)
    }

    /// Sends this frame's input, or a heartbeat when no pawn takes input
    pub fn send_update(&mut self) {
        if !self.is_connected() {
            return;
        }
        if self.send_input().is_none() {
            self.send(Packet::Heartbeat);
        }
    }

    fn reset(&mut self) {
        for agent in self.agents.values_mut() {
            agent.release_local(&mut self.pawns);
        }
        self.agents.clear();
        self.pawns.clear();
        self.local = None;
        self.tick = 0;
    }

    fn apply_possession(
        &mut self,
        agent: NetworkId,
        pawn: Option<NetworkId>,
    ) -> Result<(), PossessionError> {
        if !self.agents.contains_key(&agent) {
            return Err(PossessionError::UnknownAgent(agent));
        }

        // Notifications from different agents may arrive out of order, so
        // whoever still holds the pawn locally lets go first
        if let Some(pawn) = pawn {
            for (id, other) in self.agents.iter_mut() {
                if *id != agent && other.pawn() == Some(pawn) {
                    debug!("Agent {} lost pawn {} to agent {}", id, pawn, agent);
                    other.release_local(&mut self.pawns);
                }
            }
        }

        match self.agents.get_mut(&agent) {
            Some(agent) => agent.on_possession_changed(pawn, &mut self.pawns),
            None => Err(PossessionError::UnknownAgent(agent)),
        }
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected as {}", client_id);
                self.local = Some(client_id);
                self.resume = Some(client_id);
                if self.join_on_connect {
                    self.load_scene();
                    self.register_agent();
                }
            }

            Packet::AgentSpawned { agent, owner } => {
                if self.agents.contains_key(&agent) {
                    return;
                }
                debug!("Agent {} of {} joined", agent, owner);
                self.agents.insert(
                    agent,
                    Agent::new(
                        agent,
                        Some(owner),
                        self.local,
                        self.actions.clone(),
                        self.rpc.clone(),
                    ),
                );
            }

            Packet::AgentDespawned { agent } => {
                if let Some(mut removed) = self.agents.remove(&agent) {
                    removed.release_local(&mut self.pawns);
                    debug!("Agent {} left", agent);
                }
            }

            Packet::PawnSpawned {
                pawn,
                kind,
                transform,
            } => {
                if self.pawns.contains_key(&pawn) {
                    return;
                }
                let entry = PawnEntry::new((self.factory)(pawn, kind, transform));
                self.pawns.insert(pawn, entry);
            }

            Packet::PawnDespawned { pawn } => {
                for agent in self.agents.values_mut() {
                    if agent.pawn() == Some(pawn) {
                        agent.release_local(&mut self.pawns);
                    }
                }
                self.pawns.remove(&pawn);
            }

            Packet::PossessionChanged { agent, pawn } => {
                if let Err(e) = self.apply_possession(agent, pawn) {
                    error!("Possession change for agent {} failed: {}", agent, e);
                }
            }

            Packet::PossessionRejected {
                agent,
                pawn,
                reason,
            } => {
                warn!("Possession of {} by {} rejected: {}", pawn, agent, reason);
                if let Some(record) = self.agents.get_mut(&agent) {
                    record.on_rejected(pawn, &reason, &mut self.pawns);
                }
            }

            Packet::WorldState { tick, pawns } => {
                if tick <= self.tick {
                    return;
                }
                self.tick = tick;
                for state in pawns {
                    if let Some(entry) = self.pawns.get_mut(&state.pawn) {
                        entry.pawn.apply_state(state.transform);
                    }
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.reset();
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }
}
