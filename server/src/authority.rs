//! Authority-side possession handshake and spawn assignment
//!
//! The [`Authority`] owns every piece of authoritative state: the world, the
//! ownership table, the orphaned-pawn registry and the last possession
//! notification per agent. It is driven exclusively from the server's event
//! loop, so every method runs to completion before the next message is
//! looked at and no locking is needed.
//!
//! Outgoing packets are queued on the same [`GameMessage`] channel the
//! network sender drains. Orphan retries are timer tasks that post a
//! [`RetryTicket`] back onto the event loop through [`ServerMessage`].

use crate::config::ServerConfig;
use crate::network::{GameMessage, ServerMessage};
use crate::orphans::OrphanRegistry;
use crate::ownership::OwnershipTable;
use crate::spawner::{RetryOutcome, RetryTicket, Spawner};
use crate::world::World;
use log::{debug, error, info, warn};
use shared::{NetworkId, Packet, ParticipantId, PawnKind, Transform};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Reasons the authority refuses a possession request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("unknown agent {0}")]
    UnknownAgent(NetworkId),

    #[error("unknown pawn {0}")]
    UnknownPawn(NetworkId),

    #[error("agent {agent} belongs to {owner}, not {requester}")]
    NotAgentOwner {
        agent: NetworkId,
        owner: ParticipantId,
        requester: ParticipantId,
    },

    #[error("pawn {pawn} is controlled by agent {controller}")]
    PawnControlled {
        pawn: NetworkId,
        controller: NetworkId,
    },

    #[error("agent {agent} does not possess pawn {pawn}")]
    NotPossessing { agent: NetworkId, pawn: NetworkId },

    #[error("participant {participant} already has agent {agent}")]
    AgentExists {
        participant: ParticipantId,
        agent: NetworkId,
    },
}

pub struct Authority {
    config: ServerConfig,
    world: World,
    ownership: OwnershipTable,
    orphans: OrphanRegistry,
    spawner: Spawner,
    /// Last possession notification per agent, replayed to late joiners
    buffered: HashMap<NetworkId, Packet>,
    outbox: mpsc::UnboundedSender<GameMessage>,
    loopback: mpsc::UnboundedSender<ServerMessage>,
}

impl Authority {
    pub fn new(
        config: ServerConfig,
        outbox: mpsc::UnboundedSender<GameMessage>,
        loopback: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let spawner = Spawner::new(config.spawn_points.clone(), config.default_spawn);
        let props = config.props.clone();

        let mut authority = Self {
            config,
            world: World::new(),
            ownership: OwnershipTable::new(),
            orphans: OrphanRegistry::new(),
            spawner,
            buffered: HashMap::new(),
            outbox,
            loopback,
        };

        for prop in props {
            authority.spawn_pawn(prop.kind, prop.transform);
        }

        authority
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    pub fn orphans(&self) -> &OrphanRegistry {
        &self.orphans
    }

    /// Last buffered possession notification for `agent`
    pub fn buffered(&self, agent: NetworkId) -> Option<&Packet> {
        self.buffered.get(&agent)
    }

    fn send(&self, to: ParticipantId, packet: Packet) {
        if let Err(e) = self.outbox.send(GameMessage::SendPacket { packet, to }) {
            error!("Failed to queue packet for {}: {}", to, e);
        }
    }

    fn broadcast(&self, packet: Packet) {
        if let Err(e) = self.outbox.send(GameMessage::BroadcastPacket {
            packet,
            exclude: None,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Broadcasts and keeps the packet as the replay value for `key`
    fn broadcast_buffered(&mut self, key: NetworkId, packet: Packet) {
        self.buffered.insert(key, packet.clone());
        self.broadcast(packet);
    }

    fn notify_possession(&mut self, agent: NetworkId, pawn: Option<NetworkId>) {
        self.broadcast_buffered(agent, Packet::PossessionChanged { agent, pawn });
    }

    pub fn spawn_pawn(&mut self, kind: PawnKind, transform: Transform) -> NetworkId {
        let pawn = self.world.spawn_pawn(kind, transform);
        self.broadcast(Packet::PawnSpawned {
            pawn,
            kind,
            transform,
        });
        pawn
    }

    /// Removes a pawn from the game, releasing whichever agent held it
    pub fn despawn_pawn(&mut self, pawn: NetworkId) -> bool {
        let Some(record) = self.world.despawn_pawn(pawn) else {
            return false;
        };

        self.ownership.clear(pawn);
        self.orphans.forget_pawn(pawn);

        if let Some(agent) = record.controller {
            if let Some(agent_record) = self.world.agents.get_mut(&agent) {
                agent_record.pawn = None;
                self.notify_possession(agent, None);
            }
        }

        self.broadcast(Packet::PawnDespawned { pawn });
        true
    }

    /// Sends a newly joined participant the current world, then every
    /// buffered possession notification
    pub fn on_participant_joined(&mut self, participant: ParticipantId) {
        let mut pawns: Vec<_> = self.world.pawns.values().collect();
        pawns.sort_by_key(|pawn| pawn.id);
        for pawn in pawns {
            self.send(
                participant,
                Packet::PawnSpawned {
                    pawn: pawn.id,
                    kind: pawn.kind,
                    transform: pawn.transform,
                },
            );
        }

        let mut agents: Vec<_> = self.world.agents.values().collect();
        agents.sort_by_key(|agent| agent.id);
        for agent in agents {
            self.send(
                participant,
                Packet::AgentSpawned {
                    agent: agent.id,
                    owner: agent.owner,
                },
            );
        }

        let mut replay: Vec<(&NetworkId, &Packet)> = self.buffered.iter().collect();
        replay.sort_by_key(|(agent, _)| **agent);
        for (_, packet) in replay {
            self.send(participant, packet.clone());
        }
    }

    pub fn on_participant_left(&mut self, participant: ParticipantId) {
        if let Some(agent) = self.world.agent_of(participant) {
            if let Some(record) = self.world.despawn_agent(agent) {
                if let Some(pawn) = record.pawn {
                    if let Some(pawn_record) = self.world.pawns.get_mut(&pawn) {
                        pawn_record.release();
                    }
                }
            }
            self.buffered.remove(&agent);
            self.broadcast(Packet::AgentDespawned { agent });
        }

        let owned = self.ownership.owned_by(participant);
        if self.config.destroy_on_disconnect {
            // A pawn still waiting for this participant's agent has no owner yet
            if let Some(orphan) = self.orphans.take(participant) {
                self.despawn_pawn(orphan);
            }
            for pawn in owned {
                self.despawn_pawn(pawn);
            }
        } else if let Some(pawn) = owned.first() {
            info!(
                "Keeping pawn {} of participant {} for a later resume",
                pawn, participant
            );
            self.orphans.insert(participant, *pawn);
        }
    }

    /// Spawns and assigns a pawn for a participant that finished loading
    ///
    /// Returns the new pawn, or `None` when the participant resumes with a
    /// pawn it still owns.
    pub fn on_participant_loaded_scene(
        &mut self,
        participant: ParticipantId,
        scene: &str,
    ) -> Option<NetworkId> {
        if !self.config.destroy_on_disconnect && self.ownership.owns_something(participant) {
            info!(
                "Participant {} rejoined {} and keeps its pawn",
                participant, scene
            );
            return None;
        }

        let transform = self.spawner.next_transform();
        let pawn = self.spawn_pawn(self.config.pawn_kind, transform);
        info!("Spawned pawn {} for {} in {}", pawn, participant, scene);

        match self.world.agent_of(participant) {
            Some(agent) => {
                if let Err(e) = self.possess(agent, pawn) {
                    error!("Failed to assign pawn {} to agent {}: {}", pawn, agent, e);
                }
            }
            None => {
                debug!(
                    "No agent for {} yet, parking pawn {} as orphan",
                    participant, pawn
                );
                self.orphans.insert(participant, pawn);
                self.schedule_retry(RetryTicket::first(participant, pawn));
            }
        }

        Some(pawn)
    }

    /// Registers the agent of `participant` and hands it any pawn waiting
    /// for that participant
    pub fn register_agent(
        &mut self,
        participant: ParticipantId,
    ) -> Result<NetworkId, AuthorityError> {
        if let Some(agent) = self.world.agent_of(participant) {
            return Err(AuthorityError::AgentExists { participant, agent });
        }

        let agent = self.world.spawn_agent(participant);
        self.broadcast(Packet::AgentSpawned {
            agent,
            owner: participant,
        });

        if let Some(pawn) = self.orphans.take(participant) {
            info!("Agent {} claims orphaned pawn {}", agent, pawn);
            if let Err(e) = self.possess(agent, pawn) {
                error!("Failed to hand orphaned pawn {} to {}: {}", pawn, agent, e);
            }
        }

        Ok(agent)
    }

    /// Transfers `pawn` to `agent`'s participant and broadcasts the change
    pub fn possess(&mut self, agent: NetworkId, pawn: NetworkId) -> Result<(), AuthorityError> {
        let record = self
            .world
            .agents
            .get(&agent)
            .cloned()
            .ok_or(AuthorityError::UnknownAgent(agent))?;
        let controller = self
            .world
            .pawns
            .get(&pawn)
            .ok_or(AuthorityError::UnknownPawn(pawn))?
            .controller;

        match controller {
            Some(controller) if controller != agent => {
                return Err(AuthorityError::PawnControlled { pawn, controller });
            }
            Some(_) => return Ok(()),
            None => {}
        }

        if let Some(previous) = record.pawn {
            self.detach(agent, previous);
        }

        self.ownership.transfer(pawn, record.owner);
        if let Some(pawn_record) = self.world.pawns.get_mut(&pawn) {
            pawn_record.controller = Some(agent);
        }
        if let Some(agent_record) = self.world.agents.get_mut(&agent) {
            agent_record.pawn = Some(pawn);
        }
        self.orphans.forget_pawn(pawn);

        info!("Agent {} ({}) possesses pawn {}", agent, record.owner, pawn);
        self.notify_possession(agent, Some(pawn));
        Ok(())
    }

    /// Clears `agent`'s possession of `pawn` and broadcasts the change
    pub fn release(&mut self, agent: NetworkId, pawn: NetworkId) -> Result<(), AuthorityError> {
        let record = self
            .world
            .agents
            .get(&agent)
            .ok_or(AuthorityError::UnknownAgent(agent))?;
        if record.pawn != Some(pawn) {
            return Err(AuthorityError::NotPossessing { agent, pawn });
        }

        self.detach(agent, pawn);
        info!("Agent {} released pawn {}", agent, pawn);
        self.notify_possession(agent, None);
        Ok(())
    }

    fn detach(&mut self, agent: NetworkId, pawn: NetworkId) {
        self.ownership.clear(pawn);
        if let Some(pawn_record) = self.world.pawns.get_mut(&pawn) {
            pawn_record.release();
        }
        if let Some(agent_record) = self.world.agents.get_mut(&agent) {
            agent_record.pawn = None;
        }
    }

    fn check_agent_owner(
        &self,
        requester: ParticipantId,
        agent: NetworkId,
    ) -> Result<(), AuthorityError> {
        let record = self
            .world
            .agents
            .get(&agent)
            .ok_or(AuthorityError::UnknownAgent(agent))?;
        if record.owner != requester {
            return Err(AuthorityError::NotAgentOwner {
                agent,
                owner: record.owner,
                requester,
            });
        }
        Ok(())
    }

    /// Tells the requester its request failed and what the truth is
    fn reject(
        &self,
        requester: ParticipantId,
        agent: NetworkId,
        pawn: NetworkId,
        error: AuthorityError,
    ) {
        warn!("Rejected request from {}: {}", requester, error);
        self.send(
            requester,
            Packet::PossessionRejected {
                agent,
                pawn,
                reason: error.to_string(),
            },
        );
        if let Some(current) = self.buffered.get(&agent) {
            self.send(requester, current.clone());
        }

        // The requester's optimistic hooks also touched the pawn's real holder
        let holder = self.world.pawns.get(&pawn).and_then(|record| record.controller);
        if let Some(holder) = holder.filter(|holder| *holder != agent) {
            if let Some(current) = self.buffered.get(&holder) {
                self.send(requester, current.clone());
            }
        }
    }

    /// Handles a packet from a participant the network layer already knows
    pub fn handle_packet(&mut self, participant: ParticipantId, packet: Packet) {
        match packet {
            // The network layer already refreshed the participant
            Packet::Heartbeat => {}

            Packet::RegisterAgent => {
                if let Err(e) = self.register_agent(participant) {
                    warn!("Ignoring agent registration: {}", e);
                }
            }

            Packet::SceneLoaded { scene } => {
                self.on_participant_loaded_scene(participant, &scene);
            }

            Packet::RequestPossess { agent, pawn } => {
                let result = self
                    .check_agent_owner(participant, agent)
                    .and_then(|_| self.possess(agent, pawn));
                if let Err(e) = result {
                    self.reject(participant, agent, pawn, e);
                }
            }

            Packet::RequestRelease { agent, pawn } => {
                let result = self
                    .check_agent_owner(participant, agent)
                    .and_then(|_| self.release(agent, pawn));
                if let Err(e) = result {
                    self.reject(participant, agent, pawn, e);
                }
            }

            Packet::PawnInput { pawn, input, .. } => {
                if self.ownership.owner_of(pawn) != Some(participant) {
                    debug!("Dropping input for pawn {} from non-owner {}", pawn, participant);
                    return;
                }
                self.world.apply_input(pawn, &input);
            }

            _ => {
                warn!("Unexpected packet type from participant {}", participant);
            }
        }
    }

    fn schedule_retry(&self, ticket: RetryTicket) {
        let loopback = self.loopback.clone();
        let delay = self.config.orphan_retry_interval;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = loopback.send(ServerMessage::OrphanRetry(ticket)) {
                debug!("Dropping orphan retry, event loop is gone: {}", e);
            }
        });
    }

    /// Runs one attempt of the orphaned-pawn retry loop
    pub fn retry_orphan(&mut self, ticket: RetryTicket) -> RetryOutcome {
        if !self.orphans.is_waiting(ticket.participant, ticket.pawn) {
            debug!(
                "Pawn {} is no longer waiting for {}, stopping retries",
                ticket.pawn, ticket.participant
            );
            return RetryOutcome::Claimed;
        }

        if let Some(agent) = self.world.agent_of(ticket.participant) {
            self.orphans.claim(ticket.participant, ticket.pawn);
            return match self.possess(agent, ticket.pawn) {
                Ok(()) => RetryOutcome::Possessed,
                Err(e) => {
                    error!("Failed to assign pawn {} to agent {}: {}", ticket.pawn, agent, e);
                    RetryOutcome::Claimed
                }
            };
        }

        if ticket.attempt >= self.config.orphan_retry_attempts {
            self.orphans.claim(ticket.participant, ticket.pawn);
            error!(
                "No agent registered for {} after {} attempts, pawn {} stays uncontrolled",
                ticket.participant, ticket.attempt, ticket.pawn
            );
            return RetryOutcome::Exhausted;
        }

        let next = ticket.next();
        self.schedule_retry(next);
        RetryOutcome::Rescheduled(next)
    }

    /// Advances the simulation and broadcasts pawn transforms
    pub fn tick(&mut self, dt: f32) {
        self.world.update_physics(dt);
        self.world.tick += 1;

        if self.world.pawns.is_empty() {
            return;
        }

        self.broadcast(Packet::WorldState {
            tick: self.world.tick,
            pawns: self.world.pawn_states(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropSpec;
    use std::time::Duration;

    struct Fixture {
        authority: Authority,
        game_rx: mpsc::UnboundedReceiver<GameMessage>,
        server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn fixture(config: ServerConfig) -> Fixture {
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        Fixture {
            authority: Authority::new(config, game_tx, server_tx),
            game_rx,
            server_rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GameMessage>) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn broadcasts(messages: &[GameMessage]) -> Vec<Packet> {
        messages
            .iter()
            .filter_map(|message| match message {
                GameMessage::BroadcastPacket { packet, .. } => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }

    fn sent_to(messages: &[GameMessage], participant: ParticipantId) -> Vec<Packet> {
        messages
            .iter()
            .filter_map(|message| match message {
                GameMessage::SendPacket { packet, to } if *to == participant => {
                    Some(packet.clone())
                }
                _ => None,
            })
            .collect()
    }

    const P1: ParticipantId = ParticipantId(1);
    const P2: ParticipantId = ParticipantId(2);

    #[tokio::test]
    async fn test_scene_load_with_registered_agent_possesses_directly() {
        let mut f = fixture(ServerConfig::default());

        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        assert_eq!(f.authority.ownership().owner_of(pawn), Some(P1));
        assert_eq!(f.authority.world().agents[&agent].pawn, Some(pawn));
        assert_eq!(f.authority.world().pawns[&pawn].controller, Some(agent));
        assert!(f.authority.orphans().is_empty());

        let packets = broadcasts(&drain(&mut f.game_rx));
        assert_eq!(
            packets.last(),
            Some(&Packet::PossessionChanged {
                agent,
                pawn: Some(pawn)
            })
        );
    }

    #[tokio::test]
    async fn test_scene_load_without_agent_parks_orphan() {
        let mut f = fixture(ServerConfig::default());

        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        assert_eq!(f.authority.orphans().get(P1), Some(pawn));
        assert_eq!(f.authority.ownership().owner_of(pawn), None);
    }

    #[tokio::test]
    async fn test_agent_registration_claims_orphan() {
        let mut f = fixture(ServerConfig::default());

        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        let agent = f.authority.register_agent(P1).unwrap();

        assert!(f.authority.orphans().is_empty());
        assert_eq!(f.authority.world().agents[&agent].pawn, Some(pawn));
        assert_eq!(
            f.authority.buffered(agent),
            Some(&Packet::PossessionChanged {
                agent,
                pawn: Some(pawn)
            })
        );
    }

    #[tokio::test]
    async fn test_register_agent_twice_fails() {
        let mut f = fixture(ServerConfig::default());

        let agent = f.authority.register_agent(P1).unwrap();
        assert_eq!(
            f.authority.register_agent(P1),
            Err(AuthorityError::AgentExists {
                participant: P1,
                agent
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_after_budget() {
        let mut f = fixture(ServerConfig::default());
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        let mut attempts = 0;
        loop {
            let Some(ServerMessage::OrphanRetry(ticket)) = f.server_rx.recv().await else {
                panic!("retry channel closed");
            };
            attempts += 1;
            assert_eq!(ticket.attempt, attempts);
            match f.authority.retry_orphan(ticket) {
                RetryOutcome::Rescheduled(next) => assert_eq!(next.attempt, attempts + 1),
                RetryOutcome::Exhausted => break,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(attempts, 10);
        assert!(f.authority.orphans().is_empty());
        assert!(f.authority.world().pawns.contains_key(&pawn));
        assert_eq!(f.authority.world().pawns[&pawn].controller, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_spacing_matches_interval() {
        let mut f = fixture(ServerConfig::default());
        f.authority.on_participant_loaded_scene(P1, "arena");

        let start = tokio::time::Instant::now();
        let Some(ServerMessage::OrphanRetry(ticket)) = f.server_rx.recv().await else {
            panic!("retry channel closed");
        };
        let first = start.elapsed();
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(150));

        f.authority.retry_orphan(ticket);
        let Some(ServerMessage::OrphanRetry(_)) = f.server_rx.recv().await else {
            panic!("retry channel closed");
        };
        let second = start.elapsed();
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retry_stops_when_claimed() {
        let mut f = fixture(ServerConfig::default());
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        let agent = f.authority.register_agent(P1).unwrap();
        drain(&mut f.game_rx);

        let outcome = f.authority.retry_orphan(RetryTicket::first(P1, pawn));

        assert_eq!(outcome, RetryOutcome::Claimed);
        assert!(broadcasts(&drain(&mut f.game_rx)).is_empty());
        assert_eq!(f.authority.world().agents[&agent].pawn, Some(pawn));
    }

    #[tokio::test]
    async fn test_retry_possesses_when_agent_appears() {
        let mut f = fixture(ServerConfig::default());
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        let agent = f.authority.world.spawn_agent(P1);

        let outcome = f.authority.retry_orphan(RetryTicket::first(P1, pawn));

        assert_eq!(outcome, RetryOutcome::Possessed);
        assert!(f.authority.orphans().is_empty());
        assert_eq!(f.authority.world().pawns[&pawn].controller, Some(agent));
    }

    #[tokio::test]
    async fn test_round_robin_spawn_points() {
        let config = ServerConfig {
            spawn_points: vec![Transform::new(100.0, 0.0), Transform::new(300.0, 0.0)],
            ..Default::default()
        };
        let mut f = fixture(config);

        let xs: Vec<f32> = [P1, P2, ParticipantId(3)]
            .into_iter()
            .map(|participant| {
                let pawn = f
                    .authority
                    .on_participant_loaded_scene(participant, "arena")
                    .unwrap();
                f.authority.world().pawns[&pawn].transform.x
            })
            .collect();

        assert_eq!(xs, vec![100.0, 300.0, 100.0]);
    }

    #[tokio::test]
    async fn test_possess_pawn_controlled_by_other_agent_is_rejected() {
        let mut f = fixture(ServerConfig::default());
        let agent1 = f.authority.register_agent(P1).unwrap();
        let agent2 = f.authority.register_agent(P2).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        drain(&mut f.game_rx);

        f.authority
            .handle_packet(P2, Packet::RequestPossess { agent: agent2, pawn });

        let messages = drain(&mut f.game_rx);
        let replies = sent_to(&messages, P2);
        assert!(matches!(
            replies.first(),
            Some(Packet::PossessionRejected { agent, .. }) if *agent == agent2
        ));
        assert_eq!(
            replies.last(),
            Some(&Packet::PossessionChanged {
                agent: agent1,
                pawn: Some(pawn)
            })
        );
        assert!(broadcasts(&messages).is_empty());
        assert_eq!(f.authority.world().pawns[&pawn].controller, Some(agent1));
    }

    #[tokio::test]
    async fn test_request_for_foreign_agent_is_rejected() {
        let mut f = fixture(ServerConfig {
            props: vec![PropSpec {
                kind: PawnKind::Vehicle,
                transform: Transform::on_floor(400.0),
            }],
            ..Default::default()
        });
        let agent1 = f.authority.register_agent(P1).unwrap();
        let prop = *f.authority.world().pawns.keys().next().unwrap();
        drain(&mut f.game_rx);

        f.authority.handle_packet(
            P2,
            Packet::RequestPossess {
                agent: agent1,
                pawn: prop,
            },
        );

        assert_eq!(f.authority.world().pawns[&prop].controller, None);
        let replies = sent_to(&drain(&mut f.game_rx), P2);
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn test_switching_pawns_moves_ownership() {
        let mut f = fixture(ServerConfig {
            props: vec![PropSpec {
                kind: PawnKind::Vehicle,
                transform: Transform::on_floor(400.0),
            }],
            ..Default::default()
        });
        let prop = *f.authority.world().pawns.keys().next().unwrap();
        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        f.authority
            .handle_packet(P1, Packet::RequestRelease { agent, pawn });
        f.authority
            .handle_packet(P1, Packet::RequestPossess { agent, pawn: prop });

        assert_eq!(f.authority.ownership().owner_of(pawn), None);
        assert_eq!(f.authority.ownership().owner_of(prop), Some(P1));
        assert_eq!(f.authority.world().pawns[&pawn].controller, None);
        assert_eq!(f.authority.world().agents[&agent].pawn, Some(prop));
    }

    #[tokio::test]
    async fn test_release_of_unheld_pawn_is_rejected() {
        let mut f = fixture(ServerConfig::default());
        let agent = f.authority.register_agent(P1).unwrap();

        assert_eq!(
            f.authority.release(agent, NetworkId(99)),
            Err(AuthorityError::NotPossessing {
                agent,
                pawn: NetworkId(99)
            })
        );
    }

    #[tokio::test]
    async fn test_late_joiner_receives_buffered_possession() {
        let mut f = fixture(ServerConfig::default());
        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        drain(&mut f.game_rx);

        f.authority.on_participant_joined(P2);

        let replay = sent_to(&drain(&mut f.game_rx), P2);
        assert_eq!(
            replay,
            vec![
                Packet::PawnSpawned {
                    pawn,
                    kind: PawnKind::Character,
                    transform: f.authority.world().pawns[&pawn].transform,
                },
                Packet::AgentSpawned { agent, owner: P1 },
                Packet::PossessionChanged {
                    agent,
                    pawn: Some(pawn)
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_leave_destroys_pawn_by_default() {
        let mut f = fixture(ServerConfig::default());
        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        drain(&mut f.game_rx);

        f.authority.on_participant_left(P1);

        assert!(!f.authority.world().pawns.contains_key(&pawn));
        assert!(!f.authority.world().agents.contains_key(&agent));
        assert!(!f.authority.ownership().owns_something(P1));
        assert!(f.authority.buffered(agent).is_none());

        let packets = broadcasts(&drain(&mut f.game_rx));
        assert!(packets.contains(&Packet::AgentDespawned { agent }));
        assert!(packets.contains(&Packet::PawnDespawned { pawn }));
    }

    #[tokio::test]
    async fn test_leave_destroys_unclaimed_orphan() {
        let mut f = fixture(ServerConfig::default());
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        drain(&mut f.game_rx);

        f.authority.on_participant_left(P1);

        assert!(!f.authority.world().pawns.contains_key(&pawn));
        assert!(f.authority.orphans().is_empty());
        let packets = broadcasts(&drain(&mut f.game_rx));
        assert_eq!(packets, vec![Packet::PawnDespawned { pawn }]);

        f.authority.tick(1.0 / 60.0);
        assert!(broadcasts(&drain(&mut f.game_rx)).is_empty());
    }

    #[tokio::test]
    async fn test_released_pawn_stops_moving() {
        let mut f = fixture(ServerConfig::default());
        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        f.authority.handle_packet(
            P1,
            Packet::PawnInput {
                pawn,
                sequence: 1,
                input: shared::PawnInput {
                    move_x: 1.0,
                    ..Default::default()
                },
            },
        );

        f.authority.release(agent, pawn).unwrap();
        let before = f.authority.world().pawns[&pawn].transform.x;
        for _ in 0..60 {
            f.authority.tick(1.0 / 60.0);
        }

        let record = &f.authority.world().pawns[&pawn];
        assert_eq!(record.controller, None);
        assert_eq!(record.input, shared::PawnInput::default());
        assert_approx_eq::assert_approx_eq!(record.transform.x, before);
    }

    #[tokio::test]
    async fn test_kept_pawn_stops_moving_after_leave() {
        let mut f = fixture(ServerConfig {
            destroy_on_disconnect: false,
            ..Default::default()
        });
        f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        f.authority.handle_packet(
            P1,
            Packet::PawnInput {
                pawn,
                sequence: 1,
                input: shared::PawnInput {
                    move_x: -1.0,
                    ..Default::default()
                },
            },
        );

        f.authority.on_participant_left(P1);
        let before = f.authority.world().pawns[&pawn].transform.x;
        for _ in 0..30 {
            f.authority.tick(1.0 / 60.0);
        }

        assert_approx_eq::assert_approx_eq!(f.authority.world().pawns[&pawn].transform.x, before);
    }

    #[tokio::test]
    async fn test_resume_reuses_kept_pawn() {
        let mut f = fixture(ServerConfig {
            destroy_on_disconnect: false,
            ..Default::default()
        });
        f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        f.authority.on_participant_left(P1);
        assert!(f.authority.world().pawns.contains_key(&pawn));
        assert_eq!(f.authority.orphans().get(P1), Some(pawn));

        assert_eq!(f.authority.on_participant_loaded_scene(P1, "arena"), None);
        let agent = f.authority.register_agent(P1).unwrap();

        assert_eq!(f.authority.world().agents[&agent].pawn, Some(pawn));
        assert_eq!(f.authority.world().pawns.len(), 1);
    }

    #[tokio::test]
    async fn test_despawn_releases_controller() {
        let mut f = fixture(ServerConfig::default());
        let agent = f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();

        assert!(f.authority.despawn_pawn(pawn));
        assert!(!f.authority.despawn_pawn(pawn));

        assert_eq!(f.authority.world().agents[&agent].pawn, None);
        assert_eq!(
            f.authority.buffered(agent),
            Some(&Packet::PossessionChanged { agent, pawn: None })
        );
    }

    #[tokio::test]
    async fn test_input_only_accepted_from_owner() {
        let mut f = fixture(ServerConfig::default());
        f.authority.register_agent(P1).unwrap();
        let pawn = f.authority.on_participant_loaded_scene(P1, "arena").unwrap();
        let input = shared::PawnInput {
            move_x: 1.0,
            ..Default::default()
        };

        f.authority.handle_packet(
            P2,
            Packet::PawnInput {
                pawn,
                sequence: 1,
                input,
            },
        );
        assert_eq!(f.authority.world().pawns[&pawn].input.move_x, 0.0);

        f.authority.handle_packet(
            P1,
            Packet::PawnInput {
                pawn,
                sequence: 1,
                input,
            },
        );
        assert_eq!(f.authority.world().pawns[&pawn].input.move_x, 1.0);
    }

    #[tokio::test]
    async fn test_tick_broadcasts_world_state() {
        let mut f = fixture(ServerConfig::default());
        f.authority.on_participant_loaded_scene(P1, "arena");
        drain(&mut f.game_rx);

        f.authority.tick(1.0 / 60.0);

        let packets = broadcasts(&drain(&mut f.game_rx));
        assert!(matches!(
            packets.as_slice(),
            [Packet::WorldState { tick: 1, pawns }] if pawns.len() == 1
        ));
    }
}
