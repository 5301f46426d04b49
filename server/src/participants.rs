//! Participant connection management for the authority
//!
//! This module handles the server-side bookkeeping of connected participants:
//! - Connection lifecycle (connect, resume, disconnect, timeout)
//! - Address lookup for routing incoming datagrams
//! - Per-participant input sequencing so stale samples are dropped
//! - Capacity limits
//!
//! Participant ids are never recycled for a different connection. A
//! participant that reconnects may ask to resume its previous id, which is
//! what lets the authority hand a parked pawn back to it.

use log::info;
use shared::{NetworkId, ParticipantId};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected participant and its connection metadata
#[derive(Debug)]
pub struct Participant {
    /// Identifier assigned by the authority
    pub id: ParticipantId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this participant
    pub last_seen: Instant,
    /// Scene the participant reported as loaded, if any
    pub scene: Option<String>,
    /// Highest input sequence accepted per pawn
    last_input: HashMap<NetworkId, u32>,
}

impl Participant {
    pub fn new(id: ParticipantId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            scene: None,
            last_input: HashMap::new(),
        }
    }

    /// Records an input sample for `pawn` if it is newer than the last one
    ///
    /// Datagrams may arrive out of order; anything at or below the highest
    /// sequence already accepted for the pawn is rejected.
    pub fn accept_input(&mut self, pawn: NetworkId, sequence: u32) -> bool {
        self.last_seen = Instant::now();
        let last = self.last_input.entry(pawn).or_insert(0);
        if sequence <= *last {
            return false;
        }
        *last = sequence;
        true
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected participants
pub struct ParticipantManager {
    participants: HashMap<ParticipantId, Participant>,
    /// Ids handed out so far, connected or not
    issued: HashSet<ParticipantId>,
    next_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ParticipantManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            participants: HashMap::new(),
            issued: HashSet::new(),
            next_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Admits a new connection from `addr`
    ///
    /// Returns `None` when the server is full. When `resume` names an id this
    /// server issued before and nobody holds it now, that id is reused;
    /// otherwise a fresh id is issued.
    pub fn add_participant(
        &mut self,
        addr: SocketAddr,
        resume: Option<ParticipantId>,
    ) -> Option<ParticipantId> {
        if self.participants.len() >= self.max_clients {
            return None;
        }

        let id = match resume {
            Some(id) if self.issued.contains(&id) && !self.participants.contains_key(&id) => {
                info!("Participant {} resumed from {}", id, addr);
                id
            }
            _ => {
                let id = ParticipantId(self.next_id);
                self.next_id += 1;
                self.issued.insert(id);
                info!("Participant {} connected from {}", id, addr);
                id
            }
        };

        self.participants.insert(id, Participant::new(id, addr));
        Some(id)
    }

    /// Returns true if the participant was connected and is now removed
    pub fn remove_participant(&mut self, id: &ParticipantId) -> bool {
        if let Some(participant) = self.participants.remove(id) {
            info!("Participant {} disconnected", participant.id);
            true
        } else {
            false
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ParticipantId> {
        self.participants
            .values()
            .find(|participant| participant.addr == addr)
            .map(|participant| participant.id)
    }

    pub fn addr_of(&self, id: ParticipantId) -> Option<SocketAddr> {
        self.participants.get(&id).map(|participant| participant.addr)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    pub fn touch(&mut self, id: ParticipantId) {
        if let Some(participant) = self.participants.get_mut(&id) {
            participant.last_seen = Instant::now();
        }
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Removes participants that went quiet for too long, returning them
    /// with their last address
    pub fn check_timeouts(&mut self) -> Vec<(ParticipantId, SocketAddr)> {
        let timeout = self.timeout;
        let timed_out: Vec<(ParticipantId, SocketAddr)> = self
            .participants
            .values()
            .filter(|participant| participant.is_timed_out(timeout))
            .map(|participant| (participant.id, participant.addr))
            .collect();

        for (id, _) in &timed_out {
            self.remove_participant(id);
        }

        timed_out
    }

    /// All participant ids with their addresses, for broadcasting
    pub fn addrs(&self) -> Vec<(ParticipantId, SocketAddr)> {
        self.participants
            .values()
            .map(|participant| (participant.id, participant.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
