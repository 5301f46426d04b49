//! Pawns created before the agent that should control them exists

use shared::{NetworkId, ParticipantId};
use std::collections::HashMap;

/// Participant → pawn waiting for that participant's agent
///
/// Owned by the authority, so a fresh session starts with an empty registry.
#[derive(Debug, Default)]
pub struct OrphanRegistry {
    waiting: HashMap<ParticipantId, NetworkId>,
}

impl OrphanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `pawn` for `participant`, replacing any earlier entry
    pub fn insert(&mut self, participant: ParticipantId, pawn: NetworkId) -> Option<NetworkId> {
        self.waiting.insert(participant, pawn)
    }

    pub fn get(&self, participant: ParticipantId) -> Option<NetworkId> {
        self.waiting.get(&participant).copied()
    }

    /// True when `participant` is still mapped to exactly `pawn`
    pub fn is_waiting(&self, participant: ParticipantId, pawn: NetworkId) -> bool {
        self.get(participant) == Some(pawn)
    }

    /// Removes the entry only if it still maps `participant` to `pawn`
    pub fn claim(&mut self, participant: ParticipantId, pawn: NetworkId) -> bool {
        if self.is_waiting(participant, pawn) {
            self.waiting.remove(&participant);
            true
        } else {
            false
        }
    }

    /// Takes whatever pawn is waiting for `participant`
    pub fn take(&mut self, participant: ParticipantId) -> Option<NetworkId> {
        self.waiting.remove(&participant)
    }

    /// Drops every entry pointing at `pawn`
    pub fn forget_pawn(&mut self, pawn: NetworkId) {
        self.waiting.retain(|_, waiting| *waiting != pawn);
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
