//! Participant-side possession state machine
//!
//! An [`Agent`] is the persistent identity of one participant. It walks
//! `Idle -> Possessing -> Possessed` and back:
//!
//! - `possess` acts optimistically: input is bound and the start hook runs
//!   before the authority has answered
//! - the authority's `PossessionChanged` broadcast is always authoritative and
//!   overwrites whatever the optimistic state was
//! - `PossessionRejected` drops an optimistic pawn the authority refused
//!
//! Only the agent's owning participant ever holds an [`InputBinder`].

use crate::actions::ActionSet;
use crate::binder::InputBinder;
use crate::pawn::{Controller, PawnTable};
use log::{debug, error, info};
use shared::{NetworkId, Packet, ParticipantId};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PossessionError {
    #[error("pawn {0} is not in the local replica")]
    UnknownPawn(NetworkId),

    #[error("agent {0} is not in the local replica")]
    UnknownAgent(NetworkId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PossessionState {
    Idle,
    /// Possession requested, authority has not confirmed yet
    Possessing(NetworkId),
    /// Confirmed by the authority
    Possessed(NetworkId),
}

impl PossessionState {
    pub fn pawn(&self) -> Option<NetworkId> {
        match *self {
            PossessionState::Idle => None,
            PossessionState::Possessing(pawn) | PossessionState::Possessed(pawn) => Some(pawn),
        }
    }
}

impl fmt::Display for PossessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PossessionState::Idle => write!(f, "idle"),
            PossessionState::Possessing(pawn) => write!(f, "possessing {}", pawn),
            PossessionState::Possessed(pawn) => write!(f, "possessed {}", pawn),
        }
    }
}

pub struct Agent {
    id: NetworkId,
    owner: Option<ParticipantId>,
    local: Option<ParticipantId>,
    state: PossessionState,
    binder: Option<InputBinder>,
    actions: ActionSet,
    rpc: mpsc::UnboundedSender<Packet>,
}

impl Agent {
    pub fn new(
        id: NetworkId,
        owner: Option<ParticipantId>,
        local: Option<ParticipantId>,
        actions: ActionSet,
        rpc: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            id,
            owner,
            local,
            state: PossessionState::Idle,
            binder: None,
            actions,
            rpc,
        }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn owner(&self) -> Option<ParticipantId> {
        self.owner
    }

    pub fn state(&self) -> PossessionState {
        self.state
    }

    pub fn pawn(&self) -> Option<NetworkId> {
        self.state.pawn()
    }

    pub fn has_binder(&self) -> bool {
        self.binder.is_some()
    }

    /// True on the participant that owns this agent
    pub fn is_controller(&self) -> bool {
        self.owner.is_some() && self.owner == self.local
    }

    fn controller(&self) -> Controller {
        Controller {
            agent: self.id,
            participant: self.owner,
            is_local: self.is_controller(),
        }
    }

    fn request(&self, packet: Packet) {
        if let Err(e) = self.rpc.send(packet) {
            error!("Failed to queue request from agent {}: {}", self.id, e);
        }
    }

    /// Requests control of `pawn`, applying it locally right away
    pub fn possess(&mut self, pawn: NetworkId, pawns: &mut PawnTable) {
        if !pawns.contains_key(&pawn) {
            debug!("Agent {} cannot possess missing pawn {}", self.id, pawn);
            return;
        }
        if self.state.pawn() == Some(pawn) {
            return;
        }

        // The old binder must be gone before the new one exists
        if let Some(current) = self.state.pawn() {
            self.unpossess(current, pawns);
        }

        self.bind(pawn, pawns);
        self.request(Packet::RequestPossess {
            agent: self.id,
            pawn,
        });
        self.adopt(PossessionState::Possessing(pawn), pawns);
    }

    /// Requests release of `pawn` and tears local control down
    pub fn unpossess(&mut self, pawn: NetworkId, pawns: &mut PawnTable) {
        if !pawns.contains_key(&pawn) || self.state.pawn() != Some(pawn) {
            return;
        }

        self.request(Packet::RequestRelease {
            agent: self.id,
            pawn,
        });
        self.release_local(pawns);
    }

    /// Drops the current pawn without telling the authority
    pub fn release_local(&mut self, pawns: &mut PawnTable) {
        let Some(pawn) = self.state.pawn() else {
            return;
        };

        if let Some(mut binder) = self.binder.take() {
            binder.unbind_all();
        }
        // The pawn may already belong to another agent in this replica
        if let Some(entry) = pawns.get_mut(&pawn) {
            if entry.pawn.controller() == Some(self.id) {
                entry.pawn.on_unpossessed();
            }
        }
        self.state = PossessionState::Idle;
        info!("Agent {} released pawn {}", self.id, pawn);
    }

    /// Applies the authority's possession broadcast
    pub fn on_possession_changed(
        &mut self,
        pawn: Option<NetworkId>,
        pawns: &mut PawnTable,
    ) -> Result<(), PossessionError> {
        let Some(pawn) = pawn else {
            match self.state {
                PossessionState::Possessing(pending) => {
                    debug!(
                        "Agent {} ignores stale release while {} is pending",
                        self.id, pending
                    );
                }
                PossessionState::Possessed(_) => self.release_local(pawns),
                PossessionState::Idle => {}
            }
            return Ok(());
        };

        if !pawns.contains_key(&pawn) {
            return Err(PossessionError::UnknownPawn(pawn));
        }

        match self.state {
            PossessionState::Possessing(current) | PossessionState::Possessed(current)
                if current == pawn =>
            {
                debug!("Agent {} possession of {} confirmed", self.id, pawn);
                self.state = PossessionState::Possessed(pawn);
                // Another agent's optimistic attempt may have taken the local copy
                let holder = pawns.get(&pawn).and_then(|entry| entry.pawn.controller());
                if holder != Some(self.id) {
                    self.adopt(PossessionState::Possessed(pawn), pawns);
                }
                return Ok(());
            }
            PossessionState::Possessing(_) | PossessionState::Possessed(_) => {
                self.release_local(pawns);
            }
            PossessionState::Idle => {}
        }

        self.bind(pawn, pawns);
        self.adopt(PossessionState::Possessed(pawn), pawns);
        Ok(())
    }

    /// Drops an optimistic pawn the authority refused
    pub fn on_rejected(&mut self, pawn: NetworkId, reason: &str, pawns: &mut PawnTable) {
        if self.state == PossessionState::Possessing(pawn) {
            info!(
                "Agent {} lost pending pawn {}: {}",
                self.id, pawn, reason
            );
            self.release_local(pawns);
        }
    }

    /// Binds input against `pawn` on the controlling participant only
    fn bind(&mut self, pawn: NetworkId, pawns: &PawnTable) {
        if !self.is_controller() {
            return;
        }
        let Some(bindings) = pawns.get(&pawn).and_then(|entry| entry.bindings.as_ref()) else {
            return;
        };

        if let Some(mut previous) = self.binder.take() {
            previous.unbind_all();
        }
        let mut binder = InputBinder::new(self.actions.clone());
        let bound = bindings.bind(&mut binder);
        debug!("Agent {} bound {} actions to pawn {}", self.id, bound, pawn);
        self.binder = Some(binder);
    }

    fn adopt(&mut self, state: PossessionState, pawns: &mut PawnTable) {
        self.state = state;
        let controller = self.controller();
        if let Some(pawn) = state.pawn() {
            if let Some(entry) = pawns.get_mut(&pawn) {
                entry.pawn.on_possessed(&controller);
            }
            info!("Agent {} {}", self.id, state);
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("bound", &self.binder.as_ref().map_or(0, InputBinder::len))
            .finish()
    }
}
