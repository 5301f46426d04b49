//! Spawn point selection for participant pawns

use shared::{NetworkId, ParticipantId, Transform};

/// Cycles through the configured spawn points, wrapping at the end
#[derive(Debug, Clone)]
pub struct Spawner {
    spawn_points: Vec<Transform>,
    default_spawn: Transform,
    next_index: usize,
}

impl Spawner {
    pub fn new(spawn_points: Vec<Transform>, default_spawn: Transform) -> Self {
        Self {
            spawn_points,
            default_spawn,
            next_index: 0,
        }
    }

    /// Transform for the next pawn; the default when no points are set
    pub fn next_transform(&mut self) -> Transform {
        if self.spawn_points.is_empty() {
            return self.default_spawn;
        }

        let transform = self.spawn_points[self.next_index];
        self.next_index = (self.next_index + 1) % self.spawn_points.len();
        transform
    }

    /// Index the next call to `next_transform` will use
    pub fn next_index(&self) -> usize {
        self.next_index
    }
}

/// One pending attempt to hand an orphaned pawn to its participant's agent
///
/// The pawn id doubles as the cancellation token: the attempt only proceeds
/// while the orphan registry still maps the participant to this pawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTicket {
    pub participant: ParticipantId,
    pub pawn: NetworkId,
    /// 1-based attempt number
    pub attempt: u32,
}

impl RetryTicket {
    pub fn first(participant: ParticipantId, pawn: NetworkId) -> Self {
        Self {
            participant,
            pawn,
            attempt: 1,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..*self
        }
    }
}

/// What a retry attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The registry entry changed; someone else dealt with the pawn
    Claimed,
    /// The agent showed up and now possesses the pawn
    Possessed,
    /// Still no agent; another attempt was scheduled
    Rescheduled(RetryTicket),
    /// Budget spent; the entry was removed and the pawn stays uncontrolled
    Exhausted,
}
