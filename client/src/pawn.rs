//! Controllable entities and their optional input bindings
//!
//! Every pawn variant carries a [`PawnCore`] and implements [`Pawn`]. Pawns
//! that accept live input return [`Bindings`] describing which actions they
//! listen to; the answer is asked once when the pawn enters the replica and
//! cached in its [`PawnEntry`].

use crate::actions::{ActionValue, Callback};
use crate::binder::InputBinder;
use log::{debug, info};
use shared::{
    NetworkId, ParticipantId, PawnInput, PawnKind, Transform, ACTION_FIRE, ACTION_JUMP,
    ACTION_LOOK, ACTION_MOVE,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Input fields written by action callbacks and read by the network sender
pub type SharedInput = Arc<Mutex<PawnInput>>;

fn lock_input(input: &SharedInput) -> MutexGuard<'_, PawnInput> {
    input.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Who took control of a pawn, handed to the possession-start hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controller {
    pub agent: NetworkId,
    pub participant: Option<ParticipantId>,
    /// True only on the participant that owns the agent
    pub is_local: bool,
}

/// The actions a pawn listens to and the input fields they write
#[derive(Clone)]
pub struct Bindings {
    input: SharedInput,
    actions: &'static [&'static str],
}

impl Bindings {
    pub fn new(input: SharedInput, actions: &'static [&'static str]) -> Self {
        Self { input, actions }
    }

    pub fn actions(&self) -> &'static [&'static str] {
        self.actions
    }

    /// Attaches this pawn's callbacks to `binder`; returns how many actions
    /// resolved
    pub fn bind(&self, binder: &mut InputBinder) -> usize {
        self.actions
            .iter()
            .filter(|name| self.bind_action(binder, name))
            .count()
    }

    fn bind_action(&self, binder: &mut InputBinder, name: &str) -> bool {
        match name {
            ACTION_MOVE => {
                let set_move = self.writer(|input, value| {
                    let (x, y) = value.axis();
                    input.move_x = x;
                    input.move_y = y;
                });
                let stop = self.writer(|input, _| {
                    input.move_x = 0.0;
                    input.move_y = 0.0;
                });
                binder.action(name, Some(set_move.clone()), Some(set_move), Some(stop))
            }
            ACTION_LOOK => {
                let look = self.writer(|input, value| {
                    let (x, y) = value.axis();
                    input.look_x += x;
                    input.look_y += y;
                });
                binder.action(name, None, Some(look), None)
            }
            ACTION_JUMP => {
                let jump = self.writer(|input, _| input.jump = true);
                binder.action(name, Some(jump), None, None)
            }
            ACTION_FIRE => {
                let fire = self.writer(|input, _| input.primary = true);
                binder.action(name, Some(fire), None, None)
            }
            other => binder.action(other, None, None, None),
        }
    }

    fn writer<F>(&self, write: F) -> Callback
    where
        F: Fn(&mut PawnInput, ActionValue) + Send + Sync + 'static,
    {
        let input = Arc::clone(&self.input);
        Arc::new(move |value: ActionValue| {
            let mut guard = lock_input(&input);
            write(&mut *guard, value);
        })
    }
}

/// State every pawn variant shares
#[derive(Debug, Clone)]
pub struct PawnCore {
    pub id: NetworkId,
    pub kind: PawnKind,
    pub transform: Transform,
    pub controller: Option<NetworkId>,
    /// Set while the local participant controls this pawn
    pub locally_controlled: bool,
    input: SharedInput,
}

impl PawnCore {
    pub fn new(id: NetworkId, kind: PawnKind, transform: Transform) -> Self {
        Self {
            id,
            kind,
            transform,
            controller: None,
            locally_controlled: false,
            input: Arc::new(Mutex::new(PawnInput::default())),
        }
    }

    pub fn input_handle(&self) -> SharedInput {
        Arc::clone(&self.input)
    }

    pub fn attach(&mut self, controller: &Controller) {
        self.controller = Some(controller.agent);
        self.locally_controlled = controller.is_local;
    }

    pub fn detach(&mut self) {
        self.controller = None;
        self.locally_controlled = false;
        *lock_input(&self.input) = PawnInput::default();
    }
}

/// A controllable entity
pub trait Pawn: Send {
    fn core(&self) -> &PawnCore;
    fn core_mut(&mut self) -> &mut PawnCore;

    /// Input this pawn accepts, if any
    fn bindings(&self) -> Option<Bindings>;

    /// Possession-start hook
    fn on_possessed(&mut self, controller: &Controller) {
        self.core_mut().attach(controller);
    }

    /// Possession-end hook
    fn on_unpossessed(&mut self) {
        self.core_mut().detach();
    }

    fn id(&self) -> NetworkId {
        self.core().id
    }

    fn kind(&self) -> PawnKind {
        self.core().kind
    }

    fn controller(&self) -> Option<NetworkId> {
        self.core().controller
    }

    fn transform(&self) -> Transform {
        self.core().transform
    }

    fn apply_state(&mut self, transform: Transform) {
        self.core_mut().transform = transform;
    }

    /// Current synced input fields
    fn input(&self) -> PawnInput {
        *lock_input(&self.core().input)
    }

    /// Returns the input to send and clears its edges and look delta
    fn take_input(&mut self) -> PawnInput {
        let mut input = lock_input(&self.core().input);
        let sample = *input;
        input.consume();
        sample
    }
}

pub struct Character {
    core: PawnCore,
}

impl Character {
    const ACTIONS: &'static [&'static str] = &[ACTION_MOVE, ACTION_LOOK, ACTION_JUMP, ACTION_FIRE];

    pub fn new(id: NetworkId, transform: Transform) -> Self {
        Self {
            core: PawnCore::new(id, PawnKind::Character, transform),
        }
    }
}

impl Pawn for Character {
    fn core(&self) -> &PawnCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PawnCore {
        &mut self.core
    }

    fn bindings(&self) -> Option<Bindings> {
        Some(Bindings::new(self.core.input_handle(), Self::ACTIONS))
    }

    fn on_possessed(&mut self, controller: &Controller) {
        self.core.attach(controller);
        if controller.is_local {
            info!("Controls enabled on character {}", self.core.id);
        }
    }
}

/// Free-flying camera that only looks around
pub struct CameraRig {
    core: PawnCore,
    pub camera_active: bool,
}

impl CameraRig {
    const ACTIONS: &'static [&'static str] = &[ACTION_LOOK];

    pub fn new(id: NetworkId, transform: Transform) -> Self {
        Self {
            core: PawnCore::new(id, PawnKind::CameraRig, transform),
            camera_active: false,
        }
    }
}

impl Pawn for CameraRig {
    fn core(&self) -> &PawnCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PawnCore {
        &mut self.core
    }

    fn bindings(&self) -> Option<Bindings> {
        Some(Bindings::new(self.core.input_handle(), Self::ACTIONS))
    }

    fn on_possessed(&mut self, controller: &Controller) {
        self.core.attach(controller);
        self.camera_active = controller.is_local;
    }

    fn on_unpossessed(&mut self) {
        self.core.detach();
        self.camera_active = false;
    }
}

pub struct Vehicle {
    core: PawnCore,
    pub engine_running: bool,
}

impl Vehicle {
    const ACTIONS: &'static [&'static str] = &[ACTION_MOVE, ACTION_FIRE];

    pub fn new(id: NetworkId, transform: Transform) -> Self {
        Self {
            core: PawnCore::new(id, PawnKind::Vehicle, transform),
            engine_running: false,
        }
    }
}

impl Pawn for Vehicle {
    fn core(&self) -> &PawnCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PawnCore {
        &mut self.core
    }

    fn bindings(&self) -> Option<Bindings> {
        Some(Bindings::new(self.core.input_handle(), Self::ACTIONS))
    }

    fn on_possessed(&mut self, controller: &Controller) {
        self.core.attach(controller);
        self.engine_running = true;
        debug!("Vehicle {} engine started by {}", self.core.id, controller.agent);
    }

    fn on_unpossessed(&mut self) {
        self.core.detach();
        self.engine_running = false;
    }
}

/// Non-interactive camera; possessing it only switches the view
pub struct CutsceneCamera {
    core: PawnCore,
    pub camera_active: bool,
}

impl CutsceneCamera {
    pub fn new(id: NetworkId, transform: Transform) -> Self {
        Self {
            core: PawnCore::new(id, PawnKind::CutsceneCamera, transform),
            camera_active: false,
        }
    }
}

impl Pawn for CutsceneCamera {
    fn core(&self) -> &PawnCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PawnCore {
        &mut self.core
    }

    fn bindings(&self) -> Option<Bindings> {
        None
    }

    fn on_possessed(&mut self, controller: &Controller) {
        self.core.attach(controller);
        self.camera_active = controller.is_local;
    }

    fn on_unpossessed(&mut self) {
        self.core.detach();
        self.camera_active = false;
    }
}

/// Builds the pawn variant for `kind`
pub fn spawn_pawn(id: NetworkId, kind: PawnKind, transform: Transform) -> Box<dyn Pawn> {
    match kind {
        PawnKind::Character => Box::new(Character::new(id, transform)),
        PawnKind::CameraRig => Box::new(CameraRig::new(id, transform)),
        PawnKind::Vehicle => Box::new(Vehicle::new(id, transform)),
        PawnKind::CutsceneCamera => Box::new(CutsceneCamera::new(id, transform)),
    }
}

/// A pawn in the local replica together with its cached capability
pub struct PawnEntry {
    pub pawn: Box<dyn Pawn>,
    pub bindings: Option<Bindings>,
}

impl PawnEntry {
    pub fn new(pawn: Box<dyn Pawn>) -> Self {
        let bindings = pawn.bindings();
        Self { pawn, bindings }
    }
}

pub type PawnTable = HashMap<NetworkId, PawnEntry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionPhase, ActionSet};
    use assert_approx_eq::assert_approx_eq;

    fn local_controller() -> Controller {
        Controller {
            agent: NetworkId(1),
            participant: Some(ParticipantId(1)),
            is_local: true,
        }
    }

    #[test]
    fn test_capabilities_per_kind() {
        let character = spawn_pawn(NetworkId(1), PawnKind::Character, Transform::default());
        let camera = spawn_pawn(NetworkId(2), PawnKind::CameraRig, Transform::default());
        let vehicle = spawn_pawn(NetworkId(3), PawnKind::Vehicle, Transform::default());
        let cutscene = spawn_pawn(NetworkId(4), PawnKind::CutsceneCamera, Transform::default());

        assert_eq!(character.bindings().unwrap().actions().len(), 4);
        assert_eq!(camera.bindings().unwrap().actions(), &[ACTION_LOOK]);
        assert_eq!(vehicle.bindings().unwrap().actions(), &[ACTION_MOVE, ACTION_FIRE]);
        assert!(cutscene.bindings().is_none());
        assert_eq!(vehicle.kind(), PawnKind::Vehicle);
    }

    #[test]
    fn test_bindings_write_input() {
        let actions = ActionSet::standard();
        let mut pawn = Character::new(NetworkId(1), Transform::default());
        let mut binder = InputBinder::new(actions.clone());

        assert_eq!(pawn.bindings().unwrap().bind(&mut binder), 4);

        actions.trigger(
            ACTION_MOVE,
            ActionPhase::Started,
            ActionValue::Axis { x: -1.0, y: 0.0 },
        );
        actions.trigger(ACTION_JUMP, ActionPhase::Started, ActionValue::Button(true));
        actions.trigger(
            ACTION_LOOK,
            ActionPhase::Active,
            ActionValue::Axis { x: 2.0, y: 0.0 },
        );
        actions.trigger(
            ACTION_LOOK,
            ActionPhase::Active,
            ActionValue::Axis { x: 3.0, y: 1.0 },
        );

        let input = pawn.take_input();
        assert_approx_eq!(input.move_x, -1.0);
        assert_approx_eq!(input.look_x, 5.0);
        assert!(input.jump);

        let after = pawn.input();
        assert!(!after.jump);
        assert_approx_eq!(after.look_x, 0.0);
        assert_approx_eq!(after.move_x, -1.0);

        actions.trigger(ACTION_MOVE, ActionPhase::Ended, ActionValue::Button(false));
        assert_approx_eq!(pawn.input().move_x, 0.0);
    }

    #[test]
    fn test_bindings_skip_missing_actions() {
        let actions = ActionSet::with_actions(&[ACTION_MOVE]);
        let pawn = Vehicle::new(NetworkId(3), Transform::default());
        let mut binder = InputBinder::new(actions);

        assert_eq!(pawn.bindings().unwrap().bind(&mut binder), 1);
    }

    #[test]
    fn test_hooks_track_controller() {
        let mut camera = CameraRig::new(NetworkId(5), Transform::default());

        camera.on_possessed(&local_controller());
        assert_eq!(camera.controller(), Some(NetworkId(1)));
        assert!(camera.camera_active);

        camera.on_unpossessed();
        assert_eq!(camera.controller(), None);
        assert!(!camera.camera_active);
    }

    #[test]
    fn test_remote_possession_keeps_camera_off() {
        let mut cutscene = CutsceneCamera::new(NetworkId(6), Transform::default());
        cutscene.on_possessed(&Controller {
            is_local: false,
            ..local_controller()
        });

        assert_eq!(cutscene.controller(), Some(NetworkId(1)));
        assert!(!cutscene.camera_active);
    }

    #[test]
    fn test_unpossess_clears_held_input() {
        let mut vehicle = Vehicle::new(NetworkId(3), Transform::default());
        vehicle.on_possessed(&local_controller());
        vehicle.core.input_handle().lock().unwrap().move_x = 1.0;

        vehicle.on_unpossessed();
        assert_approx_eq!(vehicle.input().move_x, 0.0);
        assert!(!vehicle.engine_running);
    }

    #[test]
    fn test_entry_caches_bindings() {
        let entry = PawnEntry::new(spawn_pawn(
            NetworkId(9),
            PawnKind::CutsceneCamera,
            Transform::default(),
        ));
        assert!(entry.bindings.is_none());
    }
}
