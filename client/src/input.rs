//! Keyboard sampling turned into action transitions

use crate::actions::{ActionPhase, ActionSet, ActionValue};
use macroquad::prelude::*;
use shared::{ACTION_FIRE, ACTION_JUMP, ACTION_LOOK, ACTION_MOVE};

/// Degrees of yaw per frame while a look key is held
const LOOK_STEP: f32 = 3.0;

/// Device state sampled for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawInput {
    pub move_x: f32,
    pub move_y: f32,
    pub look_x: f32,
    pub jump: bool,
    pub fire: bool,
}

/// Non-gameplay keys pressed this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub cycle_possession: bool,
    pub release: bool,
    pub reconnect: bool,
}

/// Turns consecutive samples into started/active/ended transitions
#[derive(Debug, Default)]
pub struct ActionDriver {
    previous: RawInput,
}

impl ActionDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drive(&mut self, actions: &ActionSet, raw: RawInput) {
        let prev = self.previous;

        Self::drive_axis(
            actions,
            ACTION_MOVE,
            (prev.move_x, prev.move_y),
            (raw.move_x, raw.move_y),
        );
        Self::drive_axis(actions, ACTION_LOOK, (prev.look_x, 0.0), (raw.look_x, 0.0));
        Self::drive_button(actions, ACTION_JUMP, prev.jump, raw.jump);
        Self::drive_button(actions, ACTION_FIRE, prev.fire, raw.fire);

        self.previous = raw;
    }

    fn drive_axis(actions: &ActionSet, name: &str, prev: (f32, f32), now: (f32, f32)) {
        let was_active = prev != (0.0, 0.0);
        let is_active = now != (0.0, 0.0);
        let value = ActionValue::Axis { x: now.0, y: now.1 };

        if is_active && !was_active {
            actions.trigger(name, ActionPhase::Started, value);
        }
        if is_active {
            actions.trigger(name, ActionPhase::Active, value);
        }
        if !is_active && was_active {
            actions.trigger(name, ActionPhase::Ended, value);
        }
    }

    fn drive_button(actions: &ActionSet, name: &str, prev: bool, now: bool) {
        if now && !prev {
            actions.trigger(name, ActionPhase::Started, ActionValue::Button(true));
        }
        if now {
            actions.trigger(name, ActionPhase::Active, ActionValue::Button(true));
        }
        if !now && prev {
            actions.trigger(name, ActionPhase::Ended, ActionValue::Button(false));
        }
    }
}

fn axis(negative: bool, positive: bool) -> f32 {
    match (negative, positive) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    }
}

/// Samples the keyboard every frame and feeds the action set
pub struct InputManager {
    driver: ActionDriver,

    // Previous frame key states for edge detection
    prev_key_tab: bool,
    prev_key_backspace: bool,
    prev_key_r: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            driver: ActionDriver::new(),
            prev_key_tab: false,
            prev_key_backspace: false,
            prev_key_r: false,
        }
    }

    /// Samples the devices, drives `actions` and returns control key presses
    pub fn update(&mut self, actions: &ActionSet) -> Controls {
        let left = is_key_down(KeyCode::A) || is_key_down(KeyCode::Left);
        let right = is_key_down(KeyCode::D) || is_key_down(KeyCode::Right);
        let up = is_key_down(KeyCode::W) || is_key_down(KeyCode::Up);
        let down = is_key_down(KeyCode::S) || is_key_down(KeyCode::Down);

        let raw = RawInput {
            move_x: axis(left, right),
            move_y: axis(up, down),
            look_x: axis(is_key_down(KeyCode::Q), is_key_down(KeyCode::E)) * LOOK_STEP,
            jump: is_key_down(KeyCode::Space),
            fire: is_key_down(KeyCode::F) || is_mouse_button_down(MouseButton::Left),
        };
        self.driver.drive(actions, raw);

        let key_tab = is_key_down(KeyCode::Tab);
        let key_backspace = is_key_down(KeyCode::Backspace);
        let key_r = is_key_down(KeyCode::R);

        let controls = Controls {
            cycle_possession: key_tab && !self.prev_key_tab,
            release: key_backspace && !self.prev_key_backspace,
            reconnect: key_r && !self.prev_key_r,
        };

        self.prev_key_tab = key_tab;
        self.prev_key_backspace = key_backspace;
        self.prev_key_r = key_r;

        controls
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
