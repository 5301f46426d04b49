use crate::agent::PossessionState;
use crate::game::ClientWorld;
use crate::pawn::Pawn;
use macroquad::prelude::*;
use shared::{NetworkId, PawnKind, FLOOR_Y, PAWN_SIZE};

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub fake_ping_ms: u64,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Renderer {
            width: width as f32,
            height: height as f32,
        })
    }

    pub fn render(&mut self, world: &ClientWorld, config: RenderConfig) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_floor();

        let local_agent = world.local_agent().map(|agent| agent.id());

        for pawn in world.pawns() {
            let outline = match pawn.controller() {
                Some(agent) if Some(agent) == local_agent => GREEN,
                Some(_) => Color::from_rgba(255, 68, 68, 255),
                None => Color::from_rgba(136, 136, 136, 255),
            };

            self.draw_pawn(pawn, outline);
            self.draw_heading(pawn);
            self.draw_controller_id(pawn);
        }

        let state = world
            .local_agent()
            .map_or(PossessionState::Idle, |agent| agent.state());
        self.draw_ui(world, state, config);
    }

    fn draw_floor(&mut self) {
        draw_rectangle(
            0.0,
            FLOOR_Y,
            self.width,
            self.height - FLOOR_Y,
            Color::from_rgba(68, 68, 68, 255),
        );
    }

    fn kind_color(kind: PawnKind) -> Color {
        match kind {
            PawnKind::Character => Color::from_rgba(0, 170, 255, 255),
            PawnKind::CameraRig => Color::from_rgba(170, 85, 255, 255),
            PawnKind::Vehicle => Color::from_rgba(255, 170, 0, 255),
            PawnKind::CutsceneCamera => Color::from_rgba(85, 85, 85, 255),
        }
    }

    fn draw_pawn(&mut self, pawn: &dyn Pawn, outline: Color) {
        let transform = pawn.transform();
        draw_rectangle(
            transform.x,
            transform.y,
            PAWN_SIZE,
            PAWN_SIZE,
            Self::kind_color(pawn.kind()),
        );
        draw_rectangle_lines(transform.x, transform.y, PAWN_SIZE, PAWN_SIZE, 2.0, outline);
    }

    fn draw_heading(&mut self, pawn: &dyn Pawn) {
        let transform = pawn.transform();
        let center_x = transform.x + PAWN_SIZE / 2.0;
        let center_y = transform.y + PAWN_SIZE / 2.0;
        let yaw = transform.yaw.to_radians();
        let length = PAWN_SIZE * 0.75;

        draw_line(
            center_x,
            center_y,
            center_x + yaw.cos() * length,
            center_y + yaw.sin() * length,
            2.0,
            YELLOW,
        );
    }

    fn draw_controller_id(&mut self, pawn: &dyn Pawn) {
        let Some(NetworkId(agent)) = pawn.controller() else {
            return;
        };
        let id_color = match agent % 8 {
            0 => WHITE,
            1 => RED,
            2 => GREEN,
            3 => BLUE,
            4 => YELLOW,
            5 => MAGENTA,
            6 => Color::from_rgba(0, 255, 255, 255),
            _ => Color::from_rgba(136, 136, 136, 255),
        };

        let transform = pawn.transform();
        let id_x = transform.x + PAWN_SIZE / 2.0 - 2.0;
        let id_y = transform.y - 8.0;

        draw_rectangle(id_x, id_y, 4.0, 4.0, id_color);
    }

    fn draw_ui(&mut self, world: &ClientWorld, state: PossessionState, config: RenderConfig) {
        let y_start = 10.0;

        let connection_color = if world.is_connected() { GREEN } else { RED };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        let connection_text = match world.local_id() {
            Some(id) => format!("{} in {}", id, world.scene()),
            None => "offline".to_string(),
        };
        draw_text(&connection_text, 24.0, y_start + 8.0, 14.0, WHITE);

        let state_color = match state {
            PossessionState::Idle => Color::from_rgba(136, 136, 136, 255),
            PossessionState::Possessing(_) => YELLOW,
            PossessionState::Possessed(_) => GREEN,
        };
        draw_rectangle(10.0, y_start + 18.0, 8.0, 8.0, state_color);
        draw_text(&state.to_string(), 24.0, y_start + 26.0, 14.0, WHITE);

        let info = format!(
            "{} pawns, {} agents, fake ping {}ms",
            world.pawns().len(),
            world.agent_count(),
            config.fake_ping_ms
        );
        draw_text(&info, 10.0, y_start + 44.0, 14.0, WHITE);
        draw_text(
            "Tab: next pawn  Backspace: release  R: reconnect",
            10.0,
            self.height - 10.0,
            14.0,
            Color::from_rgba(170, 170, 170, 255),
        );
    }
}
