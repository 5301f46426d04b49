//! Authority configuration

use shared::{
    ParseError, PawnKind, Transform, ORPHAN_RETRY_ATTEMPTS, ORPHAN_RETRY_INTERVAL_MS, WORLD_WIDTH,
};
use std::str::FromStr;
use std::time::Duration;

/// An uncontrolled pawn placed in the world when the server starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropSpec {
    pub kind: PawnKind,
    pub transform: Transform,
}

/// Parses `kind@x,y` or `kind@x,y,yaw`
impl FromStr for PropSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, transform) = s
            .split_once('@')
            .ok_or_else(|| ParseError::Prop(s.to_string()))?;

        Ok(PropSpec {
            kind: kind.parse()?,
            transform: transform.parse()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
    /// Spawn points used round robin; empty means `default_spawn`
    pub spawn_points: Vec<Transform>,
    pub default_spawn: Transform,
    /// Kind of pawn spawned for a participant that loads the scene
    pub pawn_kind: PawnKind,
    /// When false, a leaving participant's pawn stays in the world and is
    /// handed back if the participant resumes
    pub destroy_on_disconnect: bool,
    pub orphan_retry_attempts: u32,
    pub orphan_retry_interval: Duration,
    pub props: Vec<PropSpec>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_duration: Duration::from_millis(16),
            max_clients: 16,
            client_timeout: Duration::from_secs(5),
            spawn_points: Vec::new(),
            default_spawn: Transform::on_floor(WORLD_WIDTH / 2.0),
            pawn_kind: PawnKind::Character,
            destroy_on_disconnect: true,
            orphan_retry_attempts: ORPHAN_RETRY_ATTEMPTS,
            orphan_retry_interval: Duration::from_millis(ORPHAN_RETRY_INTERVAL_MS),
            props: Vec::new(),
        }
    }
}
