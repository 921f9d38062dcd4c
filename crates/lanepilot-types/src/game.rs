//! World snapshot types returned by the game server's `GET /observe`.
//!
//! The observation is the **only** information the policy receives about
//! the world. It is produced fresh for every think cycle and never merged
//! with a previous one.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::Entity;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A 2D coordinate in game-world units.
///
/// Serialized as a two-element array `[x, y]`, which is the shape both the
/// game server and the language model exchange.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position(pub f32, pub f32);

impl Position {
    /// Construct a position from its components.
    pub const fn new(x: f32, y: f32) -> Self {
        Self(x, y)
    }

    /// Horizontal component.
    pub const fn x(self) -> f32 {
        self.0
    }

    /// Vertical component.
    pub const fn y(self) -> f32 {
        self.1
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A minion visible to the controlled character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Minion {
    /// Handle used as an `Attack` target.
    pub entity: Entity,
    /// Current position.
    pub position: Position,
    /// Current health.
    pub health: f32,
}

/// A snapshot of the world as seen by the controlled character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Observation {
    /// Position of the controlled character.
    pub position: Position,
    /// Minions currently visible.
    #[serde(default)]
    pub minions: Vec<Minion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_parses_server_payload() {
        let raw = r#"{"position":[0,0],"minions":[{"entity":1,"position":[90,0],"health":50}]}"#;
        let obs: Observation = serde_json::from_str(raw).unwrap_or_else(|_| Observation {
            position: Position::default(),
            minions: Vec::new(),
        });

        assert_eq!(obs.minions.len(), 1);
        let minion = obs.minions.first();
        assert_eq!(minion.map(|m| m.entity), Some(Entity(1)));
        assert_eq!(minion.map(|m| m.position), Some(Position::new(90.0, 0.0)));
    }

    #[test]
    fn observation_without_minions_defaults_to_empty() {
        let obs: Result<Observation, _> = serde_json::from_str(r#"{"position":[1.5,-2]}"#);
        assert!(obs.is_ok());
        assert!(obs.map(|o| o.minions.is_empty()).unwrap_or(false));
    }

    #[test]
    fn position_serializes_as_pair() {
        let json = serde_json::to_string(&Position::new(120.0, 45.5)).ok();
        assert_eq!(json.as_deref(), Some("[120.0,45.5]"));
    }

}
