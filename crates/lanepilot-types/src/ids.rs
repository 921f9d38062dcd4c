//! Identifier types.
//!
//! [`Entity`] is the game server's opaque numeric handle for anything that
//! can be targeted (the controlled character, minions). [`AgentId`] names
//! one running agent loop instance so that several loops can log and be
//! observed side by side.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Opaque numeric identifier for an addressable game object.
///
/// The game server owns the numbering; the agent only passes these values
/// back as action targets. Serialized as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct Entity(#[ts(type = "number")] pub u64);

impl Entity {
    /// Return the raw numeric handle.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for Entity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Entity {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Unique identifier for one agent loop instance.
///
/// Uses UUID v7 (time-ordered) so log lines from consecutive runs sort
/// naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AgentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AgentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_serializes_as_bare_number() {
        let json = serde_json::to_string(&Entity(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));

        let parsed: Result<Entity, _> = serde_json::from_str("42");
        assert_eq!(parsed.ok(), Some(Entity(42)));
    }

    #[test]
    fn agent_ids_are_unique() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn agent_id_display_matches_uuid() {
        let id = AgentId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
