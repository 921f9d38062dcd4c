//! Actions the agent can issue and the untyped tool calls they come from.
//!
//! The game server accepts exactly two commands on `POST /step`. Choosing
//! to do nothing is not a third command: it is the absence of an
//! [`Action`] (`Option::None`), and the loop then sends a bare step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::game::Position;
use crate::ids::Entity;

/// A typed game command.
///
/// Serialized externally tagged, which is the exact `/step` body the game
/// server expects: `{"Move":[x,y]}` or `{"Attack":entity}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Action {
    /// Walk towards a world position.
    Move(Position),
    /// Basic-attack the given entity.
    Attack(Entity),
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Move(pos) => write!(f, "Move([{}, {}])", pos.x(), pos.y()),
            Self::Attack(entity) => write!(f, "Attack({entity})"),
        }
    }
}

/// A function-style invocation emitted by a chat backend.
///
/// This is the untyped form produced before decoding into an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ToolCall {
    /// Tool name as declared in the catalog.
    pub name: String,
    /// Structured arguments.
    #[serde(default)]
    pub arguments: BTreeMap<String, serde_json::Value>,
}

impl ToolCall {
    /// Create a tool call with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Add an argument, builder style.
    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}
