//! Action codec: tool calls to typed actions and back.
//!
//! The policy backend selects an action by calling one of the tools in
//! [`tool_catalog`]. This module owns that catalog and the mapping between
//! a raw [`ToolCall`] and an [`Action`]. It is a pure mapping with no side
//! effects.
//!
//! Decoding distinguishes three results:
//!
//! - `Ok(Some(action))` -- a recognized action with well-formed arguments
//! - `Ok(None)` -- the declared idle tool (`Nothing`), a legitimate choice
//! - `Err(DecodeError)` -- unknown tool or malformed arguments
//!
//! The loop treats the last two identically (a bare step), but logs the
//! error case.

use lanepilot_types::{Action, Entity, Position, ToolCall};
use serde_json::{Value, json};

/// Tool name for [`Action::Attack`].
pub const ATTACK_TOOL: &str = "Attack";

/// Tool name for [`Action::Move`].
pub const MOVE_TOOL: &str = "Move";

/// Tool name for the explicit idle choice.
pub const NOTHING_TOOL: &str = "Nothing";

/// Errors produced when a tool call cannot be turned into an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A required argument is absent.
    #[error("{tool} requires '{argument}' argument")]
    MissingArgument {
        /// Tool being decoded.
        tool: &'static str,
        /// Name of the missing argument.
        argument: &'static str,
    },

    /// An argument is present but has the wrong shape.
    #[error("invalid '{argument}' for {tool}: {reason}")]
    InvalidArgument {
        /// Tool being decoded.
        tool: &'static str,
        /// Name of the offending argument.
        argument: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The tool name is not in the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The unrecognized name.
        name: String,
    },
}

/// A tool declaration offered to the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: &'static str,
    /// Human-readable description shown to the model.
    pub description: &'static str,
    /// JSON-schema object describing the arguments, if any.
    pub parameters: Option<Value>,
}

impl ToolSpec {
    /// Render in the `{"type":"function","function":{...}}` envelope shared
    /// by Ollama and OpenAI-compatible chat APIs.
    pub fn to_function_json(&self) -> Value {
        let mut function = json!({
            "name": self.name,
            "description": self.description,
        });
        if let (Some(params), Some(obj)) = (&self.parameters, function.as_object_mut()) {
            obj.insert(String::from("parameters"), params.clone());
        }
        json!({ "type": "function", "function": function })
    }
}

/// The fixed tool catalog: `Attack`, `Move`, `Nothing`.
pub fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: ATTACK_TOOL,
            description: "Basic attack the target",
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "entity": { "type": "number", "description": "Target entity ID" }
                },
                "required": ["entity"]
            })),
        },
        ToolSpec {
            name: MOVE_TOOL,
            description: "Move to specified coordinates",
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "position": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Target position, format: [x, y]"
                    }
                },
                "required": ["position"]
            })),
        },
        ToolSpec {
            name: NOTHING_TOOL,
            description: "Do nothing",
            parameters: None,
        },
    ]
}

/// Decode a tool call into an action.
///
/// # Errors
///
/// Returns [`DecodeError`] for unknown tools and malformed arguments.
pub fn decode(call: &ToolCall) -> Result<Option<Action>, DecodeError> {
    match call.name.as_str() {
        ATTACK_TOOL => {
            let raw = call.arguments.get("entity").ok_or(DecodeError::MissingArgument {
                tool: ATTACK_TOOL,
                argument: "entity",
            })?;
            let entity = parse_entity(raw)?;
            Ok(Some(Action::Attack(entity)))
        }
        MOVE_TOOL => {
            let raw = call
                .arguments
                .get("position")
                .ok_or(DecodeError::MissingArgument {
                    tool: MOVE_TOOL,
                    argument: "position",
                })?;
            let position = parse_position(raw)?;
            Ok(Some(Action::Move(position)))
        }
        NOTHING_TOOL => Ok(None),
        other => Err(DecodeError::UnknownTool {
            name: other.to_owned(),
        }),
    }
}

/// Encode an action as the tool call that would select it.
pub fn encode(action: &Action) -> ToolCall {
    match action {
        Action::Attack(entity) => ToolCall::named(ATTACK_TOOL).with_argument("entity", json!(entity.get())),
        Action::Move(pos) => ToolCall::named(MOVE_TOOL).with_argument("position", json!([pos.x(), pos.y()])),
    }
}

/// Entity handles must be non-negative integers. Integral floats (`1.0`)
/// are accepted since some models emit every number as a float.
fn parse_entity(raw: &Value) -> Result<Entity, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidArgument {
        tool: ATTACK_TOOL,
        argument: "entity",
        reason,
    };

    if let Some(id) = raw.as_u64() {
        return Ok(Entity(id));
    }

    let float = raw
        .as_f64()
        .ok_or_else(|| invalid(format!("expected a number, got {raw}")))?;

    if float.fract() != 0.0 || float < 0.0 || !float.is_finite() {
        return Err(invalid(format!("expected a non-negative integer, got {float}")));
    }

    as_entity(float).ok_or_else(|| invalid(format!("out of range: {float}")))
}

/// `2^64` as a float; every integral value below it fits a `u64`.
const ENTITY_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// Integral, non-negative, finite input only.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_entity(float: f64) -> Option<Entity> {
    (float < ENTITY_LIMIT).then(|| Entity(float as u64))
}

/// Positions must be arrays of exactly two numbers.
fn parse_position(raw: &Value) -> Result<Position, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidArgument {
        tool: MOVE_TOOL,
        argument: "position",
        reason,
    };

    let items = raw
        .as_array()
        .ok_or_else(|| invalid(format!("expected [x, y], got {raw}")))?;

    match items.as_slice() {
        [x, y] => {
            let x = as_coordinate(x).ok_or_else(|| invalid(format!("x is not a number: {x}")))?;
            let y = as_coordinate(y).ok_or_else(|| invalid(format!("y is not a number: {y}")))?;
            Ok(Position::new(x, y))
        }
        other => Err(invalid(format!("expected 2 elements, got {}", other.len()))),
    }
}

/// World coordinates are `f32`; anything a model emits fits.
#[allow(clippy::cast_possible_truncation)]
fn as_coordinate(value: &Value) -> Option<f32> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .map(|v| v as f32)
}
