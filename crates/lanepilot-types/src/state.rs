//! Externally observable loop state.
//!
//! The agent loop publishes a [`LoopSnapshot`] after every mutation. Hosts
//! (the control API, a dashboard) only ever read these snapshots; the loop
//! is the single writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::actions::{Action, ToolCall};
use crate::game::Observation;
use crate::ids::AgentId;

/// Number of completed ticks retained in [`LoopSnapshot::history`].
pub const HISTORY_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Commentary
// ---------------------------------------------------------------------------

/// Which part of the model's output a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum FragmentKind {
    /// Reasoning ("thinking") text.
    Reasoning,
    /// Regular assistant content.
    Content,
}

/// One incremental piece of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Fragment {
    /// Origin of the text.
    pub kind: FragmentKind,
    /// The text delta.
    pub text: String,
}

impl Fragment {
    /// A reasoning fragment.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Reasoning,
            text: text.into(),
        }
    }

    /// A content fragment.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Content,
            text: text.into(),
        }
    }
}

/// Append-only text produced while a think cycle is in flight.
///
/// Display only. Nothing in action selection reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Commentary {
    /// Fragments in arrival order.
    pub fragments: Vec<Fragment>,
}

impl Commentary {
    /// Append a fragment.
    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Drop all fragments.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    /// Whether no fragment has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenated text of every fragment.
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    /// Concatenated text of fragments of one kind.
    pub fn text_of(&self, kind: FragmentKind) -> String {
        self.fragments
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.text.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

/// What a tick does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TickMode {
    /// Observe, ask the policy, act.
    Think,
    /// Advance the game clock without a new decision.
    Continue,
}

impl core::fmt::Display for TickMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Think => f.write_str("think"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TickOutcome {
    /// Continue tick: bare step sent.
    Continued,
    /// Think tick: the chosen action was dispatched.
    Acted,
    /// Think tick: the policy chose nothing, bare step sent.
    Idled,
    /// Think tick failed somewhere; bare step sent instead.
    FellBack {
        /// Why the think branch was abandoned.
        reason: String,
    },
    /// Even the bare step could not be delivered.
    DispatchFailed {
        /// The transport error.
        reason: String,
    },
}

impl TickOutcome {
    /// Short label for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Continued => "continued",
            Self::Acted => "acted",
            Self::Idled => "idled",
            Self::FellBack { .. } => "fell_back",
            Self::DispatchFailed { .. } => "dispatch_failed",
        }
    }
}

/// Summary of one completed tick, kept in the snapshot history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickRecord {
    /// Tick number.
    pub tick: u64,
    /// Mode the tick ran in.
    pub mode: TickMode,
    /// How it ended.
    pub outcome: TickOutcome,
    /// Action dispatched, if any.
    pub action: Option<Action>,
    /// The dispatched action in tool-call form, as the model would have
    /// selected it.
    pub tool_call: Option<ToolCall>,
    /// Wall-clock duration of the whole tick.
    #[ts(type = "number")]
    pub latency_ms: u64,
    /// When the tick finished.
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Settings and snapshot
// ---------------------------------------------------------------------------

/// The user-adjustable part of the loop; the only state that survives a
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LoopSettings {
    /// A tick is a think tick iff `tick % think_interval == 0`.
    #[ts(type = "number")]
    pub think_interval: u64,
    /// Static directive text appended to every observation.
    pub prompt: String,
}

/// Read-only view of an agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LoopSnapshot {
    /// Which loop instance this is.
    pub agent_id: AgentId,
    /// Current tick counter (next tick to run).
    #[ts(type = "number")]
    pub tick: u64,
    /// Current think interval.
    #[ts(type = "number")]
    pub think_interval: u64,
    /// Current directive text.
    pub prompt: String,
    /// Whether the loop is scheduled to keep ticking.
    pub running: bool,
    /// Mode of the tick in flight, or of the last tick.
    pub mode: Option<TickMode>,
    /// Most recent observation.
    pub observation: Option<Observation>,
    /// Most recent decision.
    pub action: Option<Action>,
    /// Commentary of the current tick.
    pub commentary: Commentary,
    /// Outcome of the last completed tick.
    pub last_outcome: Option<TickOutcome>,
    /// Recently completed ticks, oldest first.
    pub history: Vec<TickRecord>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl LoopSnapshot {
    /// A fresh snapshot: tick 0, idle, nothing observed.
    pub fn new(agent_id: AgentId, settings: &LoopSettings) -> Self {
        Self {
            agent_id,
            tick: 0,
            think_interval: settings.think_interval,
            prompt: settings.prompt.clone(),
            running: false,
            mode: None,
            observation: None,
            action: None,
            commentary: Commentary::default(),
            last_outcome: None,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Current settings as stored in the snapshot.
    pub fn settings(&self) -> LoopSettings {
        LoopSettings {
            think_interval: self.think_interval,
            prompt: self.prompt.clone(),
        }
    }

    /// Append a tick record, evicting the oldest beyond [`HISTORY_CAPACITY`].
    pub fn record(&mut self, record: TickRecord) {
        if self.history.len() >= HISTORY_CAPACITY {
            let excess = self
                .history
                .len()
                .saturating_sub(HISTORY_CAPACITY)
                .saturating_add(1);
            self.history.drain(..excess);
        }
        self.history.push(record);
    }
}
