//! Shared type definitions for the lanepilot agent loop.
//!
//! This crate is the single source of truth for the values that cross
//! component boundaries: what the game server reports, what the policy
//! selects, and what the loop exposes to its host. Types flow downstream
//! to `TypeScript` via `ts-rs` for the control dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Entity handles and agent instance identifiers
//! - [`game`] -- Positions and observation snapshots
//! - [`actions`] -- Typed actions and raw tool calls
//! - [`state`] -- Commentary, tick records, and the observable loop snapshot

pub mod actions;
pub mod game;
pub mod ids;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use actions::{Action, ToolCall};
pub use game::{Minion, Observation, Position};
pub use ids::{AgentId, Entity};
pub use state::{
    Commentary, Fragment, FragmentKind, HISTORY_CAPACITY, LoopSettings, LoopSnapshot, TickMode,
    TickOutcome, TickRecord,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files under `bindings/` relative to the crate
        // root when `export_all` is invoked.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::Entity::export_all();
        let _ = crate::ids::AgentId::export_all();

        // Game
        let _ = crate::game::Position::export_all();
        let _ = crate::game::Minion::export_all();
        let _ = crate::game::Observation::export_all();

        // Actions
        let _ = crate::actions::Action::export_all();
        let _ = crate::actions::ToolCall::export_all();

        // State
        let _ = crate::state::FragmentKind::export_all();
        let _ = crate::state::Fragment::export_all();
        let _ = crate::state::Commentary::export_all();
        let _ = crate::state::TickMode::export_all();
        let _ = crate::state::TickOutcome::export_all();
        let _ = crate::state::TickRecord::export_all();
        let _ = crate::state::LoopSettings::export_all();
        let _ = crate::state::LoopSnapshot::export_all();
    }
}
