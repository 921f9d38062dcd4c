//! Pure building blocks of the lanepilot agent loop.
//!
//! Nothing in this crate performs I/O beyond reading the config file: the
//! network-facing pieces live in `lanepilot-runner`.
//!
//! # Modules
//!
//! - [`cadence`] -- Tick counter and the think/continue schedule.
//! - [`codec`] -- Tool catalog and tool call to [`Action`] mapping.
//! - [`config`] -- Configuration loading from `lanepilot.yaml` into
//!   strongly-typed structs.
//!
//! [`Action`]: lanepilot_types::Action

pub mod cadence;
pub mod codec;
pub mod config;

pub use cadence::{CadenceError, ThinkInterval, TickClock};
pub use codec::{DecodeError, ToolSpec};
pub use config::{ConfigError, PilotConfig};
