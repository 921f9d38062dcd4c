//! Agent runtime for lanepilot: game I/O, streamed LLM decisions, and the
//! cadence-driven tick loop.
//!
//! # Modules
//!
//! - [`agent`] -- [`AgentLoop`], the start/stop-able tick loop.
//! - [`config`] -- Chat backend selection from the YAML config.
//! - [`error`] -- [`RunnerError`], shared by every module here.
//! - [`game`] -- [`GameApi`] and its HTTP client.
//! - [`llm`] -- [`ChatBackend`] and the Ollama / `OpenAI`-compatible backends.
//! - [`policy`] -- One streamed decision per think tick.
//! - [`prompt`] -- Prompt rendering with `minijinja`.
//! - [`settings`] -- Persistence of think interval and directive.
//! - [`stream`] -- NDJSON and SSE chunk parsers.
//!
//! [`AgentLoop`]: agent::AgentLoop
//! [`RunnerError`]: error::RunnerError
//! [`GameApi`]: game::GameApi
//! [`ChatBackend`]: llm::ChatBackend

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod llm;
pub mod policy;
pub mod prompt;
pub mod settings;
pub mod stream;

pub use agent::AgentLoop;
pub use error::RunnerError;
pub use game::{GameApi, GameClient};
pub use llm::{ChatBackend, LlmBackend};
pub use policy::{Decision, PolicyClient};
