//! Control and observation API for a lanepilot agent loop.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Control endpoints** (`/api/start`, `/api/stop`, `/api/continue`,
//!   `/api/config`) that drive an [`AgentLoop`]
//! - **Read endpoints** (`/api/state`, `/api/ticks`) returning the loop's
//!   latest [`LoopSnapshot`]
//! - **`WebSocket` endpoint** (`/ws/state`) pushing every snapshot change
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The loop is the single writer of its snapshot and publishes it through a
//! [`tokio::sync::watch`] channel. Every read here is a clone of the latest
//! value, so the API never holds the tick gate while serving a request.
//! Only `/api/continue` waits for the gate, because it dispatches a step.
//!
//! [`AgentLoop`]: lanepilot_runner::AgentLoop
//! [`LoopSnapshot`]: lanepilot_types::LoopSnapshot

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, spawn_server, start_server};
pub use state::AppState;
