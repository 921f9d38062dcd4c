//! REST endpoint handlers.
//!
//! Read handlers clone the latest [`LoopSnapshot`] out of the loop's watch
//! channel. Control handlers call straight into the [`AgentLoop`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/state` | Current loop snapshot |
//! | `GET` | `/api/ticks` | Recent tick history |
//! | `POST` | `/api/start` | Start ticking |
//! | `POST` | `/api/stop` | Stop after the in-flight tick |
//! | `POST` | `/api/continue` | One bare step outside the cadence |
//! | `GET` | `/api/config` | Think interval and directive |
//! | `PUT` | `/api/config` | Update think interval and/or directive |
//!
//! [`LoopSnapshot`]: lanepilot_types::LoopSnapshot
//! [`AgentLoop`]: lanepilot_runner::AgentLoop

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use chrono::{DateTime, Utc};
use lanepilot_runner::{ChatBackend, GameApi};
use lanepilot_types::{LoopSettings, LoopSnapshot, TickOutcome, TickRecord};
use minijinja::Environment;
use tracing::info;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/ticks`.
#[derive(Debug, serde::Deserialize)]
pub struct TicksQuery {
    /// Return at most this many of the most recent ticks.
    pub limit: Option<usize>,
}

/// Response body for `GET /api/ticks`.
#[derive(Debug, serde::Serialize)]
pub struct TicksResponse {
    /// Number of records returned.
    pub count: usize,
    /// Records, oldest first.
    pub ticks: Vec<TickRecord>,
}

/// Request body for `PUT /api/config`. Omitted fields keep their value.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ConfigUpdate {
    /// New think interval; must be at least 1.
    pub think_interval: Option<u64>,
    /// New directive text.
    pub prompt: Option<String>,
}

impl ConfigUpdate {
    fn apply_to(self, current: LoopSettings) -> LoopSettings {
        LoopSettings {
            think_interval: self.think_interval.unwrap_or(current.think_interval),
            prompt: self.prompt.unwrap_or(current.prompt),
        }
    }
}

/// Response body for the control endpoints.
#[derive(Debug, serde::Serialize)]
pub struct ControlResponse {
    /// Whether the command changed anything.
    pub ok: bool,
    /// Human-readable result.
    pub message: String,
    /// Whether the loop is running after the command.
    pub running: bool,
    /// Tick counter after the command.
    pub tick: u64,
}

impl ControlResponse {
    fn new(ok: bool, message: &str, snapshot: &LoopSnapshot) -> Self {
        Self {
            ok,
            message: message.to_owned(),
            running: snapshot.running,
            tick: snapshot.tick,
        }
    }
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

/// `GET /` -- minimal HTML status page.
pub async fn index<G, B>(State(state): State<Arc<AppState<G, B>>>) -> Result<Html<String>, ObserverError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    Ok(Html(render_status_page(&state.agent.snapshot(), state.started_at)?))
}

/// `GET /api/state` -- the current snapshot.
pub async fn get_state<G, B>(State(state): State<Arc<AppState<G, B>>>) -> Json<LoopSnapshot>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    Json(state.agent.snapshot())
}

/// `GET /api/ticks` -- recent tick history, oldest first.
pub async fn get_ticks<G, B>(
    State(state): State<Arc<AppState<G, B>>>,
    Query(query): Query<TicksQuery>,
) -> Json<TicksResponse>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let mut ticks = state.agent.snapshot().history;
    if let Some(limit) = query.limit {
        let skip = ticks.len().saturating_sub(limit);
        ticks.drain(..skip);
    }
    Json(TicksResponse {
        count: ticks.len(),
        ticks,
    })
}

/// `GET /api/config` -- think interval and directive.
pub async fn get_config<G, B>(State(state): State<Arc<AppState<G, B>>>) -> Json<LoopSettings>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    Json(state.agent.settings())
}

// ---------------------------------------------------------------------------
// Control handlers
// ---------------------------------------------------------------------------

/// `POST /api/start` -- begin ticking from the current counter.
pub async fn start<G, B>(State(state): State<Arc<AppState<G, B>>>) -> Json<ControlResponse>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let started = state.agent.start();
    let message = if started { "loop started" } else { "loop already running" };
    info!(started, "start requested via API");
    Json(ControlResponse::new(started, message, &state.agent.snapshot()))
}

/// `POST /api/stop` -- stop after the in-flight tick.
pub async fn stop<G, B>(State(state): State<Arc<AppState<G, B>>>) -> Json<ControlResponse>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let stopped = state.agent.stop();
    let message = if stopped { "loop stopping" } else { "loop not running" };
    info!(stopped, "stop requested via API");
    Json(ControlResponse::new(stopped, message, &state.agent.snapshot()))
}

/// `POST /api/continue` -- one bare step, without advancing the counter.
///
/// Answers 502 when the game server cannot be reached.
pub async fn continue_once<G, B>(
    State(state): State<Arc<AppState<G, B>>>,
) -> Result<Json<ControlResponse>, ObserverError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    state.agent.dispatch_continue_only().await?;
    Ok(Json(ControlResponse::new(true, "step dispatched", &state.agent.snapshot())))
}

/// `PUT /api/config` -- validate, persist and apply new settings.
///
/// Answers 400 for a zero think interval.
pub async fn put_config<G, B>(
    State(state): State<Arc<AppState<G, B>>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<impl IntoResponse, ObserverError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let applied = state
        .agent
        .configure_with(|current| update.apply_to(current))
        .await?;
    Ok(Json(applied))
}

// ---------------------------------------------------------------------------
// Status page
// ---------------------------------------------------------------------------

/// The `.html` suffix turns on minijinja's HTML auto-escaping.
const STATUS_TEMPLATE_NAME: &str = "status.html";
const STATUS_TEMPLATE: &str = include_str!("../templates/status.html");

/// Number of history rows shown on the status page.
const STATUS_ROWS: usize = 10;

#[derive(serde::Serialize)]
struct StatusView {
    agent_id: String,
    started: String,
    status: &'static str,
    tick: u64,
    interval: u64,
    mode: String,
    action: String,
    outcome: &'static str,
    minions: usize,
    commentary: String,
    ticks: Vec<TickRow>,
}

#[derive(serde::Serialize)]
struct TickRow {
    tick: u64,
    mode: String,
    outcome: &'static str,
    action: String,
    tool: String,
    latency_ms: u64,
}

impl StatusView {
    fn new(snapshot: &LoopSnapshot, started_at: DateTime<Utc>) -> Self {
        let ticks = snapshot
            .history
            .iter()
            .rev()
            .take(STATUS_ROWS)
            .map(|record| TickRow {
                tick: record.tick,
                mode: record.mode.to_string(),
                outcome: record.outcome.label(),
                action: record.action.map_or_else(|| "-".to_owned(), |a| a.to_string()),
                tool: record
                    .tool_call
                    .as_ref()
                    .map_or_else(|| "-".to_owned(), |c| c.name.clone()),
                latency_ms: record.latency_ms,
            })
            .collect();

        Self {
            agent_id: snapshot.agent_id.to_string(),
            started: started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            status: if snapshot.running { "running" } else { "stopped" },
            tick: snapshot.tick,
            interval: snapshot.think_interval,
            mode: snapshot.mode.map_or_else(|| "-".to_owned(), |m| m.to_string()),
            action: snapshot.action.map_or_else(|| "none".to_owned(), |a| a.to_string()),
            outcome: snapshot.last_outcome.as_ref().map_or("-", TickOutcome::label),
            minions: snapshot.observation.as_ref().map_or(0, |o| o.minions.len()),
            commentary: snapshot.commentary.text(),
            ticks,
        }
    }
}

fn render_status_page(snapshot: &LoopSnapshot, started_at: DateTime<Utc>) -> Result<String, ObserverError> {
    let mut env = Environment::new();
    env.add_template(STATUS_TEMPLATE_NAME, STATUS_TEMPLATE)
        .map_err(|e| ObserverError::Internal(format!("status template: {e}")))?;
    env.get_template(STATUS_TEMPLATE_NAME)
        .and_then(|t| t.render(StatusView::new(snapshot, started_at)))
        .map_err(|e| ObserverError::Internal(format!("status page render failed: {e}")))
}
