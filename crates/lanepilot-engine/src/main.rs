//! Host binary for lanepilot.
//!
//! Wires the game client, chat backend, prompt engine and settings store
//! into an [`AgentLoop`], serves the control API beside it, and runs until
//! interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`LANEPILOT_CONFIG`, default `lanepilot.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the game client and chat backend
//! 4. Restore loop settings and create the agent loop
//! 5. Start the control API
//! 6. Start ticking if `agent.autostart` is set
//! 7. Wait for Ctrl-C, then stop after the in-flight tick

mod error;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use lanepilot_core::PilotConfig;
use lanepilot_core::config::LoggingConfig;
use lanepilot_observer::{AppState, ServerConfig};
use lanepilot_runner::config::{LlmBackendConfig, decision_timeout};
use lanepilot_runner::llm::create_backend;
use lanepilot_runner::prompt::PromptEngine;
use lanepilot_runner::settings::SettingsStore;
use lanepilot_runner::{AgentLoop, ChatBackend, GameApi, GameClient, PolicyClient};
use lanepilot_types::LoopSettings;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// How long shutdown waits for an in-flight tick to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration. Logging is not up yet, so a failure here is
    //    reported through the returned error only.
    let config = PilotConfig::load()
        .map_err(EngineError::from)
        .context("loading configuration")?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging)?;
    info!(
        game = config.game.base_url,
        backend = config.llm.backend,
        model = config.llm.model,
        think_interval = config.agent.think_interval,
        "lanepilot starting"
    );

    // 3. Game client and chat backend.
    let game = GameClient::new(&config.game).map_err(EngineError::from)?;
    let backend_config = LlmBackendConfig::from_config(&config.llm).map_err(EngineError::from)?;
    let backend = create_backend(&backend_config);
    info!(
        backend = backend.name(),
        api_url = backend_config.api_url,
        model = backend_config.model,
        "chat backend ready"
    );
    let policy = PolicyClient::new(backend, decision_timeout(&config.llm));

    // 4. Agent loop with restored settings.
    let prompts = PromptEngine::from_config(config.agent.prompt_template.as_deref())
        .map_err(EngineError::from)
        .context("loading prompt template")?;
    let store = SettingsStore::new(&config.agent.settings_path);
    let defaults = LoopSettings {
        think_interval: config.agent.think_interval,
        prompt: config.agent.prompt.clone(),
    };
    let agent = Arc::new(
        AgentLoop::new(game, policy, prompts, store, &defaults)
            .map_err(EngineError::from)?
            .with_error_backoff(Duration::from_millis(config.agent.error_backoff_ms)),
    );
    let settings = agent.settings();
    info!(
        agent_id = %agent.id(),
        think_interval = settings.think_interval,
        settings_path = config.agent.settings_path,
        "agent loop created"
    );

    // 5. Control API.
    let server_config = ServerConfig::from(&config.observer);
    let (addr, server) = lanepilot_observer::spawn_server(&server_config, Arc::new(AppState::new(Arc::clone(&agent))))
        .await
        .map_err(EngineError::from)?;
    info!(%addr, "control API started");

    // 6. Autostart.
    if config.agent.autostart {
        agent.start();
    } else {
        info!("waiting for POST /api/start");
    }

    // 7. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("interrupt received, shutting down");

    agent.stop();
    wait_for_idle(&agent).await;
    server.abort();

    let snapshot = agent.snapshot();
    info!(
        tick = snapshot.tick,
        ticks_recorded = snapshot.history.len(),
        "lanepilot shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides `logging.level`.
fn init_tracing(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

/// Give an in-flight tick a bounded chance to dispatch.
async fn wait_for_idle<G, B>(agent: &AgentLoop<G, B>)
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    if tokio::time::timeout(SHUTDOWN_GRACE, agent.wait_idle()).await.is_err() {
        warn!(
            grace_ms = u64::try_from(SHUTDOWN_GRACE.as_millis()).unwrap_or(u64::MAX),
            "in-flight tick did not finish before shutdown"
        );
    }
}
