//! Control API server lifecycle.
//!
//! [`start_server`] binds and serves until the process ends;
//! [`spawn_server`] does the same on a background task so the engine can
//! run it beside the agent loop.

use std::net::SocketAddr;
use std::sync::Arc;

use lanepilot_core::config::ObserverConfig;
use lanepilot_runner::{ChatBackend, GameApi};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::router::build_router;
use crate::state::AppState;

/// Address the server binds to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

impl From<&ObserverConfig> for ServerConfig {
    fn from(config: &ObserverConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

impl ServerConfig {
    /// Parse host and port into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is malformed.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address {}:{}: {e}", self.host, self.port)))
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind and serve the control API until the process ends.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server<G, B>(config: &ServerConfig, state: Arc<AppState<G, B>>) -> Result<(), ServerError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    serve(listener, state).await
}

/// Bind eagerly, then serve on a background task.
///
/// Binding before spawning surfaces a taken port to the caller instead of
/// only to the log.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is malformed or taken.
pub async fn spawn_server<G, B>(
    config: &ServerConfig,
    state: Arc<AppState<G, B>>,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            error!(error = %e, "control API exited with error");
        }
    });

    Ok((local, handle))
}

async fn serve<G, B>(listener: TcpListener, state: Arc<AppState<G, B>>) -> Result<(), ServerError>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "control API listening");
    }
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))
}
