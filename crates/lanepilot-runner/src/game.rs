//! Game server client.
//!
//! The game server exposes two calls the loop needs: `GET /observe` for a
//! snapshot of the world and `POST /step` to advance the simulation by one
//! step, optionally applying an action. Every call is a single attempt:
//! no retry, no caching. Failures are reported as
//! [`RunnerError::Transport`] and handled by the loop at the tick boundary.

use std::future::Future;
use std::time::Duration;

use lanepilot_core::config::GameConfig;
use lanepilot_types::{Action, Observation};

use crate::error::RunnerError;

/// The two game server operations the loop depends on.
pub trait GameApi: Send + Sync {
    /// Fetch the current observation.
    fn observe(&self) -> impl Future<Output = Result<Observation, RunnerError>> + Send;

    /// Advance the game by one step, applying `action` if present.
    fn step(&self, action: Option<&Action>) -> impl Future<Output = Result<(), RunnerError>> + Send;
}

/// `reqwest` implementation of [`GameApi`].
pub struct GameClient {
    client: reqwest::Client,
    base_url: String,
}

impl GameClient {
    /// Create a client for the configured game server.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &GameConfig) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| RunnerError::Config(format!("failed to build game HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Turn a non-2xx response into a transport failure carrying status and body.
async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response, RunnerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_owned());
    Err(RunnerError::Transport(format!("{what} returned {status}: {body}")))
}

impl GameApi for GameClient {
    async fn observe(&self) -> Result<Observation, RunnerError> {
        let response = self
            .client
            .get(self.url("/observe"))
            .send()
            .await
            .map_err(|e| RunnerError::Transport(format!("observe failed: {e}")))?;

        ensure_success(response, "observe")
            .await?
            .json::<Observation>()
            .await
            .map_err(|e| RunnerError::Transport(format!("observe body unreadable: {e}")))
    }

    async fn step(&self, action: Option<&Action>) -> Result<(), RunnerError> {
        let mut request = self.client.post(self.url("/step"));
        if let Some(action) = action {
            request = request.json(action);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RunnerError::Transport(format!("step failed: {e}")))?;

        ensure_success(response, "step").await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use lanepilot_types::{Entity, Position};

    use super::*;

    /// Bodies received by `/step`, empty string for a bare step.
    type Steps = Arc<Mutex<Vec<String>>>;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn fake_game(steps: Steps) -> Router {
        Router::new()
            .route(
                "/observe",
                get(|| async {
                    r#"{"position":[0.0,0.0],"minions":[{"entity":1,"position":[90.0,0.0],"health":50.0}]}"#
                }),
            )
            .route(
                "/step",
                post(|State(steps): State<Steps>, body: Bytes| async move {
                    steps
                        .lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&body).into_owned());
                    StatusCode::OK
                }),
            )
            .with_state(steps)
    }

    fn client(base_url: String) -> GameClient {
        GameClient::new(&GameConfig {
            base_url,
            request_timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn observe_parses_observation() {
        let url = spawn_server(fake_game(Steps::default())).await;
        let obs = client(url).observe().await.unwrap();

        assert_eq!(obs.position, Position::new(0.0, 0.0));
        assert_eq!(obs.minions.len(), 1);
        let minion = obs.minions.first().unwrap();
        assert_eq!(minion.entity, Entity(1));
        assert_eq!(minion.position, Position::new(90.0, 0.0));
    }

    #[tokio::test]
    async fn step_sends_action_body_or_nothing() {
        let steps = Steps::default();
        let url = spawn_server(fake_game(Arc::clone(&steps))).await;
        let client = client(url);

        client.step(Some(&Action::Attack(Entity(1)))).await.unwrap();
        client.step(None).await.unwrap();
        client
            .step(Some(&Action::Move(Position::new(120.0, 45.0))))
            .await
            .unwrap();

        let bodies = steps.lock().unwrap().clone();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0], r#"{"Attack":1}"#);
        assert_eq!(bodies[1], "");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&bodies[2]).unwrap(),
            serde_json::json!({"Move": [120.0, 45.0]})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_transport_failure() {
        let router = Router::new().route(
            "/step",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = spawn_server(router).await;

        let err = client(url).step(None).await.unwrap_err();
        assert!(matches!(&err, RunnerError::Transport(msg) if msg.contains("500") && msg.contains("boom")));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}")).observe().await.unwrap_err();
        assert!(matches!(err, RunnerError::Transport(_)));
    }
}
