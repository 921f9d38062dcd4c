//! Shared state handed to every handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanepilot_runner::AgentLoop;

/// The agent loop under control plus server metadata.
pub struct AppState<G, B> {
    /// The loop the API drives and reports on.
    pub agent: Arc<AgentLoop<G, B>>,
    /// When the server state was created, for the status page.
    pub started_at: DateTime<Utc>,
}

impl<G, B> AppState<G, B> {
    /// Wrap a loop for serving.
    pub fn new(agent: Arc<AgentLoop<G, B>>) -> Self {
        Self {
            agent,
            started_at: Utc::now(),
        }
    }
}
