//! Policy client: one streamed decision per think tick.
//!
//! Sends the rendered prompt with the tool catalog to a [`ChatBackend`] and
//! consumes the streamed answer. Text deltas are surfaced to the caller as
//! they arrive; the first tool call decides the action.
//!
//! The whole exchange is bounded by a deadline. On expiry the stream is
//! dropped (closing the HTTP response) and [`RunnerError::Timeout`] is
//! returned, so a stalled backend can never wedge the loop.

use std::time::{Duration, Instant};

use futures::StreamExt;
use lanepilot_core::codec::{self, DecodeError};
use lanepilot_types::{Action, Commentary, Fragment, ToolCall};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::llm::{ChatBackend, ChatRequest};

/// The result of one decision cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// The chosen action; `None` for an explicit `Nothing`, no tool call,
    /// or a tool call that failed to decode.
    pub action: Option<Action>,
    /// Every text fragment received, in arrival order.
    pub commentary: Commentary,
    /// The tool call that decided the cycle, if any.
    pub tool_call: Option<ToolCall>,
    /// Tool calls received after the deciding one.
    pub ignored_tool_calls: usize,
    /// Why the deciding tool call was rejected, if it was.
    pub decode_error: Option<DecodeError>,
}

/// Asks a chat backend for the next action.
pub struct PolicyClient<B> {
    backend: B,
    decision_timeout: Duration,
}

impl<B: ChatBackend> PolicyClient<B> {
    /// Create a policy client with the given decision deadline.
    pub const fn new(backend: B, decision_timeout: Duration) -> Self {
        Self {
            backend,
            decision_timeout,
        }
    }

    /// The underlying backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one decision cycle.
    ///
    /// `on_fragment` is called for every reasoning or content delta, in
    /// arrival order, as soon as it is received.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Policy`] if the backend fails before or during
    /// the stream, or [`RunnerError::Timeout`] if the deadline elapses.
    /// Fragments delivered before the failure are not retracted.
    pub async fn decide<F>(&self, prompt: &str, mut on_fragment: F) -> Result<Decision, RunnerError>
    where
        F: FnMut(Fragment) + Send,
    {
        let started = Instant::now();
        let result = timeout(self.decision_timeout, self.consume(prompt, &mut on_fragment)).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(decision) => {
                debug!(backend = self.backend.name(), latency_ms, "decision stream finished");
                decision
            }
            Err(_elapsed) => {
                let ms = u64::try_from(self.decision_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(backend = self.backend.name(), timeout_ms = ms, "decision deadline exceeded");
                Err(RunnerError::Timeout { ms })
            }
        }
    }

    async fn consume<F>(&self, prompt: &str, on_fragment: &mut F) -> Result<Decision, RunnerError>
    where
        F: FnMut(Fragment) + Send,
    {
        let request = ChatRequest::new(prompt, codec::tool_catalog());
        let mut stream = self.backend.stream_chat(&request).await?;
        let mut decision = Decision::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            // Reasoning before content, matching the order backends emit
            // them within one frame.
            let fragments = chunk
                .reasoning
                .map(Fragment::reasoning)
                .into_iter()
                .chain(chunk.content.map(Fragment::content));
            for fragment in fragments {
                decision.commentary.push(fragment.clone());
                on_fragment(fragment);
            }

            for call in chunk.tool_calls {
                if decision.tool_call.is_some() {
                    decision.ignored_tool_calls = decision.ignored_tool_calls.saturating_add(1);
                    debug!(tool = %call.name, "ignoring tool call after the first");
                    continue;
                }
                match codec::decode(&call) {
                    Ok(action) => decision.action = action,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call rejected");
                        decision.decode_error = Some(e);
                    }
                }
                decision.tool_call = Some(call);
            }

            if chunk.done {
                break;
            }
        }

        Ok(decision)
    }
}
