//! Chat backend abstraction and implementations.
//!
//! A backend takes one user prompt plus the tool catalog and returns the
//! model's answer as a lazy stream of [`ChatChunk`]s. The [`ChatBackend`]
//! trait is the seam the policy client is generic over; [`LlmBackend`]
//! is the enum-dispatched production implementation covering Ollama's
//! native API and `OpenAI`-compatible endpoints. All backends talk HTTP via
//! `reqwest`.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use lanepilot_core::ToolSpec;
use lanepilot_types::ToolCall;
use serde_json::{Value, json};

use crate::config::{BackendType, LlmBackendConfig};
use crate::error::RunnerError;
use crate::stream::{parse_ndjson_stream, parse_sse_stream};

/// One increment of a streamed chat response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    /// Reasoning ("thinking") text delta.
    pub reasoning: Option<String>,
    /// Assistant content delta.
    pub content: Option<String>,
    /// Tool calls completed in this increment.
    pub tool_calls: Vec<ToolCall>,
    /// The backend marked the response as finished.
    pub done: bool,
}

impl ChatChunk {
    /// A chunk carrying only reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only content text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying one completed tool call.
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            tool_calls: vec![call],
            ..Self::default()
        }
    }

    /// Whether the chunk carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.reasoning.is_none() && self.content.is_none() && self.tool_calls.is_empty() && !self.done
    }
}

/// A boxed stream of chat chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, RunnerError>> + Send>>;

/// A single-turn chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The user message.
    pub prompt: String,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    /// A request offering the given tools.
    pub fn new(prompt: impl Into<String>, tools: Vec<ToolSpec>) -> Self {
        Self {
            prompt: prompt.into(),
            tools,
        }
    }

    fn tools_json(&self) -> Vec<Value> {
        self.tools.iter().map(ToolSpec::to_function_json).collect()
    }
}

/// Something that can answer a chat request with a chunk stream.
pub trait ChatBackend: Send + Sync {
    /// Open a streamed chat completion.
    ///
    /// Errors before the first byte (connection refused, non-2xx status)
    /// surface here; errors after that surface as stream items.
    fn stream_chat(&self, request: &ChatRequest) -> impl Future<Output = Result<ChunkStream, RunnerError>> + Send;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// The production chat backend.
pub enum LlmBackend {
    /// Ollama native chat API.
    Ollama(OllamaBackend),
    /// `OpenAI`-compatible chat completions API.
    OpenAi(OpenAiBackend),
}

impl ChatBackend for LlmBackend {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, RunnerError> {
        match self {
            Self::Ollama(backend) => backend.stream_chat(request).await,
            Self::OpenAi(backend) => backend.stream_chat(request).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Ollama(_) => "ollama",
            Self::OpenAi(_) => "openai-compatible",
        }
    }
}

/// Shared connection settings of both backends.
struct Endpoint {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    think: bool,
}

impl Endpoint {
    fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            think: config.think,
        }
    }

    /// POST a JSON body and return the response once its status is known
    /// to be a success.
    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, RunnerError> {
        let url = format!("{}{path}", self.api_url);
        let mut request = self.client.post(&url).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RunnerError::Policy(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(RunnerError::Policy(format!("{url} returned {status}: {error_body}")));
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Ollama backend
// ---------------------------------------------------------------------------

/// Backend for Ollama's `/api/chat`.
///
/// Ollama streams one JSON object per line and reports reasoning in
/// `message.thinking` when `think` is enabled.
pub struct OllamaBackend {
    endpoint: Endpoint,
}

impl OllamaBackend {
    /// Create a new Ollama backend.
    pub fn new(config: &LlmBackendConfig) -> Self {
        Self {
            endpoint: Endpoint::new(config),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        json!({
            "model": self.endpoint.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "tools": request.tools_json(),
            "stream": true,
            "think": self.endpoint.think,
        })
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, RunnerError> {
        let response = self.endpoint.post("/api/chat", &self.request_body(request)).await?;
        Ok(Box::pin(parse_ndjson_stream(response.bytes_stream())))
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for `OpenAI`-compatible chat completions APIs.
///
/// Works with `OpenAI`, `DeepSeek`, and vLLM endpoints. Sends requests to
/// `{api_url}/chat/completions`. Reasoning arrives as
/// `reasoning_content` (`DeepSeek`) or `reasoning` (vLLM) when the model
/// produces it; there is no request flag for it.
pub struct OpenAiBackend {
    endpoint: Endpoint,
}

impl OpenAiBackend {
    /// Create a new `OpenAI`-compatible backend.
    pub fn new(config: &LlmBackendConfig) -> Self {
        Self {
            endpoint: Endpoint::new(config),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        json!({
            "model": self.endpoint.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "tools": request.tools_json(),
            "stream": true,
        })
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, RunnerError> {
        let response = self
            .endpoint
            .post("/chat/completions", &self.request_body(request))
            .await?;
        Ok(Box::pin(parse_sse_stream(response.bytes_stream())))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create a chat backend from configuration.
pub fn create_backend(config: &LlmBackendConfig) -> LlmBackend {
    match config.backend_type {
        BackendType::Ollama => LlmBackend::Ollama(OllamaBackend::new(config)),
        BackendType::OpenAi => LlmBackend::OpenAi(OpenAiBackend::new(config)),
    }
}
