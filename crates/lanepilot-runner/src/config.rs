//! Backend selection derived from the `llm` config section.
//!
//! The YAML layer keeps the backend as a free-form string so env overrides
//! stay simple; this module turns it into a closed [`BackendType`].

use std::time::Duration;

use lanepilot_core::config::LlmConfig;

use crate::error::RunnerError;

/// Wire protocol spoken by a chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Ollama native chat API, newline-delimited JSON stream.
    Ollama,
    /// `OpenAI`-compatible chat completions, server-sent events
    /// (`OpenAI`, `DeepSeek`, vLLM).
    OpenAi,
}

impl BackendType {
    /// Parse a backend name.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] for unknown names.
    pub fn parse(name: &str) -> Result<Self, RunnerError> {
        match name.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "deepseek" | "vllm" => Ok(Self::OpenAi),
            other => Err(RunnerError::Config(format!("unknown backend type: {other}"))),
        }
    }
}

/// Configuration for a single chat backend.
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// Wire protocol.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `http://127.0.0.1:11434`).
    pub api_url: String,
    /// Bearer token; empty means no `Authorization` header.
    pub api_key: String,
    /// Model identifier (e.g. `qwen3:8b`).
    pub model: String,
    /// Request reasoning output where the protocol supports it.
    pub think: bool,
}

impl LlmBackendConfig {
    /// Build from the YAML `llm` section.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if the backend name is unknown.
    pub fn from_config(config: &LlmConfig) -> Result<Self, RunnerError> {
        Ok(Self {
            backend_type: BackendType::parse(&config.backend)?,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            think: config.think,
        })
    }
}

/// Deadline for one whole decision, from the YAML `llm` section.
pub const fn decision_timeout(config: &LlmConfig) -> Duration {
    Duration::from_millis(config.decision_timeout_ms)
}
