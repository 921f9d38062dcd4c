//! Configuration loading and typed config structures for lanepilot.
//!
//! The configuration lives in a YAML file (`lanepilot.yaml` by default, or
//! the path in `LANEPILOT_CONFIG`). Every field has a default, so an empty
//! or absent file yields a working setup against a local game server and a
//! local Ollama instance.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cadence::DEFAULT_THINK_INTERVAL;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LANEPILOT_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "lanepilot.yaml";

/// Chat backends the runner knows how to talk to.
pub const KNOWN_BACKENDS: &[&str] = &["ollama", "openai", "deepseek", "vllm"];

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Game server connection.
    #[serde(default)]
    pub game: GameConfig,

    /// Chat backend used as the policy.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Loop behavior.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Control API.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PilotConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `LANEPILOT_CONFIG` or `lanepilot.yaml`. A missing file
    /// means all defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_file`], except that a missing file is not an
    /// error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        let path = Path::new(&path);
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::parse("")
        }
    }

    /// Override connection settings with environment variables when set.
    ///
    /// - `GAME_SERVER_URL` overrides `game.base_url`
    /// - `LLM_BACKEND` overrides `llm.backend`
    /// - `LLM_API_URL` overrides `llm.api_url`
    /// - `LLM_API_KEY` overrides `llm.api_key`
    /// - `LLM_MODEL` overrides `llm.model`
    /// - `OBSERVER_PORT` overrides `observer.port` (ignored if not a port)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GAME_SERVER_URL") {
            self.game.base_url = val;
        }
        if let Ok(val) = std::env::var("LLM_BACKEND") {
            self.llm.backend = val;
        }
        if let Ok(val) = std::env::var("LLM_API_URL") {
            self.llm.api_url = val;
        }
        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("OBSERVER_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.observer.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid OBSERVER_PORT"),
            }
        }
    }

    /// Reject values the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.game.base_url.trim().is_empty() {
            return Err(invalid("game.base_url", "must not be empty"));
        }
        if self.game.request_timeout_ms == 0 {
            return Err(invalid("game.request_timeout_ms", "must be positive"));
        }
        if !KNOWN_BACKENDS.contains(&self.llm.backend.to_lowercase().as_str()) {
            return Err(invalid(
                "llm.backend",
                format!("unknown backend '{}', expected one of {KNOWN_BACKENDS:?}", self.llm.backend),
            ));
        }
        if self.llm.api_url.trim().is_empty() {
            return Err(invalid("llm.api_url", "must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        if self.llm.decision_timeout_ms == 0 {
            return Err(invalid("llm.decision_timeout_ms", "must be positive"));
        }
        if self.agent.think_interval == 0 {
            return Err(invalid("agent.think_interval", "must be a positive integer"));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(invalid(
                "logging.format",
                format!("unknown format '{}', expected pretty or json", self.logging.format),
            ));
        }
        Ok(())
    }
}

/// Game server connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Base URL of the game server's HTTP API.
    #[serde(default = "default_game_url")]
    pub base_url: String,

    /// Upper bound on a single `/observe` or `/step` call.
    #[serde(default = "default_game_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            base_url: default_game_url(),
            request_timeout_ms: default_game_timeout_ms(),
        }
    }
}

/// Chat backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend kind: `ollama`, `openai`, `deepseek` or `vllm`.
    #[serde(default = "default_llm_backend")]
    pub backend: String,

    /// Base URL of the chat API.
    #[serde(default = "default_llm_url")]
    pub api_url: String,

    /// Bearer token, empty for local backends.
    #[serde(default)]
    pub api_key: String,

    /// Model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Ask the backend to stream reasoning text.
    #[serde(default = "default_true")]
    pub think: bool,

    /// Upper bound on one whole streamed decision.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            api_url: default_llm_url(),
            api_key: String::new(),
            model: default_llm_model(),
            think: true,
            decision_timeout_ms: default_decision_timeout_ms(),
        }
    }
}

/// Agent loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Think on every tick that is a multiple of this.
    #[serde(default = "default_think_interval")]
    pub think_interval: u64,

    /// Directive text appended to every observation.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Optional minijinja template file replacing the built-in prompt layout.
    #[serde(default)]
    pub prompt_template: Option<String>,

    /// Where user-adjusted settings are persisted.
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// Pause after a tick whose step could not be delivered.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Start ticking as soon as the process is up.
    #[serde(default)]
    pub autostart: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            think_interval: default_think_interval(),
            prompt: default_prompt(),
            prompt_template: None,
            settings_path: default_settings_path(),
            error_backoff_ms: default_error_backoff_ms(),
            autostart: false,
        }
    }
}

/// Control API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_game_url() -> String {
    "http://127.0.0.1:3000".to_owned()
}

const fn default_game_timeout_ms() -> u64 {
    10_000
}

fn default_llm_backend() -> String {
    "ollama".to_owned()
}

fn default_llm_url() -> String {
    "http://127.0.0.1:11434".to_owned()
}

fn default_llm_model() -> String {
    "qwen3:8b".to_owned()
}

const fn default_decision_timeout_ms() -> u64 {
    30_000
}

const fn default_think_interval() -> u64 {
    DEFAULT_THINK_INTERVAL
}

/// Built-in directive for the melee duel scenario.
pub fn default_prompt() -> String {
    "You are Fiora, this is the game state you observed.

Game coordinates: [x, y] describes the horizontal position of game objects.

Your attack range is 100

Your passive skill:
- Damage dealt from an enemy's Vital direction adds 5% true damage.
- A Vital only procs while active (its active_timer has finished).
- The Vital direction is the dominant axis of the offset from you to the target, not just x or y alone.
- Avoid acting during an attack wind-up, or the basic attack may be cancelled.
- Move toward the enemy's Vital direction and attack only when just within attack range.

Please eliminate the target as quickly as possible."
        .to_owned()
}

fn default_settings_path() -> String {
    "lanepilot-settings.json".to_owned()
}

const fn default_error_backoff_ms() -> u64 {
    500
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "pretty".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests below avoid the env-override variables so they do not race
    // with each other.

    #[test]
    fn default_config_is_valid() {
        let config = PilotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.think_interval, 10);
        assert_eq!(config.llm.model, "qwen3:8b");
        assert_eq!(config.llm.decision_timeout_ms, 30_000);
        assert_eq!(config.agent.error_backoff_ms, 500);
        assert!(config.agent.prompt.contains("Your attack range is 100"));
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
game:
  base_url: "http://game:3000"
  request_timeout_ms: 2000
llm:
  backend: openai
  api_url: "https://api.example.com/v1"
  model: "gpt-4o-mini"
  think: false
  decision_timeout_ms: 15000
agent:
  think_interval: 5
  prompt: "attack range 100"
  prompt_template: "prompts/duel.j2"
  autostart: true
observer:
  port: 9090
logging:
  level: debug
  format: json
"#;
        let config = PilotConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(!config.llm.think);
        assert_eq!(config.agent.think_interval, 5);
        assert_eq!(config.agent.prompt, "attack range 100");
        assert_eq!(config.agent.prompt_template.as_deref(), Some("prompts/duel.j2"));
        assert!(config.agent.autostart);
        assert_eq!(config.logging.format, "json");
        // Unset fields keep defaults.
        assert_eq!(config.agent.settings_path, "lanepilot-settings.json");
        assert_eq!(config.observer.host, "0.0.0.0");
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(PilotConfig::parse("").is_ok());
    }

    #[test]
    fn zero_think_interval_is_rejected() {
        let result = PilotConfig::parse("agent:\n  think_interval: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "agent.think_interval",
                ..
            })
        ));
    }

    #[test]
    fn unknown_backend_and_format_are_rejected() {
        let mut config = PilotConfig::default();
        config.llm.backend = "carrier-pigeon".to_owned();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "llm.backend", .. })
        ));

        let mut config = PilotConfig::default();
        config.logging.format = "xml".to_owned();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "logging.format", .. })
        ));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let result = PilotConfig::parse("agent: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
