//! Prompt rendering via `minijinja`.
//!
//! The prompt is the serialized observation followed by the directive text.
//! The layout is a template so operators can restructure it without
//! recompiling: point `agent.prompt_template` at a file and it replaces the
//! built-in one. Templates see three variables:
//!
//! - `observation` -- the observation as a compact JSON string
//! - `state` -- the observation as a structured value (`state.minions`, ...)
//! - `directive` -- the current directive text

use minijinja::{Environment, Value, context};
use lanepilot_types::Observation;

use crate::error::RunnerError;

/// Built-in layout: observation JSON, one space, directive.
pub const DEFAULT_TEMPLATE: &str = "{{ observation }} {{ directive }}";

const TEMPLATE_NAME: &str = "prompt";

/// Renders think-tick prompts.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create an engine with the built-in layout.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if the template fails to compile.
    pub fn new() -> Result<Self, RunnerError> {
        Self::from_source(DEFAULT_TEMPLATE.to_owned())
    }

    /// Create an engine from a template file.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if the file cannot be read or does
    /// not compile.
    pub fn from_file(path: &str) -> Result<Self, RunnerError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::Template(format!("failed to read {path}: {e}")))?;
        Self::from_source(source)
    }

    /// Create an engine from the configured template path, or the built-in
    /// layout when none is set.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_file`].
    pub fn from_config(path: Option<&str>) -> Result<Self, RunnerError> {
        path.map_or_else(Self::new, Self::from_file)
    }

    /// Create an engine from template source text.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if the template fails to compile.
    pub fn from_source(source: String) -> Result<Self, RunnerError> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| RunnerError::Template(format!("failed to add prompt template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the prompt for one think tick.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Serde`] if the observation cannot be
    /// serialized, or [`RunnerError::Template`] if rendering fails.
    pub fn render(&self, observation: &Observation, directive: &str) -> Result<String, RunnerError> {
        let json = serde_json::to_string(observation)?;
        self.env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| RunnerError::Template(format!("missing prompt template: {e}")))?
            .render(context! {
                observation => json,
                state => Value::from_serialize(observation),
                directive => directive,
            })
            .map_err(|e| RunnerError::Template(format!("prompt render failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lanepilot_types::{Entity, Minion, Position};

    use super::*;

    fn observation() -> Observation {
        Observation {
            position: Position::new(0.0, 0.0),
            minions: vec![Minion {
                entity: Entity(1),
                position: Position::new(90.0, 0.0),
                health: 50.0,
            }],
        }
    }

    #[test]
    fn default_layout_is_json_space_directive() {
        let engine = PromptEngine::new().unwrap();
        let rendered = engine.render(&observation(), "attack range 100").unwrap();

        let expected = format!("{} attack range 100", serde_json::to_string(&observation()).unwrap());
        assert_eq!(rendered, expected);
        // JSON must not be HTML-escaped.
        assert!(rendered.starts_with("{\"position\":[0.0,0.0]"));
    }

    #[test]
    fn custom_template_sees_structured_state() {
        let engine = PromptEngine::from_source(
            "{{ directive }}\n{% for m in state.minions %}minion {{ m.entity }} hp {{ m.health }}\n{% endfor %}"
                .to_owned(),
        )
        .unwrap();
        let rendered = engine.render(&observation(), "go").unwrap();
        assert!(rendered.starts_with("go\n"));
        assert!(rendered.contains("minion 1 hp 50"));
    }

    #[test]
    fn template_file_is_loaded() {
        let path = std::env::temp_dir().join(format!(
            "lanepilot_prompt_{}_{:?}.j2",
            std::process::id(),
            std::thread::current().id(),
        ));
        std::fs::write(&path, "DIRECTIVE: {{ directive }}").unwrap();

        let engine = PromptEngine::from_config(path.to_str()).unwrap();
        assert_eq!(engine.render(&observation(), "hold").unwrap(), "DIRECTIVE: hold");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_or_broken_template_is_an_error() {
        assert!(matches!(
            PromptEngine::from_file("/nonexistent/lanepilot.j2"),
            Err(RunnerError::Template(_))
        ));
        assert!(matches!(
            PromptEngine::from_source("{% for %}".to_owned()),
            Err(RunnerError::Template(_))
        ));
    }
}
