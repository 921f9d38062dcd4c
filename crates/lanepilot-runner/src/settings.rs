//! Persistence of the user-adjustable loop settings.
//!
//! Only the think interval and the directive text survive a restart; tick
//! counter, observation and commentary are transient. Settings are stored
//! as pretty JSON so they can be edited by hand.

use std::path::{Path, PathBuf};

use lanepilot_types::LoopSettings;
use tracing::{info, warn};

use crate::error::RunnerError;

/// Loads and saves [`LoopSettings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    /// `None` keeps settings in memory only.
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// A store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that never touches the disk.
    pub const fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load saved settings, falling back to `defaults` when nothing usable
    /// is stored. A corrupt or invalid file is logged and ignored.
    pub fn load(&self, defaults: &LoopSettings) -> LoopSettings {
        let Some(path) = &self.path else {
            return defaults.clone();
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return defaults.clone(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read settings, using defaults");
                return defaults.clone();
            }
        };

        match serde_json::from_str::<LoopSettings>(&contents) {
            Ok(settings) if settings.think_interval > 0 => {
                info!(
                    path = %path.display(),
                    think_interval = settings.think_interval,
                    "restored loop settings"
                );
                settings
            }
            Ok(_) => {
                warn!(path = %path.display(), "stored think interval is zero, using defaults");
                defaults.clone()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt settings file, using defaults");
                defaults.clone()
            }
        }
    }

    /// Persist settings.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Settings`] if the file cannot be written.
    pub async fn save(&self, settings: &LoopSettings) -> Result<(), RunnerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| RunnerError::Settings(format!("failed to write {}: {e}", path.display())))
    }
}
