//! Daemon configuration (component L): TOML file, overridable by
//! environment variables, overridable in turn by CLI flags.
//!
//! A missing or unparsable config file is not fatal — it is logged and the
//! daemon falls back to defaults, the same "best effort, never block
//! startup on a bad settings file" posture the desktop client uses for its
//! own settings file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::coordinator::CoordinatorConfig;
use crate::engine::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub default_locale: String,
    /// Newly-finalized segments since the last run that trigger a
    /// rolling summarization.
    pub summary_trigger_count: u32,
    /// Seconds since the last run that trigger a rolling summarization.
    pub summary_time_threshold_secs: u64,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            db_path: None,
            default_locale: "en_US".to_string(),
            summary_trigger_count: 10,
            summary_time_threshold_secs: 120,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path` (TOML), overlay recognized `STENO_*` environment
    /// variables, then the CLI overrides passed in. Parse failures fall
    /// back to defaults rather than aborting startup.
    pub fn load(path: &Path, overrides: CliOverrides) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, path = %path.display(), "failed to parse config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Ok(locale) = std::env::var("STENO_DEFAULT_LOCALE") {
            config.default_locale = locale;
        }
        if let Ok(level) = std::env::var("STENO_LOG") {
            config.log_level = level;
        }
        if let Ok(count) = std::env::var("STENO_SUMMARY_TRIGGER_COUNT") {
            if let Ok(n) = count.parse() {
                config.summary_trigger_count = n;
            }
        }

        if let Some(socket_path) = overrides.socket_path {
            config.socket_path = Some(socket_path);
        }
        if let Some(db_path) = overrides.db_path {
            config.db_path = Some(db_path);
        }

        config
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            trigger_count: self.summary_trigger_count,
            time_threshold: std::time::Duration::from_secs(self.summary_time_threshold_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
    }
}

/// CLI-supplied overrides, applied last (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub socket_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DaemonConfig::load(Path::new("/nonexistent/steno.toml"), CliOverrides::default());
        assert_eq!(config.default_locale, "en_US");
        assert_eq!(config.summary_trigger_count, 10);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steno.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();
        let config = DaemonConfig::load(&path, CliOverrides::default());
        assert_eq!(config.default_locale, "en_US");
    }

    #[test]
    fn cli_override_takes_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steno.toml");
        std::fs::write(&path, "dbPath = \"/from/file.sqlite\"\n").unwrap();
        let config = DaemonConfig::load(
            &path,
            CliOverrides {
                socket_path: None,
                db_path: Some(PathBuf::from("/from/cli.sqlite")),
            },
        );
        assert_eq!(config.db_path, Some(PathBuf::from("/from/cli.sqlite")));
    }
}
