use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::crypto::DEFAULT_PBKDF2_ITERATIONS;
use crate::storage::{read_text_file, write_text_file, CONFIG_FILE};
use crate::submission::DuplicateCheck;

pub const DEFAULT_EXPORT_ROW_LIMIT: usize = 50_000;
pub const DEFAULT_PASSPHRASE_ENV: &str = "REGISTRO_STORE_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Settings read from `registro.json` in the storage root. Missing keys take their
/// defaults; an unreadable file is replaced by defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub duplicate_check: DuplicateCheck,
    pub pbkdf2_iterations: u32,
    pub export_row_limit: usize,
    pub log_level: String,
    pub store_passphrase_env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            duplicate_check: DuplicateCheck::default(),
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            export_row_limit: DEFAULT_EXPORT_ROW_LIMIT,
            log_level: "info".to_string(),
            store_passphrase_env: DEFAULT_PASSPHRASE_ENV.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let Some(raw) = read_text_file(&path)? else {
            return Ok(Self::default());
        };
        let parsed = match serde_json::from_str::<AppConfig>(raw.as_str()) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable config");
                Self::default()
            }
        };
        Ok(parsed.normalized())
    }

    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.clone().normalized())?;
        write_text_file(&root.join(CONFIG_FILE), content.as_str())?;
        Ok(())
    }

    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.pbkdf2_iterations = self.pbkdf2_iterations.max(1);
        if self.export_row_limit == 0 {
            self.export_row_limit = defaults.export_row_limit;
        }
        if self.log_level.trim().is_empty() {
            self.log_level = defaults.log_level;
        }
        if self.store_passphrase_env.trim().is_empty() {
            self.store_passphrase_env = defaults.store_passphrase_env;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AppConfig::load(dir.path()).unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "duplicate_check": { "phone": false }, "export_row_limit": 0 }"#,
        )
        .unwrap();
        let config = AppConfig::load(dir.path()).unwrap();
        assert!(config.duplicate_check.national_id);
        assert!(!config.duplicate_check.phone);
        assert_eq!(config.export_row_limit, DEFAULT_EXPORT_ROW_LIMIT);
        assert_eq!(config.pbkdf2_iterations, DEFAULT_PBKDF2_ITERATIONS);
    }

    #[test]
    fn garbage_is_replaced_by_defaults_and_saves_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        assert_eq!(AppConfig::load(dir.path()).unwrap(), AppConfig::default());

        let config = AppConfig {
            log_level: "debug".into(),
            ..AppConfig::default()
        };
        config.save(dir.path()).unwrap();
        assert_eq!(AppConfig::load(dir.path()).unwrap(), config);
    }
}
