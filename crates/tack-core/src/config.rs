//! Board configuration, read from `.tack/config.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;

/// Limits and timeouts for a board. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Maximum subject length in characters.
    pub max_subject_chars: usize,
    pub max_body_bytes: usize,
    pub max_reply_bytes: usize,
    pub max_media_bytes: usize,
    /// Bound on every lock wait, in milliseconds.
    pub lock_timeout_ms: u64,
    /// How many directory collisions one creation tolerates before giving up.
    pub allocation_retries: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_subject_chars: 20,
            max_body_bytes: 1024 * 1024,
            max_reply_bytes: 64 * 1024,
            max_media_bytes: 16 * 1024 * 1024,
            lock_timeout_ms: 5_000,
            allocation_retries: 16,
        }
    }
}

impl BoardConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Config`] if the file is unreadable, malformed,
    /// or fails [`BoardConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, BoardError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(BoardError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(config)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Config`] on parse or validation failure.
    pub fn from_toml(text: &str) -> Result<Self, BoardError> {
        let config: Self = toml::from_str(text).map_err(|e| BoardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for writing a fresh config file.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Serialization`] if encoding fails.
    pub fn to_toml(&self) -> Result<String, BoardError> {
        toml::to_string_pretty(self).map_err(|e| BoardError::Serialization(e.to_string()))
    }

    /// Reject limits that would make every request fail.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Config`] naming the first zero-valued key.
    pub fn validate(&self) -> Result<(), BoardError> {
        let limits = [
            ("max_subject_chars", self.max_subject_chars as u64),
            ("max_body_bytes", self.max_body_bytes as u64),
            ("max_reply_bytes", self.max_reply_bytes as u64),
            ("max_media_bytes", self.max_media_bytes as u64),
            ("lock_timeout_ms", self.lock_timeout_ms),
        ];
        match limits.iter().find(|(_, v)| *v == 0) {
            Some((key, _)) => Err(BoardError::Config(format!("{key} must be greater than zero"))),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_posting_form() {
        let config = BoardConfig::default();
        assert_eq!(config.max_subject_chars, 20);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = BoardConfig::from_toml("max_subject_chars = 80\n").unwrap();
        assert_eq!(config.max_subject_chars, 80);
        assert_eq!(config.max_reply_bytes, BoardConfig::default().max_reply_bytes);
    }

    #[test]
    fn unknown_and_zero_keys_are_rejected() {
        assert!(BoardConfig::from_toml("max_subjects = 3\n").is_err());
        let err = BoardConfig::from_toml("lock_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("lock_timeout_ms"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BoardConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, BoardConfig::default());
    }

    #[test]
    fn written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = BoardConfig {
            max_subject_chars: 64,
            ..BoardConfig::default()
        };
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(BoardConfig::load(&path).unwrap(), config);
    }
}
