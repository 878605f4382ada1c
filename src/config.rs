//! Configuration file parser for ~/.config/billfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is out of range.
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_token` so it never ends up in logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the bills API (e.g. `https://api.example.org/v1`).
    pub api_base_url: String,

    /// Bearer token for the bills API (alternative to BILLFEED_API_TOKEN env var).
    /// Env var takes precedence over config file.
    pub api_token: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for rate-limited (429) and server-error (5xx) responses.
    pub max_retries: u32,

    /// Viewport height used by the `snap` command.
    pub viewport_height: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            max_retries: 3,
            viewport_height: 800.0,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("viewport_height", &self.viewport_height)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "api_base_url",
        "api_token",
        "request_timeout_secs",
        "max_retries",
        "viewport_height",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge or corrupted file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            api_base_url = %config.api_base_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.viewport_height.is_finite() || self.viewport_height <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "viewport_height",
                reason: format!("must be a positive number, got {}", self.viewport_height),
            });
        }
        Ok(())
    }

    /// API token with the `BILLFEED_API_TOKEN` environment variable taking precedence.
    pub fn resolved_api_token(&self) -> Option<String> {
        std::env::var("BILLFEED_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.api_token.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("billfeed_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert!(config.api_token.is_none());
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.viewport_height, 800.0);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/billfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "max_retries = 5\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout_secs, 30);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
api_base_url = "https://bills.example.org/api"
api_token = "tok-123"
request_timeout_secs = 10
max_retries = 0
viewport_height = 1334.0
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_base_url, "https://bills.example.org/api");
        assert_eq!(config.api_token.as_deref(), Some("tok-123"));
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.viewport_height, 1334.0);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "max_retries = 2\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_retries, 2);
        cleanup(&path);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let path = write_config("zero_timeout", "request_timeout_secs = 0\n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "request_timeout_secs",
                ..
            }
        ));
        cleanup(&path);
    }

    #[test]
    fn test_negative_viewport_rejected() {
        let path = write_config("viewport", "viewport_height = -1.0\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid {
                key: "viewport_height",
                ..
            })
        ));
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_debug_masks_api_token() {
        let config = Config {
            api_token: Some("super-secret-token-12345".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-token-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
