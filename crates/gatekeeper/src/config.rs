//! Configuration management for filegate.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filegate/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{default_authorized_keys_path, TokenPolicy};
use crate::files::GuardPolicy;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("files.root must not be empty")]
    EmptyRoot,

    #[error("auth.authorized_keys_path must not be empty")]
    EmptyAuthorizedKeysPath,

    #[error("token_max_age_secs must be greater than 0 when set")]
    InvalidTokenMaxAge,

    #[error("denylist entries must be non-empty names without separators, got {0:?}")]
    InvalidDenylistEntry(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for filegate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Authentication settings.
    pub auth: AuthConfig,

    /// File root settings.
    pub files: FilesConfig,

    /// Additional denylist entries for the path guard.
    pub guard: GuardConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Location of the `authorized_keys`-style trust store.
    pub authorized_keys_path: PathBuf,

    /// Maximum session token age in seconds. Unset means tokens never
    /// expire inside the gatekeeper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_max_age_secs: Option<u64>,
}

/// File root settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory exposed to clients.
    pub root: PathBuf,
}

/// Additional denylist entries, appended to the built-in lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Directory names blocked at any depth.
    pub extra_blocked_directories: Vec<String>,

    /// Directory names blocked directly under the root.
    pub extra_blocked_top_level: Vec<String>,

    /// File extensions to block, e.g. `kdbx`.
    pub extra_blocked_extensions: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// File that receives audit events in addition to the console.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorized_keys_path: default_authorized_keys_path(),
            token_max_age_secs: None,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            audit_log: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filegate")
        .join("config.toml")
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - AUTHORIZED_KEYS_PATH: Override the trust store location
    /// - FILE_ROOT: Override the file root
    /// - FILEGATE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("AUTHORIZED_KEYS_PATH") {
            if !path.is_empty() {
                tracing::info!("Overriding authorized_keys_path from environment: {}", path);
                self.auth.authorized_keys_path = PathBuf::from(path);
            }
        }

        if let Ok(root) = std::env::var("FILE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding file root from environment: {}", root);
                self.files.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("FILEGATE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        if self.files.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        if self.auth.authorized_keys_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyAuthorizedKeysPath);
        }

        if self.auth.token_max_age_secs == Some(0) {
            return Err(ConfigError::InvalidTokenMaxAge);
        }

        let entries = self
            .guard
            .extra_blocked_directories
            .iter()
            .chain(&self.guard.extra_blocked_top_level)
            .chain(&self.guard.extra_blocked_extensions);
        for entry in entries {
            let trimmed = entry.trim();
            if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
                return Err(ConfigError::InvalidDenylistEntry(entry.clone()));
            }
        }

        Ok(())
    }

    /// Returns the trust store path with `~` expanded.
    pub fn authorized_keys_path(&self) -> PathBuf {
        expand_home(&self.auth.authorized_keys_path)
    }

    /// Returns the file root with `~` expanded.
    pub fn root(&self) -> PathBuf {
        expand_home(&self.files.root)
    }

    /// Builds the path guard policy from the built-in lists plus extras.
    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy::default()
            .with_extra_directories(&self.guard.extra_blocked_directories)
            .with_extra_top_level(&self.guard.extra_blocked_top_level)
            .with_extra_extensions(&self.guard.extra_blocked_extensions)
    }

    /// Builds the session token policy.
    pub fn token_policy(&self) -> TokenPolicy {
        match self.auth.token_max_age_secs {
            Some(secs) => TokenPolicy::with_max_age(Duration::from_secs(secs)),
            None => TokenPolicy::unbounded(),
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("AUTHORIZED_KEYS_PATH");
        std::env::remove_var("FILE_ROOT");
        std::env::remove_var("FILEGATE_LOG_LEVEL");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.logging.log_level, "info");
        assert!(config.logging.audit_log.is_none());
        assert!(config
            .auth
            .authorized_keys_path
            .ends_with(".ssh/authorized_keys"));
        assert!(config.auth.token_max_age_secs.is_none());
        assert!(config.guard.extra_blocked_directories.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[auth]
authorized_keys_path = "/etc/filegate/authorized_keys"
token_max_age_secs = 3600

[files]
root = "/srv/files"

[guard]
extra_blocked_directories = ["vault"]
extra_blocked_top_level = ["archive"]
extra_blocked_extensions = ["kdbx"]

[logging]
log_level = "debug"
audit_log = "/var/log/filegate/audit.log"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(
            config.auth.authorized_keys_path,
            PathBuf::from("/etc/filegate/authorized_keys")
        );
        assert_eq!(config.auth.token_max_age_secs, Some(3600));
        assert_eq!(config.files.root, PathBuf::from("/srv/files"));
        assert_eq!(config.guard.extra_blocked_directories, vec!["vault"]);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(
            config.logging.audit_log,
            Some(PathBuf::from("/var/log/filegate/audit.log"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[files]
root = "/data"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.files.root, PathBuf::from("/data"));
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.auth, AuthConfig::default());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let err = Config::from_toml("[files\nroot = ").unwrap_err();
        assert!(err.to_string().contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_helpful_error_messages() {
        let toml = r#"
[auth]
token_max_age_secs = "forever"
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"), "{}", err);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.auth.token_max_age_secs = Some(600);
        config.guard.extra_blocked_extensions = vec!["kdbx".to_string()];
        config.logging.audit_log = Some(PathBuf::from("/tmp/audit.log"));

        let toml = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_optional_fields_omitted_from_toml() {
        let toml = Config::default().to_toml().unwrap();
        assert!(!toml.contains("token_max_age_secs"));
        assert!(!toml.contains("audit_log"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/config.toml");

        let mut config = Config::default();
        config.files.root = PathBuf::from("/srv/share");
        config.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not [valid").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("filegate/config.toml"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.logging.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_validate_empty_paths() {
        let mut config = Config::default();
        config.files.root = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyRoot));

        let mut config = Config::default();
        config.auth.authorized_keys_path = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyAuthorizedKeysPath));
    }

    #[test]
    fn test_validate_token_max_age() {
        let mut config = Config::default();
        config.auth.token_max_age_secs = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidTokenMaxAge));

        config.auth.token_max_age_secs = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_denylist_entries() {
        for bad in ["", "  ", "a/b", "a\\b"] {
            let mut config = Config::default();
            config.guard.extra_blocked_top_level = vec![bad.to_string()];
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidDenylistEntry(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_guard_policy_includes_extras() {
        let mut config = Config::default();
        config.guard.extra_blocked_directories = vec!["Vault".to_string()];
        config.guard.extra_blocked_extensions = vec!["kdbx".to_string()];

        let policy = config.guard_policy();
        assert!(policy.is_blocked_directory("vault"));
        assert!(policy.is_blocked_directory("memory"));
        assert!(policy.is_blocked_filename("db.kdbx"));
    }

    #[test]
    fn test_token_policy() {
        let mut config = Config::default();
        assert_eq!(config.token_policy(), TokenPolicy::unbounded());

        config.auth.token_max_age_secs = Some(90);
        assert_eq!(
            config.token_policy(),
            TokenPolicy::with_max_age(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_expand_home() {
        let mut config = Config::default();
        config.files.root = PathBuf::from("~/shared");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.root(), home.join("shared"));
        }

        config.files.root = PathBuf::from("/srv/files");
        assert_eq!(config.root(), PathBuf::from("/srv/files"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("AUTHORIZED_KEYS_PATH", "/tmp/keys");
        std::env::set_var("FILE_ROOT", "/tmp/root");
        std::env::set_var("FILEGATE_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.auth.authorized_keys_path, PathBuf::from("/tmp/keys"));
        assert_eq!(config.files.root, PathBuf::from("/tmp/root"));
        assert_eq!(config.logging.log_level, "trace");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("FILE_ROOT", "");

        let mut config = Config::default();
        config.files.root = PathBuf::from("/srv/files");
        config.apply_env_overrides();

        assert_eq!(config.files.root, PathBuf::from("/srv/files"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        let expected = config.clone();
        config.apply_env_overrides();

        assert_eq!(config, expected);
    }
}
