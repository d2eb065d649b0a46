//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the `--config` command-line argument
//! 2. `$PST2MBOX_CONFIG` (environment variable)
//! 3. `~/.config/pst2mbox/config.toml` (Linux/macOS)
//!    `%APPDATA%\pst2mbox\config.toml` (Windows)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::convert::builder::{
    BuildOptions, RecordBuilder, DEFAULT_NO_CONTENT, DEFAULT_NO_SUBJECT,
};
use crate::convert::driver::{
    ConversionDriver, DEFAULT_PROGRESS_INTERVAL, DEFAULT_UNKNOWN_FOLDER,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub conversion: ConversionConfig,
    pub output: OutputConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Conversion defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Log a progress line every N processed messages (0 disables).
    pub progress_interval: u64,
    /// `X-Folder` value when a message's folder cannot be read.
    pub unknown_folder: String,
    /// Subject used when a message has none.
    pub no_subject: String,
    /// Body used when a message has neither plain text nor HTML.
    pub no_content: String,
}

/// Output file handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Overwrite an existing output file without asking.
    pub assume_yes: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            unknown_folder: DEFAULT_UNKNOWN_FOLDER.to_string(),
            no_subject: DEFAULT_NO_SUBJECT.to_string(),
            no_content: DEFAULT_NO_CONTENT.to_string(),
        }
    }
}

impl ConversionConfig {
    /// Build the conversion driver these settings describe.
    pub fn driver(&self) -> ConversionDriver {
        let builder = RecordBuilder::new(BuildOptions {
            no_subject: self.no_subject.clone(),
            no_content: self.no_content.clone(),
        });
        ConversionDriver::new(builder)
            .with_progress_interval(self.progress_interval)
            .with_unknown_folder(&self.unknown_folder)
    }
}

/// Load configuration, searching standard locations unless `explicit` is given.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> Config {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => config_file_path(),
    };
    match path {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("PST2MBOX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("pst2mbox").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pst2mbox")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join(LOG_FILE_NAME)
}

/// File name of the log inside the cache directory.
pub const LOG_FILE_NAME: &str = "pst2mbox.log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.conversion.progress_interval, 100);
        assert_eq!(cfg.conversion.unknown_folder, "Unknown");
        assert_eq!(cfg.conversion.no_subject, "(No Subject)");
        assert!(!cfg.output.assume_yes);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[conversion]
progress_interval = 500

[output]
assume_yes = true
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.conversion.progress_interval, 500);
        assert!(cfg.output.assume_yes);
        assert_eq!(cfg.conversion.no_content, "(No content)");
        assert_eq!(cfg.general.log_level, "info");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\n").unwrap();
        let cfg = load_config(Some(&path));
        assert_eq!(cfg.general.log_level, "debug");
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general\nlog_level = ").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.general.log_level, "info");
    }

    #[test]
    fn test_missing_explicit_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(cfg.conversion.unknown_folder, "Unknown");
    }

    #[test]
    fn test_log_file_in_cache_dir() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/pst2mbox-cache"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/pst2mbox-cache/pst2mbox.log")
        );
    }
}
