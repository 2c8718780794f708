//! Configuration for the shopfloor server and CLI.
//!
//! Settings are read from `shopfloor.toml` and layered file → environment →
//! CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".shopfloor/shop.db"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! directory = ".shopfloor/logs"
//!
//! [auth]
//! api_keys = ["change-me"]
//!
//! [intake]
//! enabled = true
//! default_template = "Standard service"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "shopfloor.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS and binding on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".shopfloor/shop.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

impl LoggingSection {
    /// Parsed format, falling back to pretty for unknown values.
    pub fn log_format(&self) -> LogFormat {
        self.format.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSection {
    /// Keys accepted in the `x-api-key` header. Empty leaves `/api` open.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSection {
    #[serde(default = "default_intake_enabled")]
    pub enabled: bool,
    /// Name of the checklist template that seeds intake orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_template: Option<String>,
}

fn default_intake_enabled() -> bool {
    true
}

impl Default for IntakeSection {
    fn default() -> Self {
        Self {
            enabled: default_intake_enabled(),
            default_template: None,
        }
    }
}

/// Parsed `shopfloor.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub intake: IntakeSection,
}

impl ShopConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse shopfloor.toml")
    }

    /// Load from `path`, or return defaults when the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize shopfloor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Where to read the config from: the explicit path, else
    /// `./shopfloor.toml`, else `<config dir>/shopfloor/shopfloor.toml` when
    /// that exists.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }
        match dirs::config_dir().map(|d| d.join("shopfloor").join(CONFIG_FILE_NAME)) {
            Some(user) if user.exists() => user,
            _ => local,
        }
    }

    /// Apply `SHOPFLOOR_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SHOPFLOOR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SHOPFLOOR_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid SHOPFLOOR_PORT '{}'", port))?;
        }
        if let Some(db) = lookup("SHOPFLOOR_DB") {
            self.database.path = PathBuf::from(db);
        }
        if let Some(level) = lookup("SHOPFLOOR_LOG") {
            self.logging.level = level;
        }
        if let Some(keys) = lookup("SHOPFLOOR_API_KEYS") {
            self.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if self.server.host.trim().is_empty() {
            warnings.push("server.host is empty".to_string());
        }
        if self.format_is_unknown() {
            warnings.push(format!(
                "Invalid logging.format '{}': should be 'pretty' or 'json'",
                self.logging.format
            ));
        }
        if self.auth.api_keys.iter().any(|k| k.trim().is_empty()) {
            warnings.push("auth.api_keys contains an empty key".to_string());
        }
        if let Some(name) = &self.intake.default_template
            && name.trim().is_empty()
        {
            warnings.push("intake.default_template is empty".to_string());
        }

        warnings
    }

    fn format_is_unknown(&self) -> bool {
        self.logging.format.parse::<LogFormat>().is_err()
    }
}
