//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use verdant_core::options::{DEFAULT_BASE_URL, DEFAULT_BUFFER_CAPACITY};

use crate::cli::{ConfigKey, OutputFormat, parse_bool_arg};

/// File name of the stored session, next to the config file.
pub const SESSION_FILE: &str = "session.json";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL
    #[serde(default)]
    pub url: Option<String>,

    /// Default output format
    #[serde(default)]
    pub format: Option<String>,

    /// Default cell identifier
    #[serde(default)]
    pub cell: Option<String>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Use Fahrenheit for temperature
    #[serde(default)]
    pub fahrenheit: bool,

    /// Mark stored session cookies as secure
    #[serde(default)]
    pub secure_cookies: bool,

    /// Number of live readings kept by `watch`
    #[serde(default)]
    pub buffer_capacity: Option<usize>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verdant")
            .join("config.toml")
    }

    /// Session file stored alongside the given config file
    pub fn session_path(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(|dir| dir.join(SESSION_FILE))
            .unwrap_or_else(|| PathBuf::from(SESSION_FILE))
    }

    /// Load the config, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Current value of a key, `None` when unset
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Url => self.url.clone(),
            ConfigKey::Format => self.format.clone(),
            ConfigKey::Cell => self.cell.clone(),
            ConfigKey::Timeout => self.timeout.map(|t| t.to_string()),
            ConfigKey::NoColor => Some(self.no_color.to_string()),
            ConfigKey::Fahrenheit => Some(self.fahrenheit.to_string()),
            ConfigKey::SecureCookies => Some(self.secure_cookies.to_string()),
            ConfigKey::BufferCapacity => self.buffer_capacity.map(|c| c.to_string()),
        }
    }

    /// Validate and store a value
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::Url => {
                let url = value.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("Invalid URL '{}'. Expected http:// or https://", value);
                }
                self.url = Some(url.to_string());
            }
            ConfigKey::Format => {
                let format = value.to_lowercase();
                if <OutputFormat as clap::ValueEnum>::from_str(&format, true).is_err() {
                    bail!("Invalid format '{}'. Use: text, json, csv", value);
                }
                self.format = Some(format);
            }
            ConfigKey::Cell => self.cell = Some(value.to_string()),
            ConfigKey::Timeout => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout '{}'. Expected seconds", value))?;
                if secs == 0 {
                    bail!("Timeout must be greater than zero");
                }
                self.timeout = Some(secs);
            }
            ConfigKey::NoColor => self.no_color = parse_bool_arg(value).map_err(anyhow::Error::msg)?,
            ConfigKey::Fahrenheit => {
                self.fahrenheit = parse_bool_arg(value).map_err(anyhow::Error::msg)?
            }
            ConfigKey::SecureCookies => {
                self.secure_cookies = parse_bool_arg(value).map_err(anyhow::Error::msg)?
            }
            ConfigKey::BufferCapacity => {
                let capacity: usize = value
                    .parse()
                    .with_context(|| format!("Invalid buffer capacity '{}'", value))?;
                if capacity == 0 {
                    bail!("Buffer capacity must be greater than zero");
                }
                self.buffer_capacity = Some(capacity);
            }
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Url => self.url = None,
            ConfigKey::Format => self.format = None,
            ConfigKey::Cell => self.cell = None,
            ConfigKey::Timeout => self.timeout = None,
            ConfigKey::NoColor => self.no_color = false,
            ConfigKey::Fahrenheit => self.fahrenheit = false,
            ConfigKey::SecureCookies => self.secure_cookies = false,
            ConfigKey::BufferCapacity => self.buffer_capacity = None,
        }
    }
}

/// Resolve the backend URL: explicit flag, then config, then the default
pub fn resolve_url(url: Option<String>, config: &Config) -> String {
    url.or_else(|| config.url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Resolve the cell identifier: explicit argument, then config
pub fn resolve_cell(cell: Option<String>, config: &Config) -> Option<String> {
    cell.or_else(|| config.cell.clone())
}

/// Resolve timeout: config value, then the given default
pub fn resolve_timeout(config: &Config, default: Duration) -> Duration {
    config.timeout.map(Duration::from_secs).unwrap_or(default)
}

/// Resolve live buffer length: explicit flag, then config, then the default
pub fn resolve_capacity(capacity: Option<usize>, config: &Config) -> usize {
    capacity
        .or(config.buffer_capacity)
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_BUFFER_CAPACITY)
}
