//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tata_engine::{ChatRequest, EngineConfig};

/// Default chat endpoint of a locally running agent server
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/chat";

/// Configuration for tata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Streaming chat endpoint
    pub api_url: String,
    /// Account the agent plans for
    pub user_id: String,
    /// Whole-request timeout in seconds; 0 disables it
    pub request_timeout_secs: u64,
    /// Content characters compared when filtering duplicate events
    pub fingerprint_prefix_chars: usize,
    /// Diagnostic entries kept per session
    pub max_diagnostics: usize,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            user_id: ChatRequest::DEFAULT_USER_ID.to_string(),
            request_timeout_secs: 300,
            fingerprint_prefix_chars: engine.fingerprint_prefix_chars,
            max_diagnostics: engine.max_diagnostics,
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tata")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for TATA_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("TATA_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults if it is missing or invalid
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        Self::default().save_to(&path)?;
        Ok(path)
    }

    /// Engine settings derived from this config
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fingerprint_prefix_chars: self.fingerprint_prefix_chars,
            max_diagnostics: self.max_diagnostics,
            ..EngineConfig::default()
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tata configuration file
# Place at ~/.config/tata/config.toml (Linux), ~/Library/Application Support/tata/config.toml (Mac)
# or %APPDATA%\tata\config.toml (Windows). TATA_CONFIG_PATH overrides the location.

# Streaming chat endpoint of the agent server
api_url = "http://localhost:8000/api/chat"

# Account the agent plans for
user_id = "user_main"

# Whole-request timeout in seconds (0 disables it)
request_timeout_secs = 300

# Content characters compared when filtering duplicate events
fingerprint_prefix_chars = 50

# Diagnostic entries kept per session (oldest are dropped first)
max_diagnostics = 500
"#
}
