//! Runtime configuration.
//!
//! Sources, lowest to highest priority: built-in defaults, an optional TOML
//! file, then environment variables (a `.env` file is loaded into the
//! environment by `main` before this runs).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_AI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8085";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub ai: AiConfig,
    pub identities: IdentityConfig,
    pub gateway: GatewayConfig,
    pub bridge: BridgeConfig,
    pub greetings: GreetingsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            ai: AiConfig::default(),
            identities: IdentityConfig::default(),
            gateway: GatewayConfig::default(),
            bridge: BridgeConfig::default(),
            greetings: GreetingsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    /// Hard bound on a single generation attempt.
    pub timeout_ms: u64,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_AI_MODEL.into(),
            api_url: DEFAULT_AI_API_URL.into(),
            timeout_ms: 8_000,
            max_output_tokens: 60,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Raw (not yet normalized) identity addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub self_address: Option<String>,
    pub counterparty_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Evolution API bridge that owns the WhatsApp session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub api_url: String,
    pub api_key: String,
    pub instance: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BRIDGE_URL.into(),
            api_key: String::new(),
            instance: "pairbot".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingsConfig {
    pub enabled: bool,
}

impl Default for GreetingsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `<config dir>/pairbot/config.toml`, if a home directory can be resolved.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pairbot")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

impl Config {
    /// Load defaults, then the config file (explicit path or the default
    /// location when it exists), then environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment-style overrides. `lookup` abstracts the environment
    /// so tests can feed a map instead of mutating process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(key) = get("AI_API_KEY").or_else(|| get("GEMINI_API_KEY")) {
            self.ai.api_key = Some(key);
        }
        if let Some(model) = get("AI_MODEL") {
            self.ai.model = model;
        }
        if let Some(url) = get("AI_API_URL") {
            self.ai.api_url = url;
        }
        if let Some(addr) = get("COUNTERPARTY_ADDRESS").or_else(|| get("ALLOWED_CHAT_ID")) {
            self.identities.counterparty_address = Some(addr);
        }
        if let Some(addr) = get("SELF_ADDRESS") {
            self.identities.self_address = Some(addr);
        }
        if let Some(port) = get("PORT") {
            self.gateway.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(host) = get("HOST") {
            self.gateway.host = host;
        }
        if let Some(url) = get("BRIDGE_URL") {
            self.bridge.api_url = url;
        }
        if let Some(key) = get("BRIDGE_API_KEY") {
            self.bridge.api_key = key;
        }
        if let Some(instance) = get("BRIDGE_INSTANCE") {
            self.bridge.instance = instance;
        }
        if let Some(enabled) = get("GREETINGS_ENABLED") {
            self.greetings.enabled = parse_bool("GREETINGS_ENABLED", &enabled)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_key()?;
        self.log_level()?;
        if self.ai.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ai.timeout_ms",
                value: "0".into(),
            });
        }
        Ok(())
    }

    /// The text-generation credential. Absence is fatal at startup.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.ai
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "LOG_LEVEL",
                value: self.log_level.clone(),
            })
    }
}
