//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API tokens) are referenced by env-var name in the config and
//! resolved at runtime into `SecretString`s.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use tracing::debug;

use crate::engine::chain::MAX_TIMEOUT_RETRIES;
use crate::storage::DEFAULT_STATE_FILE;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    /// Path of the JSON state file. Empty keeps state in memory only.
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Env var holding the goldapi.io access token.
    pub goldapi_io_token_env: Option<String>,
    /// Env var holding the WallGold bearer token.
    pub wallgold_token_env: Option<String>,
    /// Timeout retries for the primary spot provider (capped at 1).
    #[serde(default = "default_primary_retries")]
    pub primary_timeout_retries: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            goldapi_io_token_env: None,
            wallgold_token_env: None,
            primary_timeout_retries: default_primary_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

fn default_primary_retries() -> u32 {
    MAX_TIMEOUT_RETRIES
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an optional env-var reference into a secret. Unset or empty
    /// variables yield `None`.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        let name = env_name?;
        match Self::resolve_env(name) {
            Ok(v) if !v.trim().is_empty() => Some(SecretString::new(v)),
            _ => {
                debug!(env = name, "Secret not set");
                None
            }
        }
    }

    pub fn goldapi_io_token(&self) -> Option<SecretString> {
        Self::resolve_secret(self.providers.goldapi_io_token_env.as_deref())
    }

    pub fn wallgold_token(&self) -> Option<SecretString> {
        Self::resolve_secret(self.providers.wallgold_token_env.as_deref())
    }

    /// Telegram bot token and chat id, if both are configured.
    pub fn telegram(&self) -> Option<(SecretString, String)> {
        let token = Self::resolve_secret(self.alerts.telegram_bot_token_env.as_deref())?;
        let chat_id = self
            .alerts
            .telegram_chat_id_env
            .as_deref()
            .and_then(|env| Self::resolve_env(env).ok())
            .filter(|v| !v.trim().is_empty())?;
        Some((token, chat_id))
    }
}
