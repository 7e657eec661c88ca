//! Persistence layer.
//!
//! A flat string key-value store holding cold-start values, user
//! preferences and the last-known-good price cache. The file-backed store
//! keeps the whole map in memory and rewrites one JSON file on every `set`,
//! which is plenty for a dozen keys.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "goldwatch_state.json";

/// Keys written by the engine.
pub mod keys {
    pub const EXCHANGE_RATE: &str = "goldwatch.exchange_rate";
    pub const EXCHANGE_SOURCE: &str = "goldwatch.exchange_source";
    pub const SPOT_DATA: &str = "goldwatch.spot_data";
    pub const SPOT_SOURCE: &str = "goldwatch.spot_source";
    pub const MARKET_PRICE: &str = "goldwatch.market_price";
    pub const UNIT_QUANTITY: &str = "goldwatch.gram_amount";
    pub const RATE_PREFERENCE: &str = "goldwatch.rate_preference";
    pub const SPOT_PREFERENCE: &str = "goldwatch.spot_preference";
    pub const POLL_INTERVAL: &str = "goldwatch.refresh_interval";
    pub const ALERTS_ENABLED: &str = "goldwatch.notifications_enabled";
    pub const CACHE_SPOT: &str = "goldwatch.cache.spot";
    pub const CACHE_RATE: &str = "goldwatch.cache.rate";
    pub const CACHE_SETTLEMENT: &str = "goldwatch.cache.settlement";
}

/// String key → string value store. A missing key is a valid state.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store, used in tests and when no state file is configured.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Store persisted as a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!(path = %path.display(), "No saved state found, starting fresh");
            return Ok(Self {
                path,
                entries: HashMap::new(),
            });
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state from {}", path.display()))?;

        let entries: HashMap<String, String> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {}", path.display()))?;

        info!(path = %path.display(), keys = entries.len(), "State loaded from disk");

        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialise state")?;

        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state to {}", self.path.display()))?;

        debug!(path = %self.path.display(), keys = self.entries.len(), "State saved");
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// The in-memory map only keeps the new value once it is on disk.
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

/// Delete a state file (for testing or reset).
pub fn delete_state(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete state file {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
