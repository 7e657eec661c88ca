//! Last-known-good price cache.
//!
//! One entry per quantity kind, stored as JSON in the key-value store.
//! Written on every live resolution, read only when a chain is exhausted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{keys, KvStore};
use crate::types::{QuantityKind, Resolution, HISTORY_SOURCE};

/// A cached value for one quantity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: QuantityKind,
    #[serde(rename = "price")]
    pub value: f64,
    pub source: String,
}

impl CacheEntry {
    /// The entry as a chain result. Cached values always report as
    /// `"History"`, whatever provider originally produced them.
    pub fn as_history(&self) -> Resolution {
        Resolution {
            value: self.value,
            source: HISTORY_SOURCE.to_string(),
        }
    }
}

/// Store key for a quantity kind.
pub fn cache_key(kind: QuantityKind) -> &'static str {
    match kind {
        QuantityKind::Spot => keys::CACHE_SPOT,
        QuantityKind::Rate => keys::CACHE_RATE,
        QuantityKind::Settlement => keys::CACHE_SETTLEMENT,
    }
}

/// Read the cached entry for `kind`. Corrupt or unusable entries read as
/// empty.
pub fn read_entry(store: &dyn KvStore, kind: QuantityKind) -> Option<CacheEntry> {
    let raw = store.get(cache_key(kind))?;
    match serde_json::from_str::<CacheEntry>(&raw) {
        Ok(entry) if entry.value.is_finite() && entry.value > 0.0 => Some(entry),
        Ok(entry) => {
            warn!(kind = %kind, value = entry.value, "Ignoring unusable cache entry");
            None
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "Ignoring corrupt cache entry");
            None
        }
    }
}

/// Record a live resolution. Returns `false` (and writes nothing) for
/// values that aren't usable or that came from the cache itself.
pub fn record(store: &mut dyn KvStore, kind: QuantityKind, resolution: &Resolution) -> Result<bool> {
    if !resolution.is_live() || !resolution.value.is_finite() {
        return Ok(false);
    }

    let entry = CacheEntry {
        kind,
        value: resolution.value,
        source: resolution.source.clone(),
    };
    let json = serde_json::to_string(&entry).context("Failed to serialise cache entry")?;
    store
        .set(cache_key(kind), &json)
        .with_context(|| format!("Failed to write {kind} cache entry"))?;

    debug!(kind = %kind, value = entry.value, source = %entry.source, "Cache updated");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
