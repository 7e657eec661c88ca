//! Sequential fallback chain.
//!
//! Tries providers one at a time in priority order and stops at the first
//! usable value. A provider is only started once the previous one has
//! failed, so a chain never has more than one request outstanding. When
//! every tier fails, the last-known-good cache answers with source
//! `"History"`; with an empty cache the result is value 0, source `"None"`.
//!
//! A tier may carry a timeout retry budget: a `FetchError::Timeout` from
//! that tier is retried (at most once) before the chain moves on. Other
//! failures move on immediately.

use std::time::Instant;
use tracing::{debug, info, warn};

use super::cache;
use crate::providers::PriceProvider;
use crate::storage::KvStore;
use crate::types::{Quantity, QuantityKind, Resolution};

/// Upper bound on timeout retries for any tier.
pub const MAX_TIMEOUT_RETRIES: u32 = 1;

struct Tier {
    provider: Box<dyn PriceProvider>,
    timeout_retries: u32,
}

/// Ordered list of providers for one quantity kind.
pub struct FallbackChain {
    kind: QuantityKind,
    tiers: Vec<Tier>,
}

impl FallbackChain {
    pub fn new(kind: QuantityKind) -> Self {
        Self {
            kind,
            tiers: Vec::new(),
        }
    }

    /// Append a tier with no retries.
    pub fn with_provider(self, provider: Box<dyn PriceProvider>) -> Self {
        self.with_retrying_provider(provider, 0)
    }

    /// Append a tier that retries timeouts up to `timeout_retries` times
    /// (capped at [`MAX_TIMEOUT_RETRIES`]).
    pub fn with_retrying_provider(mut self, provider: Box<dyn PriceProvider>, timeout_retries: u32) -> Self {
        if provider.kind() != self.kind {
            warn!(
                provider = provider.id(),
                provider_kind = %provider.kind(),
                chain_kind = %self.kind,
                "Provider kind does not match chain kind"
            );
        }
        self.tiers.push(Tier {
            provider,
            timeout_retries: timeout_retries.min(MAX_TIMEOUT_RETRIES),
        });
        self
    }

    pub fn kind(&self) -> QuantityKind {
        self.kind
    }

    /// Provider ids in default priority order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.provider.id()).collect()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.tiers.iter().any(|t| t.provider.id() == provider_id)
    }

    /// Tiers in the order they should run: the preferred provider first
    /// (if it exists in this chain), then the rest in default order.
    fn ordered(&self, preferred: Option<&str>) -> Vec<&Tier> {
        let mut tiers: Vec<&Tier> = self.tiers.iter().collect();
        if let Some(pref) = preferred {
            if let Some(pos) = tiers.iter().position(|t| t.provider.id() == pref) {
                let tier = tiers.remove(pos);
                tiers.insert(0, tier);
            }
        }
        tiers
    }

    /// Run one tier, honouring its timeout retry budget.
    async fn run_tier(&self, tier: &Tier) -> Option<Quantity> {
        let id = tier.provider.id();
        let mut attempt = 0;

        loop {
            let start = Instant::now();
            match tier.provider.try_fetch().await {
                Ok(q) => {
                    debug!(
                        kind = %self.kind,
                        provider = id,
                        value = q.value,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Tier succeeded"
                    );
                    return Some(q);
                }
                Err(e) if e.is_timeout() && attempt < tier.timeout_retries => {
                    attempt += 1;
                    warn!(kind = %self.kind, provider = id, attempt, "Timeout, retrying");
                }
                Err(e) => {
                    warn!(
                        kind = %self.kind,
                        provider = id,
                        error = %e,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Tier failed, moving down the chain"
                    );
                    return None;
                }
            }
        }
    }

    /// First usable value from the providers, without consulting the cache.
    pub async fn first_success(&self, preferred: Option<&str>) -> Option<Quantity> {
        for tier in self.ordered(preferred) {
            if let Some(q) = self.run_tier(tier).await {
                return Some(q);
            }
        }
        None
    }

    /// Resolve the quantity: providers first, then the cache, then `None`.
    ///
    /// The store is only read here. Writing a live result back is left to
    /// the caller so that several chains can resolve concurrently against
    /// the same store.
    pub async fn resolve(&self, store: &dyn KvStore, preferred: Option<&str>) -> Resolution {
        if let Some(q) = self.first_success(preferred).await {
            return q.into();
        }

        match cache::read_entry(store, self.kind) {
            Some(entry) => {
                info!(
                    kind = %self.kind,
                    value = entry.value,
                    original_source = %entry.source,
                    "All providers failed, using cached value"
                );
                entry.as_history()
            }
            None => {
                warn!(kind = %self.kind, "All providers failed and cache is empty");
                Resolution::none()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
