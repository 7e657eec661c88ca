//! Price provider adapters.
//!
//! Defines the `PriceProvider` trait and one implementation per external
//! source. Every adapter has a bounded timeout and reduces its payload to
//! a single positive `f64` via [`numeric::coerce`]. Failures never escape
//! as fatal errors: the provided [`PriceProvider::fetch`] folds them into
//! `None` after logging.
//!
//! | Provider | Kind | Auth |
//! |----------|------|------|
//! | gold-api.com | spot | none |
//! | goldapi.io | spot | `x-access-token` |
//! | Swissquote (via relays) | spot | none |
//! | Tetherland | rate | none |
//! | Nobitex | rate | none |
//! | WallGold | settlement | bearer token |

pub mod numeric;
pub mod gold_api;
pub mod goldapi_io;
pub mod swissquote;
pub mod tetherland;
pub mod nobitex;
pub mod wallgold;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::types::{Quantity, QuantityKind};

const USER_AGENT: &str = "GOLDWATCH/0.1.0";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single fetch attempt produced no value.
///
/// Only the fallback chain looks past this boundary, and only to decide
/// whether a timeout deserves a retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("{provider}: request timed out")]
    Timeout { provider: String },

    #[error("{provider}: transport error: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider}: HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider}: no usable value in response")]
    DataAbsent { provider: String },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    pub fn absent(provider: &str) -> Self {
        FetchError::DataAbsent {
            provider: provider.to_string(),
        }
    }

    fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            FetchError::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over an external price source.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable identifier, used for spot preferences and log fields.
    fn id(&self) -> &str;

    /// Source label attached to values this provider produces.
    fn label(&self) -> &str;

    /// Which quantity this provider reports.
    fn kind(&self) -> QuantityKind;

    /// Upper bound for a single request.
    fn timeout(&self) -> Duration;

    /// One attempt against the provider, with the failure reason kept.
    async fn try_fetch(&self) -> Result<Quantity, FetchError>;

    /// One attempt, folded to `None` on any failure.
    async fn fetch(&self) -> Option<Quantity> {
        let start = Instant::now();
        match self.try_fetch().await {
            Ok(q) => {
                debug!(
                    provider = self.id(),
                    value = q.value,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Provider fetch succeeded"
                );
                Some(q)
            }
            Err(e) => {
                warn!(
                    provider = self.id(),
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Provider fetch failed"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build a client with the provider's timeout baked in.
pub fn build_client(provider: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .with_context(|| format!("Failed to build {provider} HTTP client"))
}

/// Send `request` and decode the body as JSON.
///
/// Non-success statuses and undecodable bodies are reported as errors;
/// extracting the value is left to the adapter.
pub async fn send_json(provider: &str, request: RequestBuilder) -> Result<Value, FetchError> {
    let resp = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(provider, &e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    resp.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::from_reqwest(provider, &e)
        } else {
            debug!(provider, error = %e, "Response body is not JSON");
            FetchError::absent(provider)
        }
    })
}

/// Wrap a coerced value as a `Quantity`, or report it as absent.
pub fn quantity_or_absent(value: f64, label: &str, provider: &str) -> Result<Quantity, FetchError> {
    Quantity::positive(value, label).ok_or_else(|| FetchError::absent(provider))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
