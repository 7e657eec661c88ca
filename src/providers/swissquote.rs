//! Swissquote forex feed spot provider.
//!
//! Third tier of the spot chain. The public bbo-quotes feed is reached
//! through a list of relay endpoints which are tried strictly in order,
//! each with its own timeout; the first relay that yields a usable bid
//! wins. Relays are never raced in parallel.
//!
//! Feed: `https://forex-data-feed.swissquote.com/public-quotes/bboquotes/instrument/XAU/USD`
//! Auth: None required.
//!
//! The payload is an array of platform entries, each with a
//! `spreadProfilePrices` array. We read the `bid` of the last profile of
//! the last entry.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "swissquote";
const LABEL: &str = "Swissquote";
const TARGET_URL: &str =
    "https://forex-data-feed.swissquote.com/public-quotes/bboquotes/instrument/XAU/USD";
const TIMEOUT: Duration = Duration::from_secs(10);

/// A relay that fetches the target URL on our behalf. The URL-encoded
/// target is appended to `prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRoute {
    pub name: String,
    pub prefix: String,
}

impl RelayRoute {
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
        }
    }

    fn url_for(&self, target: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(target))
    }
}

/// Relays in order of reliability.
pub fn default_routes() -> Vec<RelayRoute> {
    vec![
        RelayRoute::new("codetabs", "https://api.codetabs.com/v1/proxy?url="),
        RelayRoute::new("allorigins", "https://api.allorigins.win/raw?url="),
        RelayRoute::new("corsproxy", "https://corsproxy.io/?"),
    ]
}

pub struct SwissquoteProvider {
    http: Client,
    target: String,
    routes: Vec<RelayRoute>,
}

impl SwissquoteProvider {
    pub fn new() -> Result<Self> {
        Self::with_routes(TARGET_URL, default_routes())
    }

    pub fn with_routes(target: impl Into<String>, routes: Vec<RelayRoute>) -> Result<Self> {
        Ok(Self {
            http: build_client(PROVIDER_ID, TIMEOUT)?,
            target: target.into(),
            routes,
        })
    }

    fn extract_bid(body: &Value) -> f64 {
        let last_profile = body
            .as_array()
            .and_then(|entries| entries.last())
            .and_then(|entry| entry.get("spreadProfilePrices"))
            .and_then(Value::as_array)
            .and_then(|profiles| profiles.last());
        coerce_opt(last_profile.and_then(|p| p.get("bid")))
    }

    async fn fetch_via(&self, route: &RelayRoute) -> Result<Quantity, FetchError> {
        let url = route.url_for(&self.target);
        let body = send_json(PROVIDER_ID, self.http.get(&url)).await?;
        quantity_or_absent(Self::extract_bid(&body), LABEL, PROVIDER_ID)
    }
}

#[async_trait]
impl PriceProvider for SwissquoteProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn label(&self) -> &str {
        LABEL
    }

    fn kind(&self) -> QuantityKind {
        QuantityKind::Spot
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    async fn try_fetch(&self) -> Result<Quantity, FetchError> {
        let total = self.routes.len();
        let mut last_error = FetchError::absent(PROVIDER_ID);

        for (i, route) in self.routes.iter().enumerate() {
            let start = Instant::now();
            debug!(relay = %route.name, attempt = i + 1, total, "Fetching Swissquote via relay");

            match self.fetch_via(route).await {
                Ok(q) => {
                    debug!(
                        relay = %route.name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Swissquote relay succeeded"
                    );
                    return Ok(q);
                }
                Err(e) => {
                    warn!(relay = %route.name, error = %e, "Swissquote relay failed");
                    last_error = e;
                }
            }
        }

        warn!(relays = total, "All Swissquote relays failed");
        Err(last_error)
    }
}
