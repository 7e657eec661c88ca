//! GoldAPI.io spot provider (reported as "Live").
//!
//! Second tier of the spot chain. Requires an access token; without one
//! every attempt is reported as absent so the chain moves on immediately.
//!
//! API: `https://www.goldapi.io/api/XAU/USD`
//! Auth: `x-access-token` header.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "goldapi.io";
const LABEL: &str = "Live";
const DEFAULT_ENDPOINT: &str = "https://www.goldapi.io/api/XAU/USD";
const TIMEOUT: Duration = Duration::from_secs(15);

/// The subset of the GoldAPI.io payload we read. Everything else
/// (`price_gram_24k`, `ch`, `chp`, ...) is ignored.
#[derive(Debug, Deserialize)]
struct GoldApiIoResponse {
    #[serde(default)]
    price: Value,
    #[serde(default)]
    bid: Option<Value>,
}

pub struct GoldApiIoProvider {
    http: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl GoldApiIoProvider {
    pub fn new(token: Option<SecretString>) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, token)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, token: Option<SecretString>) -> Result<Self> {
        Ok(Self {
            http: build_client(PROVIDER_ID, TIMEOUT)?,
            endpoint: endpoint.into(),
            token,
        })
    }

    /// `price`, falling back to `bid` when the quote carries no last price.
    fn extract_price(body: Value) -> f64 {
        match serde_json::from_value::<GoldApiIoResponse>(body) {
            Ok(resp) => {
                let price = coerce_opt(Some(&resp.price));
                if price > 0.0 {
                    price
                } else {
                    coerce_opt(resp.bid.as_ref())
                }
            }
            Err(_) => 0.0,
        }
    }
}

#[async_trait]
impl PriceProvider for GoldApiIoProvider {
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
        let Some(token) = &self.token else {
            debug!(provider = PROVIDER_ID, "No access token configured, skipping");
            return Err(FetchError::absent(PROVIDER_ID));
        };

        let request = self
            .http
            .get(&self.endpoint)
            .header("x-access-token", token.expose_secret())
            .header("Content-Type", "application/json");

        let body = send_json(PROVIDER_ID, request).await?;
        quantity_or_absent(Self::extract_price(body), LABEL, PROVIDER_ID)
    }
}
