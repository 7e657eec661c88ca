//! Nobitex USDT/IRT order book rate provider.
//!
//! Nobitex quotes in Rial. The rest of the system works in Toman, so the
//! last trade price is divided by [`RIAL_PER_TOMAN`] here, before the
//! value leaves the adapter.
//!
//! API: `https://apiv2.nobitex.ir/v3/orderbook/USDTIRT`
//! Auth: None required.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "nobitex";
const DEFAULT_ENDPOINT: &str = "https://apiv2.nobitex.ir/v3/orderbook/USDTIRT";
const TIMEOUT: Duration = Duration::from_secs(15);

pub const RIAL_PER_TOMAN: f64 = 10.0;

pub struct NobitexProvider {
    http: Client,
    endpoint: String,
}

impl NobitexProvider {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(PROVIDER_ID, TIMEOUT)?,
            endpoint: endpoint.into(),
        })
    }

    /// `{"status": "ok", "lastTradePrice": "982500", "bids": [...], "asks": [...]}`
    fn extract_price(body: &Value) -> f64 {
        if body.get("status").and_then(Value::as_str) != Some("ok") {
            return 0.0;
        }
        coerce_opt(body.get("lastTradePrice")) / RIAL_PER_TOMAN
    }
}

#[async_trait]
impl PriceProvider for NobitexProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn label(&self) -> &str {
        "Nobitex"
    }

    fn kind(&self) -> QuantityKind {
        QuantityKind::Rate
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    async fn try_fetch(&self) -> Result<Quantity, FetchError> {
        let body = send_json(PROVIDER_ID, self.http.get(&self.endpoint)).await?;
        quantity_or_absent(Self::extract_price(&body), self.label(), PROVIDER_ID)
    }
}
