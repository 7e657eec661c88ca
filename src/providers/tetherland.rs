//! Tetherland USDT rate provider.
//!
//! Preferred rate source under the `Auto` policy. Prices are quoted in
//! Toman per USDT.
//!
//! API: `https://api.tetherland.com/currencies`
//! Auth: None required.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "tetherland";
const DEFAULT_ENDPOINT: &str = "https://api.tetherland.com/currencies";
const TIMEOUT: Duration = Duration::from_secs(15);

pub struct TetherlandProvider {
    http: Client,
    endpoint: String,
}

impl TetherlandProvider {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(PROVIDER_ID, TIMEOUT)?,
            endpoint: endpoint.into(),
        })
    }

    /// The currency map lives under `data.currencies` in current responses
    /// and directly under `currencies` in older ones. `price` wins over
    /// `sell_price` unless it is missing or zero.
    fn extract_price(body: &Value) -> f64 {
        let usdt = body
            .pointer("/data/currencies/USDT")
            .or_else(|| body.pointer("/currencies/USDT"));

        let Some(usdt) = usdt else {
            return 0.0;
        };

        let price = coerce_opt(usdt.get("price"));
        if price > 0.0 {
            price
        } else {
            coerce_opt(usdt.get("sell_price"))
        }
    }
}

#[async_trait]
impl PriceProvider for TetherlandProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn label(&self) -> &str {
        "Tetherland"
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
