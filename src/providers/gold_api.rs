//! gold-api.com spot provider.
//!
//! First tier of the spot chain. Free, unauthenticated, and usually the
//! quickest to answer.
//!
//! API: `https://api.gold-api.com/price/XAU`
//! Auth: None required.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "gold-api.com";
const LABEL: &str = "GoldAPI.com";
const DEFAULT_ENDPOINT: &str = "https://api.gold-api.com/price/XAU";
const TIMEOUT: Duration = Duration::from_secs(15);

pub struct GoldApiProvider {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl GoldApiProvider {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(PROVIDER_ID, TIMEOUT)?,
            endpoint: endpoint.into(),
            timeout: TIMEOUT,
        })
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_client(PROVIDER_ID, timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// `{"name": "Gold", "price": 2650.1, "symbol": "XAU", ...}`
    fn extract_price(body: &Value) -> f64 {
        coerce_opt(body.get("price"))
    }
}

#[async_trait]
impl PriceProvider for GoldApiProvider {
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
        self.timeout
    }

    async fn try_fetch(&self) -> Result<Quantity, FetchError> {
        let body = send_json(PROVIDER_ID, self.http.get(&self.endpoint)).await?;
        quantity_or_absent(Self::extract_price(&body), LABEL, PROVIDER_ID)
    }
}
