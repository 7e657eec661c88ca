//! WallGold settlement price provider.
//!
//! Reports the market buy price of one gram of 18k gold in Toman. Used
//! only for spread comparison against the computed valuation. WallGold can
//! be slow, hence the longer timeout.
//!
//! API: `https://api.wallgold.ir/api/v1/price?symbol=GLD_18C_750TMN&side=buy`
//! Auth: Bearer token.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::numeric::coerce_opt;
use super::{build_client, quantity_or_absent, send_json, FetchError, PriceProvider};
use crate::types::{Quantity, QuantityKind};

pub const PROVIDER_ID: &str = "wallgold";
const LABEL: &str = "WallGold";
const DEFAULT_ENDPOINT: &str =
    "https://api.wallgold.ir/api/v1/price?symbol=GLD_18C_750TMN&side=buy";
const TIMEOUT: Duration = Duration::from_secs(30);

pub struct WallGoldProvider {
    http: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl WallGoldProvider {
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

    /// `{"success": true, "result": {"price": "7,845,000", ...}}`
    fn extract_price(body: &Value) -> f64 {
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            return 0.0;
        }
        coerce_opt(body.pointer("/result/price"))
    }
}

#[async_trait]
impl PriceProvider for WallGoldProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn label(&self) -> &str {
        LABEL
    }

    fn kind(&self) -> QuantityKind {
        QuantityKind::Settlement
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    async fn try_fetch(&self) -> Result<Quantity, FetchError> {
        let Some(token) = &self.token else {
            debug!(provider = PROVIDER_ID, "No bearer token configured, skipping");
            return Err(FetchError::absent(PROVIDER_ID));
        };

        let request = self
            .http
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .bearer_auth(token.expose_secret());

        let body = send_json(PROVIDER_ID, request).await?;
        quantity_or_absent(Self::extract_price(&body), LABEL, PROVIDER_ID)
    }
}
