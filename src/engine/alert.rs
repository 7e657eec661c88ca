//! Spread alerts.
//!
//! Compares the observed 18k market price against the computed per-gram
//! value once per cycle. Every breaching cycle fires; there is no cooldown.

use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::providers::build_client;

/// Absolute spread, in percent, at which an alert fires.
pub const ALERT_THRESHOLD_PERCENT: f64 = 4.0;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Percentage spread of `settlement` over `per_unit`. `0.0` unless both
/// are usable.
pub fn spread(settlement: f64, per_unit: f64) -> f64 {
    if !(per_unit > 0.0 && settlement > 0.0) {
        return 0.0;
    }
    ((settlement - per_unit) / per_unit) * 100.0
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives fired alerts. Delivery is entirely up to the implementation.
#[cfg_attr(test, mockall::automock)]
pub trait AlertSink: Send + Sync {
    fn notify(&self, spread_percent: f64);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, spread_percent: f64) {
        warn!(spread_percent, "{}", alert_message(spread_percent));
    }
}

/// Sends alerts to a Telegram chat via the Bot API.
///
/// Delivery runs on a spawned task so a slow or failing send never holds
/// up the cycle. Must be called from inside a Tokio runtime.
pub struct TelegramAlertSink {
    client: Client,
    token: SecretString,
    chat_id: String,
    base_url: String,
}

impl TelegramAlertSink {
    pub fn new(token: SecretString, chat_id: String) -> Result<Self> {
        Self::with_base_url(token, chat_id, "https://api.telegram.org")
    }

    pub fn with_base_url(token: SecretString, chat_id: String, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client("telegram", TELEGRAM_TIMEOUT)?,
            token,
            chat_id,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, spread_percent: f64) -> RequestBuilder {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token.expose_secret());
        self.client.post(url).json(&json!({
            "chat_id": self.chat_id,
            "text": alert_message(spread_percent),
        }))
    }
}

/// Send a prepared alert. The error text never includes the request URL,
/// since the URL carries the bot token.
async fn deliver(request: RequestBuilder) -> Result<(), String> {
    let resp = request.send().await.map_err(|e| e.without_url().to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status().as_u16()));
    }
    Ok(())
}

impl AlertSink for TelegramAlertSink {
    fn notify(&self, spread_percent: f64) {
        let request = self.request(spread_percent);

        tokio::spawn(async move {
            match deliver(request).await {
                Ok(()) => debug!("Telegram alert delivered"),
                Err(e) => warn!(error = %e, "Telegram alert failed"),
            }
        });
    }
}

fn alert_message(spread_percent: f64) -> String {
    let side = if spread_percent >= 0.0 { "above" } else { "below" };
    format!(
        "GOLDWATCH: 18k market price is {:.2}% {side} the computed value",
        spread_percent.abs()
    )
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Result of one alert evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertOutcome {
    pub spread_percent: f64,
    pub fired: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    threshold_percent: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold_percent: ALERT_THRESHOLD_PERCENT,
        }
    }
}

impl AlertPolicy {
    pub fn should_fire(&self, spread_percent: f64) -> bool {
        spread_percent.abs() >= self.threshold_percent
    }

    /// Compute the spread and notify `sink` if it breaches and alerts are
    /// enabled.
    pub fn evaluate(&self, settlement: f64, per_unit: f64, enabled: bool, sink: &dyn AlertSink) -> AlertOutcome {
        let spread_percent = spread(settlement, per_unit);
        let breach = self.should_fire(spread_percent);

        if breach {
            info!(spread_percent, settlement, per_unit, enabled, "Spread threshold breached");
        }

        let fired = breach && enabled;
        if fired {
            sink.notify(spread_percent);
        }

        AlertOutcome { spread_percent, fired }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
