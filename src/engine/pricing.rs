//! Pricing engine: one refresh cycle end to end, plus the user-input
//! handlers that mutate the same state.
//!
//! The engine owns the store, the three resolvers and every value the
//! status surface shows. All mutation goes through `&mut self`, so the
//! refresh cycle and user edits are serialised by whoever holds the engine.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

use super::alert::{self, AlertPolicy, AlertSink};
use super::cache;
use super::chain::FallbackChain;
use super::rates::RateSelector;
use super::valuation;
use crate::storage::{keys, KvStore};
use crate::types::{
    CycleReport, Deltas, EngineStatus, GoldwatchError, PollInterval, PreviousValues, QuantityKind,
    RatePreference, RateSource, RateStatuses, Resolution, ResolvedRate, UserPreference,
    ValuationSnapshot, HISTORY_SOURCE, NONE_SOURCE,
};

/// The three resolvers a cycle runs.
pub struct PriceSources {
    pub spot: FallbackChain,
    pub rates: RateSelector,
    pub settlement: FallbackChain,
}

pub struct PricingEngine {
    store: Box<dyn KvStore>,
    sources: PriceSources,
    sink: Box<dyn AlertSink>,
    alerts: AlertPolicy,

    prefs: UserPreference,
    spot: Resolution,
    rate: ResolvedRate,
    settlement: Resolution,
    statuses: RateStatuses,

    previous: PreviousValues,
    valuation: ValuationSnapshot,
    deltas: Deltas,
    spread_percent: f64,

    cycle_count: u64,
    last_cycle_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SpotData {
    #[serde(default)]
    price: f64,
}

impl PricingEngine {
    /// Build the engine from whatever the store holds. Missing or
    /// unreadable keys fall back to defaults.
    pub fn cold_start(store: Box<dyn KvStore>, sources: PriceSources, sink: Box<dyn AlertSink>) -> Self {
        let prefs = load_preferences(store.as_ref());

        let rate = restore_rate(store.as_ref());

        let spot_value = store
            .get(keys::SPOT_DATA)
            .and_then(|raw| serde_json::from_str::<SpotData>(&raw).ok())
            .map(|d| d.price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(0.0);
        let spot = if spot_value > 0.0 {
            Resolution {
                value: spot_value,
                source: store.get(keys::SPOT_SOURCE).unwrap_or_else(|| NONE_SOURCE.to_string()),
            }
        } else {
            Resolution::none()
        };

        let settlement_value = read_f64(store.as_ref(), keys::MARKET_PRICE);
        let settlement = if settlement_value > 0.0 {
            Resolution {
                value: settlement_value,
                source: HISTORY_SOURCE.to_string(),
            }
        } else {
            Resolution::none()
        };

        info!(
            rate = rate.value,
            rate_source = %rate.source,
            spot = spot.value,
            spot_source = %spot.source,
            settlement = settlement.value,
            unit_quantity = prefs.unit_quantity,
            rate_preference = %prefs.rate_preference,
            poll_interval = %prefs.poll_interval,
            alerts_enabled = prefs.alerts_enabled,
            "Engine restored from store"
        );

        let mut engine = Self {
            store,
            sources,
            sink,
            alerts: AlertPolicy::default(),
            prefs,
            spot,
            rate,
            settlement,
            statuses: RateStatuses::default(),
            previous: PreviousValues::default(),
            valuation: valuation::snapshot(0.0, 0.0, 0.0),
            deltas: Deltas::default(),
            spread_percent: 0.0,
            cycle_count: 0,
            last_cycle_at: None,
        };
        engine.revalue();
        engine
    }

    // -- Refresh cycle ---------------------------------------------------

    /// Run one full resolution cycle.
    ///
    /// Provider failures never surface here; they end up as cached or
    /// missing values. An `Err` means something outside the providers
    /// broke, typically a store write.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();
        self.cycle_count += 1;
        let cycle_number = self.cycle_count;
        info!(cycle = cycle_number, "Starting refresh cycle");

        // Deltas compare against values as they stood before any fetch.
        self.previous = self.capture_previous();

        let store: &dyn KvStore = self.store.as_ref();
        let spot_pref = self.prefs.spot_preference.as_deref();
        let (spot, statuses, settlement) = tokio::join!(
            self.sources.spot.resolve(store, spot_pref),
            self.sources.rates.fetch_all(),
            self.sources.settlement.resolve(store, None),
        );

        self.statuses = statuses;
        self.apply_spot(&spot)?;
        self.apply_settlement(&settlement)?;
        let selected = RateSelector::select(self.prefs.rate_preference, &self.statuses);
        if let Some(rate) = selected {
            self.apply_rate(rate)?;
        }

        self.revalue();

        // Only a settlement price observed this cycle can raise an alert.
        let live_settlement = if settlement.is_live() { settlement.value } else { 0.0 };
        let outcome = self.alerts.evaluate(
            live_settlement,
            self.valuation.per_unit_value,
            self.prefs.alerts_enabled,
            self.sink.as_ref(),
        );

        self.last_cycle_at = Some(Utc::now());
        let report = CycleReport {
            cycle_number,
            spot: self.spot.clone(),
            rate: self.rate,
            settlement: self.settlement.clone(),
            statuses: self.statuses,
            valuation: self.valuation,
            deltas: self.deltas,
            spread_percent: self.spread_percent,
            alert_fired: outcome.fired,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            cycle = cycle_number,
            spot = report.spot.value,
            spot_source = %report.spot.source,
            rate = report.rate.value,
            rate_source = %report.rate.source,
            settlement = report.settlement.value,
            per_unit = report.valuation.per_unit_value,
            total = report.valuation.total_value,
            spread_percent = report.spread_percent,
            alert_fired = report.alert_fired,
            duration_ms = report.duration_ms,
            "Refresh cycle complete"
        );
        Ok(report)
    }

    fn capture_previous(&self) -> PreviousValues {
        let usable = |v: f64| (v > 0.0).then_some(v);
        PreviousValues {
            rate: usable(self.rate.value),
            spot: usable(self.spot.value),
            total: usable(self.valuation.total_value),
        }
    }

    fn apply_spot(&mut self, spot: &Resolution) -> Result<()> {
        if !spot.is_available() {
            return Ok(());
        }
        cache::record(self.store.as_mut(), QuantityKind::Spot, spot)?;
        self.store
            .set(keys::SPOT_DATA, &json!({ "price": spot.value }).to_string())
            .context("Failed to persist spot price")?;
        self.store
            .set(keys::SPOT_SOURCE, &spot.source)
            .context("Failed to persist spot source")?;
        self.spot = spot.clone();
        Ok(())
    }

    fn apply_settlement(&mut self, settlement: &Resolution) -> Result<()> {
        if !settlement.is_available() {
            return Ok(());
        }
        cache::record(self.store.as_mut(), QuantityKind::Settlement, settlement)?;
        self.store
            .set(keys::MARKET_PRICE, &settlement.value.to_string())
            .context("Failed to persist market price")?;
        self.settlement = settlement.clone();
        Ok(())
    }

    fn apply_rate(&mut self, rate: ResolvedRate) -> Result<()> {
        if rate.source != RateSource::Manual {
            let as_resolution = Resolution {
                value: rate.value,
                source: rate.source.to_string(),
            };
            cache::record(self.store.as_mut(), QuantityKind::Rate, &as_resolution)?;
        }
        self.store
            .set(keys::EXCHANGE_RATE, &rate.value.to_string())
            .context("Failed to persist exchange rate")?;
        self.store
            .set(keys::EXCHANGE_SOURCE, &rate.source.to_string())
            .context("Failed to persist exchange source")?;
        self.rate = rate;
        Ok(())
    }

    /// Recompute valuation, deltas and spread from the current values.
    fn revalue(&mut self) {
        let snap = valuation::snapshot(self.rate.value, self.spot.value, self.prefs.unit_quantity);
        self.deltas = valuation::deltas(self.rate.value, self.spot.value, snap.total_value, &self.previous);
        self.spread_percent = alert::spread(self.settlement.value, snap.per_unit_value);
        self.valuation = snap;
    }

    // -- User input ------------------------------------------------------

    /// Override the rate with a user-entered value. The next cycle that
    /// yields a provider rate replaces it.
    pub fn set_manual_rate(&mut self, value: f64) -> Result<()> {
        if !(value.is_finite() && value > 0.0) {
            return Err(GoldwatchError::InvalidInput(format!("manual rate must be positive, got {value}")).into());
        }

        self.previous.rate = (self.rate.value > 0.0).then_some(self.rate.value);
        self.apply_rate(ResolvedRate {
            value,
            source: RateSource::Manual,
        })?;
        self.revalue();

        info!(rate = value, "Manual rate applied");
        Ok(())
    }

    /// Switch the rate preference and re-select from the statuses kept by
    /// the last cycle. An explicit preference whose provider was down
    /// leaves the current rate alone.
    pub fn set_rate_preference(&mut self, preference: RatePreference) -> Result<()> {
        self.prefs.rate_preference = preference;
        self.store
            .set(keys::RATE_PREFERENCE, &preference.to_string())
            .context("Failed to persist rate preference")?;

        match RateSelector::select_strict(preference, &self.statuses) {
            Some(rate) => {
                self.apply_rate(rate)?;
                self.revalue();
                info!(preference = %preference, rate = rate.value, source = %rate.source, "Rate preference applied");
            }
            None => info!(preference = %preference, "Rate preference saved, provider not available"),
        }
        Ok(())
    }

    /// Set the number of grams held. Negative input is clamped to zero.
    pub fn set_unit_quantity(&mut self, quantity: f64) -> Result<()> {
        if !quantity.is_finite() {
            return Err(GoldwatchError::InvalidInput(format!("unit quantity must be finite, got {quantity}")).into());
        }
        let quantity = quantity.max(0.0);
        self.prefs.unit_quantity = quantity;
        self.store
            .set(keys::UNIT_QUANTITY, &quantity.to_string())
            .context("Failed to persist unit quantity")?;
        self.revalue();
        debug!(unit_quantity = quantity, total = self.valuation.total_value, "Unit quantity updated");
        Ok(())
    }

    pub fn set_poll_interval(&mut self, interval: PollInterval) -> Result<()> {
        self.prefs.poll_interval = interval;
        self.store
            .set(keys::POLL_INTERVAL, &interval.as_millis().to_string())
            .context("Failed to persist poll interval")?;
        info!(poll_interval = %interval, "Poll interval updated");
        Ok(())
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) -> Result<()> {
        self.prefs.alerts_enabled = enabled;
        self.store
            .set(keys::ALERTS_ENABLED, if enabled { "true" } else { "false" })
            .context("Failed to persist alert flag")?;
        info!(alerts_enabled = enabled, "Alerts toggled");
        Ok(())
    }

    /// Choose which spot provider is tried first. `None` restores the
    /// default order.
    pub fn set_spot_preference(&mut self, provider_id: Option<String>) -> Result<()> {
        let provider_id = provider_id.filter(|id| !id.trim().is_empty());
        if let Some(id) = &provider_id {
            if !self.sources.spot.contains(id) {
                return Err(GoldwatchError::InvalidInput(format!("unknown spot provider: {id}")).into());
            }
        }

        self.store
            .set(keys::SPOT_PREFERENCE, provider_id.as_deref().unwrap_or(""))
            .context("Failed to persist spot preference")?;
        info!(spot_preference = ?provider_id, "Spot preference updated");
        self.prefs.spot_preference = provider_id;
        Ok(())
    }

    // -- Accessors -------------------------------------------------------

    pub fn preferences(&self) -> &UserPreference {
        &self.prefs
    }

    pub fn rate(&self) -> ResolvedRate {
        self.rate
    }

    pub fn spot(&self) -> &Resolution {
        &self.spot
    }

    pub fn settlement(&self) -> &Resolution {
        &self.settlement
    }

    pub fn statuses(&self) -> RateStatuses {
        self.statuses
    }

    pub fn valuation(&self) -> ValuationSnapshot {
        self.valuation
    }

    pub fn deltas(&self) -> Deltas {
        self.deltas
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// Snapshot for the status surface. Scheduling fields are left for the
    /// caller to fill in.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            spot: self.spot.clone(),
            rate: self.rate,
            settlement: self.settlement.clone(),
            statuses: self.statuses,
            preferences: self.prefs.clone(),
            per_unit_value: self.valuation.per_unit_value,
            total_value: self.valuation.total_value,
            deltas: self.deltas,
            spread_percent: self.spread_percent,
            cycle_count: self.cycle_count,
            last_cycle_at: self.last_cycle_at,
            next_refresh_at: None,
            last_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cold-start helpers
// ---------------------------------------------------------------------------

fn read_f64(store: &dyn KvStore, key: &str) -> f64 {
    store
        .get(key)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// The persisted rate, or the last provider rate from the cache when the
/// rate keys are missing or unusable.
fn restore_rate(store: &dyn KvStore) -> ResolvedRate {
    let value = read_f64(store, keys::EXCHANGE_RATE);
    if value > 0.0 {
        return ResolvedRate {
            value,
            source: store
                .get(keys::EXCHANGE_SOURCE)
                .and_then(|s| s.parse().ok())
                .unwrap_or(RateSource::None),
        };
    }

    match cache::read_entry(store, QuantityKind::Rate) {
        Some(entry) => {
            debug!(rate = entry.value, source = %entry.source, "Rate restored from cache");
            ResolvedRate {
                value: entry.value,
                source: entry.source.parse().unwrap_or(RateSource::None),
            }
        }
        None => ResolvedRate::none(),
    }
}

fn load_preferences(store: &dyn KvStore) -> UserPreference {
    let defaults = UserPreference::default();

    UserPreference {
        rate_preference: store
            .get(keys::RATE_PREFERENCE)
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_preference),
        unit_quantity: store
            .get(keys::UNIT_QUANTITY)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0))
            .unwrap_or(defaults.unit_quantity),
        poll_interval: store
            .get(keys::POLL_INTERVAL)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .and_then(|ms| PollInterval::from_millis(ms).ok())
            .unwrap_or(defaults.poll_interval),
        alerts_enabled: store.get(keys::ALERTS_ENABLED).as_deref() == Some("true"),
        spot_preference: store.get(keys::SPOT_PREFERENCE).filter(|s| !s.trim().is_empty()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
