//! Shared types for GOLDWATCH.
//!
//! These types form the data model used across all modules: provider
//! adapters produce `Quantity` values, the engine turns them into
//! resolved rates and valuation snapshots, and the status API serialises
//! the published `EngineStatus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Source labels
// ---------------------------------------------------------------------------

/// Source label reported when a value comes from the last-known-good cache.
pub const HISTORY_SOURCE: &str = "History";

/// Source label reported when no value is available at all.
pub const NONE_SOURCE: &str = "None";

/// Source label for a rate typed in by the user.
pub const MANUAL_SOURCE: &str = "Manual";

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// The kind of market quantity a provider produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityKind {
    /// Gold spot price, USD per troy ounce.
    Spot,
    /// USDT → Toman conversion rate.
    Rate,
    /// Market price of one gram of 18k gold, in Toman.
    Settlement,
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityKind::Spot => write!(f, "spot"),
            QuantityKind::Rate => write!(f, "rate"),
            QuantityKind::Settlement => write!(f, "settlement"),
        }
    }
}

/// A usable value produced by a provider adapter.
///
/// Only adapters construct these, and only through [`Quantity::positive`],
/// so a `Quantity` always carries a finite value greater than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    /// Label of the provider that produced the value.
    pub provider_id: String,
}

impl Quantity {
    /// Wrap `value` if it is usable (finite and > 0).
    pub fn positive(value: f64, provider_id: &str) -> Option<Self> {
        if value.is_finite() && value > 0.0 {
            Some(Self {
                value,
                provider_id: provider_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ({})", self.value, self.provider_id)
    }
}

/// Outcome of resolving one quantity for a cycle: a value and where it came
/// from. `value == 0.0` with source `"None"` is the terminal no-data state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub value: f64,
    pub source: String,
}

impl Resolution {
    pub fn none() -> Self {
        Self {
            value: 0.0,
            source: NONE_SOURCE.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.value > 0.0
    }

    /// Whether the value came from a live provider rather than the cache.
    pub fn is_live(&self) -> bool {
        self.is_available() && self.source != HISTORY_SOURCE
    }
}

impl From<Quantity> for Resolution {
    fn from(q: Quantity) -> Self {
        Self {
            value: q.value,
            source: q.provider_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange rate
// ---------------------------------------------------------------------------

/// A concrete exchange-rate provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateProviderId {
    Tetherland,
    Nobitex,
}

impl RateProviderId {
    /// The other provider (used for fallback on a preference miss).
    pub fn other(&self) -> Self {
        match self {
            RateProviderId::Tetherland => RateProviderId::Nobitex,
            RateProviderId::Nobitex => RateProviderId::Tetherland,
        }
    }
}

impl fmt::Display for RateProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateProviderId::Tetherland => write!(f, "Tetherland"),
            RateProviderId::Nobitex => write!(f, "Nobitex"),
        }
    }
}

/// Where the authoritative rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    Tetherland,
    Nobitex,
    Manual,
    None,
}

impl From<RateProviderId> for RateSource {
    fn from(id: RateProviderId) -> Self {
        match id {
            RateProviderId::Tetherland => RateSource::Tetherland,
            RateProviderId::Nobitex => RateSource::Nobitex,
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateSource::Tetherland => write!(f, "Tetherland"),
            RateSource::Nobitex => write!(f, "Nobitex"),
            RateSource::Manual => write!(f, "{MANUAL_SOURCE}"),
            RateSource::None => write!(f, "{NONE_SOURCE}"),
        }
    }
}

impl std::str::FromStr for RateSource {
    type Err = GoldwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tetherland" => Ok(RateSource::Tetherland),
            "nobitex" => Ok(RateSource::Nobitex),
            "manual" => Ok(RateSource::Manual),
            "none" | "" => Ok(RateSource::None),
            other => Err(GoldwatchError::InvalidInput(format!("unknown rate source: {other}"))),
        }
    }
}

/// The single authoritative exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub value: f64,
    pub source: RateSource,
}

impl ResolvedRate {
    pub fn none() -> Self {
        Self {
            value: 0.0,
            source: RateSource::None,
        }
    }
}

/// Snapshot of a rate provider's last fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub value: f64,
    pub ok: bool,
}

impl ProviderStatus {
    pub fn failed() -> Self {
        Self { value: 0.0, ok: false }
    }

    pub fn from_quantity(q: Option<&Quantity>) -> Self {
        match q {
            Some(q) => Self { value: q.value, ok: true },
            None => Self::failed(),
        }
    }
}

/// Statuses of every rate provider, retained between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateStatuses {
    pub tetherland: ProviderStatus,
    pub nobitex: ProviderStatus,
}

impl RateStatuses {
    pub fn get(&self, id: RateProviderId) -> ProviderStatus {
        match id {
            RateProviderId::Tetherland => self.tetherland,
            RateProviderId::Nobitex => self.nobitex,
        }
    }
}

impl Default for RateStatuses {
    fn default() -> Self {
        Self {
            tetherland: ProviderStatus::failed(),
            nobitex: ProviderStatus::failed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Which rate provider the user prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RatePreference {
    Tetherland,
    Nobitex,
    #[default]
    Auto,
}

impl RatePreference {
    /// The explicitly preferred provider, if any.
    pub fn provider(&self) -> Option<RateProviderId> {
        match self {
            RatePreference::Tetherland => Some(RateProviderId::Tetherland),
            RatePreference::Nobitex => Some(RateProviderId::Nobitex),
            RatePreference::Auto => None,
        }
    }
}

impl fmt::Display for RatePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatePreference::Tetherland => write!(f, "Tetherland"),
            RatePreference::Nobitex => write!(f, "Nobitex"),
            RatePreference::Auto => write!(f, "Auto"),
        }
    }
}

impl std::str::FromStr for RatePreference {
    type Err = GoldwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tetherland" => Ok(RatePreference::Tetherland),
            "nobitex" => Ok(RatePreference::Nobitex),
            "auto" => Ok(RatePreference::Auto),
            other => Err(GoldwatchError::InvalidInput(format!("unknown rate preference: {other}"))),
        }
    }
}

/// Polling interval, restricted to the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollInterval {
    #[default]
    Off,
    OneMinute,
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
}

impl PollInterval {
    pub const ALL: &'static [PollInterval] = &[
        PollInterval::Off,
        PollInterval::OneMinute,
        PollInterval::FiveMinutes,
        PollInterval::TenMinutes,
        PollInterval::ThirtyMinutes,
    ];

    /// Interval in milliseconds (`0` when off).
    pub fn as_millis(&self) -> u64 {
        match self {
            PollInterval::Off => 0,
            PollInterval::OneMinute => 60_000,
            PollInterval::FiveMinutes => 5 * 60_000,
            PollInterval::TenMinutes => 10 * 60_000,
            PollInterval::ThirtyMinutes => 30 * 60_000,
        }
    }

    /// Interval as a `Duration`, `None` when polling is disabled.
    pub fn period(&self) -> Option<Duration> {
        match self {
            PollInterval::Off => None,
            other => Some(Duration::from_millis(other.as_millis())),
        }
    }

    pub fn from_millis(ms: u64) -> Result<Self, GoldwatchError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_millis() == ms)
            .ok_or_else(|| GoldwatchError::InvalidInput(format!("unsupported poll interval: {ms}ms")))
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollInterval::Off => write!(f, "Off"),
            PollInterval::OneMinute => write!(f, "1M"),
            PollInterval::FiveMinutes => write!(f, "5M"),
            PollInterval::TenMinutes => write!(f, "10M"),
            PollInterval::ThirtyMinutes => write!(f, "30M"),
        }
    }
}

/// User-controlled settings, persisted in the key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub rate_preference: RatePreference,
    pub unit_quantity: f64,
    pub poll_interval: PollInterval,
    pub alerts_enabled: bool,
    /// Spot provider id to try first; `None` means default priority order.
    pub spot_preference: Option<String>,
}

impl Default for UserPreference {
    fn default() -> Self {
        Self {
            rate_preference: RatePreference::Auto,
            unit_quantity: 1.0,
            poll_interval: PollInterval::Off,
            alerts_enabled: false,
            spot_preference: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

/// Derived valuation for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub per_unit_value: f64,
    pub total_value: f64,
    pub computed_at: DateTime<Utc>,
}

/// Direction of a change between two cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    None,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::None => write!(f, "none"),
        }
    }
}

/// Absolute percentage change plus its direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentChange {
    pub percent: f64,
    pub direction: Direction,
}

impl PercentChange {
    pub fn unchanged() -> Self {
        Self {
            percent: 0.0,
            direction: Direction::None,
        }
    }

    /// Two-decimal rendering, e.g. `"10.00"`.
    pub fn formatted(&self) -> String {
        format!("{:.2}", self.percent)
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% {}", self.formatted(), self.direction)
    }
}

/// Values captured at the start of a cycle, before any fetch begins.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviousValues {
    pub rate: Option<f64>,
    pub spot: Option<f64>,
    pub total: Option<f64>,
}

/// Per-quantity deltas against the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deltas {
    pub rate: PercentChange,
    pub spot: PercentChange,
    pub total: PercentChange,
}

impl Default for Deltas {
    fn default() -> Self {
        Self {
            rate: PercentChange::unchanged(),
            spot: PercentChange::unchanged(),
            total: PercentChange::unchanged(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report & published status
// ---------------------------------------------------------------------------

/// Summary of one completed refresh cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub spot: Resolution,
    pub rate: ResolvedRate,
    pub settlement: Resolution,
    pub statuses: RateStatuses,
    pub valuation: ValuationSnapshot,
    pub deltas: Deltas,
    pub spread_percent: f64,
    pub alert_fired: bool,
    pub duration_ms: u64,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: spot {:.2} ({}) | rate {:.0} ({}) | per-gram {:.0} | spread {:.2}%{}",
            self.cycle_number,
            self.spot.value,
            self.spot.source,
            self.rate.value,
            self.rate.source,
            self.valuation.per_unit_value,
            self.spread_percent,
            if self.alert_fired { " [ALERT]" } else { "" },
        )
    }
}

/// Everything a collaborator needs to render the current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub spot: Resolution,
    pub rate: ResolvedRate,
    pub settlement: Resolution,
    pub statuses: RateStatuses,
    pub preferences: UserPreference,
    pub per_unit_value: f64,
    pub total_value: f64,
    pub deltas: Deltas,
    pub spread_percent: f64,
    pub cycle_count: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_refresh_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Render a countdown the way the dashboard shows it: `"1m 5s"`, `"42s"`,
/// or `"0s"` once elapsed.
pub fn format_time_left(remaining: Duration) -> String {
    let ms = remaining.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for GOLDWATCH.
#[derive(Debug, thiserror::Error)]
pub enum GoldwatchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
