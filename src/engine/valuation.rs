//! Valuation and change detection.

use chrono::Utc;

use crate::types::{Deltas, Direction, PercentChange, PreviousValues, ValuationSnapshot};

/// Grams per troy ounce.
pub const TROY_OUNCE_GRAMS: f64 = 31.1035;

/// 18k gold against a 24k spot quote.
pub const PURITY_18K: f64 = 0.75;

/// Value of one gram of 18k gold in the target currency.
/// `0.0` when either input is unusable.
pub fn per_unit_value(rate: f64, spot: f64) -> f64 {
    if !(rate > 0.0 && spot > 0.0) {
        return 0.0;
    }
    (rate * spot / TROY_OUNCE_GRAMS) * PURITY_18K
}

pub fn total_value(per_unit: f64, unit_quantity: f64) -> f64 {
    per_unit * unit_quantity.max(0.0)
}

pub fn snapshot(rate: f64, spot: f64, unit_quantity: f64) -> ValuationSnapshot {
    let per_unit = per_unit_value(rate, spot);
    ValuationSnapshot {
        per_unit_value: per_unit,
        total_value: total_value(per_unit, unit_quantity),
        computed_at: Utc::now(),
    }
}

/// Absolute percentage change from `previous` to `current`.
///
/// Reports no change when there is no usable previous value or the two are
/// equal.
pub fn percent_change(current: f64, previous: Option<f64>) -> PercentChange {
    let previous = match previous {
        Some(p) if p != 0.0 && p.is_finite() && current.is_finite() => p,
        _ => return PercentChange::unchanged(),
    };
    if current == previous {
        return PercentChange::unchanged();
    }

    PercentChange {
        percent: ((current - previous) / previous).abs() * 100.0,
        direction: if current > previous { Direction::Up } else { Direction::Down },
    }
}

pub fn deltas(rate: f64, spot: f64, total: f64, previous: &PreviousValues) -> Deltas {
    Deltas {
        rate: percent_change(rate, previous.rate),
        spot: percent_change(spot, previous.spot),
        total: percent_change(total, previous.total),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
