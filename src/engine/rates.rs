//! Concurrent rate selection.
//!
//! Unlike the spot chain, every rate provider is queried on every cycle and
//! all of them run at once. The selector keeps each provider's status, not
//! just the winner, so a later preference switch can be answered from the
//! retained statuses without a new round of requests.

use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, info};

use crate::providers::PriceProvider;
use crate::types::{ProviderStatus, RatePreference, RateProviderId, RateStatuses, ResolvedRate};

/// Priority order used by `Auto`.
const AUTO_ORDER: [RateProviderId; 2] = [RateProviderId::Tetherland, RateProviderId::Nobitex];

pub struct RateSelector {
    providers: Vec<(RateProviderId, Box<dyn PriceProvider>)>,
}

impl RateSelector {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, id: RateProviderId, provider: Box<dyn PriceProvider>) -> Self {
        self.providers.push((id, provider));
        self
    }

    /// Query every provider concurrently and collect their statuses.
    /// Providers that aren't registered report as failed.
    pub async fn fetch_all(&self) -> RateStatuses {
        let start = Instant::now();
        let results = join_all(self.providers.iter().map(|(id, p)| async move {
            let q = p.fetch().await;
            (*id, ProviderStatus::from_quantity(q.as_ref()))
        }))
        .await;

        let mut statuses = RateStatuses::default();
        for (id, status) in results {
            match id {
                RateProviderId::Tetherland => statuses.tetherland = status,
                RateProviderId::Nobitex => statuses.nobitex = status,
            }
        }

        debug!(
            tetherland_ok = statuses.tetherland.ok,
            nobitex_ok = statuses.nobitex.ok,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rate providers fetched"
        );
        statuses
    }

    /// Cycle policy. An explicit preference falls back to the other
    /// provider on a miss; `Auto` walks the fixed priority order. `None`
    /// means no provider is usable and the previous rate should stand.
    pub fn select(preference: RatePreference, statuses: &RateStatuses) -> Option<ResolvedRate> {
        let order = match preference.provider() {
            Some(id) => [id, id.other()],
            None => AUTO_ORDER,
        };
        let picked = order.into_iter().find_map(|id| usable(id, statuses));

        match picked {
            Some(rate) => debug!(preference = %preference, source = %rate.source, value = rate.value, "Rate selected"),
            None => info!(preference = %preference, "No rate provider usable, keeping previous rate"),
        }
        picked
    }

    /// Preference-switch policy. An explicit preference only applies if
    /// that provider is usable; there is no fallback to the other one.
    pub fn select_strict(preference: RatePreference, statuses: &RateStatuses) -> Option<ResolvedRate> {
        match preference.provider() {
            Some(id) => usable(id, statuses),
            None => Self::select(preference, statuses),
        }
    }
}

impl Default for RateSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn usable(id: RateProviderId, statuses: &RateStatuses) -> Option<ResolvedRate> {
    let status = statuses.get(id);
    (status.ok && status.value > 0.0).then(|| ResolvedRate {
        value: status.value,
        source: id.into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FetchError;
    use crate::types::{Quantity, QuantityKind, RateSource};
    use async_trait::async_trait;
    use std::time::Duration;

    fn statuses(t: Option<f64>, n: Option<f64>) -> RateStatuses {
        let s = |v: Option<f64>| match v {
            Some(value) => ProviderStatus { value, ok: true },
            None => ProviderStatus::failed(),
        };
        RateStatuses {
            tetherland: s(t),
            nobitex: s(n),
        }
    }

    #[test]
    fn test_preference_miss_falls_back_to_other() {
        let st = statuses(None, Some(98_500.0));
        let r = RateSelector::select(RatePreference::Tetherland, &st).unwrap();
        assert_eq!(r.source, RateSource::Nobitex);
        assert_eq!(r.value, 98_500.0);
    }

    #[test]
    fn test_explicit_preference_wins_when_ok() {
        let st = statuses(Some(98_000.0), Some(98_500.0));
        let r = RateSelector::select(RatePreference::Nobitex, &st).unwrap();
        assert_eq!(r.source, RateSource::Nobitex);
    }

    #[test]
    fn test_auto_prefers_tetherland_deterministically() {
        let st = statuses(Some(98_000.0), Some(98_500.0));
        for _ in 0..10 {
            let r = RateSelector::select(RatePreference::Auto, &st).unwrap();
            assert_eq!(r.source, RateSource::Tetherland);
            assert_eq!(r.value, 98_000.0);
        }
    }

    #[test]
    fn test_auto_falls_back_to_nobitex() {
        let st = statuses(None, Some(98_500.0));
        let r = RateSelector::select(RatePreference::Auto, &st).unwrap();
        assert_eq!(r.source, RateSource::Nobitex);
    }

    #[test]
    fn test_nothing_usable() {
        let st = statuses(None, None);
        assert!(RateSelector::select(RatePreference::Auto, &st).is_none());
        assert!(RateSelector::select(RatePreference::Nobitex, &st).is_none());
    }

    #[test]
    fn test_strict_does_not_fall_back() {
        let st = statuses(None, Some(98_500.0));
        assert!(RateSelector::select_strict(RatePreference::Tetherland, &st).is_none());
        assert_eq!(
            RateSelector::select_strict(RatePreference::Nobitex, &st).unwrap().source,
            RateSource::Nobitex
        );
        assert_eq!(
            RateSelector::select_strict(RatePreference::Auto, &st).unwrap().source,
            RateSource::Nobitex
        );
    }

    struct FixedRate(Option<f64>);

    #[async_trait]
    impl PriceProvider for FixedRate {
        fn id(&self) -> &str {
            "fixed-rate"
        }
        fn label(&self) -> &str {
            "Fixed"
        }
        fn kind(&self) -> QuantityKind {
            QuantityKind::Rate
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn try_fetch(&self) -> Result<Quantity, FetchError> {
            self.0
                .and_then(|v| Quantity::positive(v, "Fixed"))
                .ok_or_else(|| FetchError::absent("fixed-rate"))
        }
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_every_status() {
        let selector = RateSelector::new()
            .with_provider(RateProviderId::Tetherland, Box::new(FixedRate(None)))
            .with_provider(RateProviderId::Nobitex, Box::new(FixedRate(Some(98_500.0))));

        let st = selector.fetch_all().await;
        assert!(!st.tetherland.ok);
        assert_eq!(st.tetherland.value, 0.0);
        assert!(st.nobitex.ok);
        assert_eq!(st.nobitex.value, 98_500.0);
    }

    #[tokio::test]
    async fn test_unregistered_provider_reports_failed() {
        let selector = RateSelector::new()
            .with_provider(RateProviderId::Nobitex, Box::new(FixedRate(Some(1.0))));
        let st = selector.fetch_all().await;
        assert!(!st.tetherland.ok);
    }
}
