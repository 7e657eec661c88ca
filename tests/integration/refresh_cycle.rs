//! Full refresh cycles through the engine service, with persistence.

use std::path::PathBuf;
use std::time::Duration;

use goldwatch::engine::alert::LogAlertSink;
use goldwatch::engine::chain::FallbackChain;
use goldwatch::engine::rates::RateSelector;
use goldwatch::engine::{Command, EngineService, PriceSources, PricingEngine};
use goldwatch::storage::{delete_state, keys, JsonFileStore, KvStore};
use goldwatch::types::{Direction, QuantityKind, RatePreference, RateProviderId, RateSource};

use crate::mock_provider::{MockControl, MockProvider};

struct Controls {
    primary: MockControl,
    secondary: MockControl,
    tetherland: MockControl,
    nobitex: MockControl,
    settlement: MockControl,
}

fn temp_state() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("goldwatch_it_state_{}.json", uuid::Uuid::new_v4()));
    p
}

fn build(delay: Option<Duration>) -> (PriceSources, Controls) {
    let (primary, primary_c) = MockProvider::new("primary", QuantityKind::Spot, Some(2650.0));
    let primary = match delay {
        Some(d) => primary.with_delay(d),
        None => primary,
    };
    let (secondary, secondary_c) = MockProvider::new("secondary", QuantityKind::Spot, Some(2640.0));
    let (tetherland, tetherland_c) = MockProvider::new("Tetherland", QuantityKind::Rate, Some(98_000.0));
    let (nobitex, nobitex_c) = MockProvider::new("Nobitex", QuantityKind::Rate, Some(98_500.0));
    let (wallgold, wallgold_c) = MockProvider::new("WallGold", QuantityKind::Settlement, Some(6_300_000.0));

    let sources = PriceSources {
        spot: FallbackChain::new(QuantityKind::Spot)
            .with_retrying_provider(primary.boxed(), 1)
            .with_provider(secondary.boxed()),
        rates: RateSelector::new()
            .with_provider(RateProviderId::Tetherland, tetherland.boxed())
            .with_provider(RateProviderId::Nobitex, nobitex.boxed()),
        settlement: FallbackChain::new(QuantityKind::Settlement).with_provider(wallgold.boxed()),
    };
    let controls = Controls {
        primary: primary_c,
        secondary: secondary_c,
        tetherland: tetherland_c,
        nobitex: nobitex_c,
        settlement: wallgold_c,
    };
    (sources, controls)
}

fn engine_at(path: &PathBuf, sources: PriceSources) -> PricingEngine {
    let store = JsonFileStore::open(path).unwrap();
    PricingEngine::cold_start(Box::new(store), sources, Box::new(LogAlertSink))
}

#[tokio::test]
async fn test_cycle_persists_and_restart_restores() {
    let path = temp_state();

    {
        let (sources, controls) = build(None);
        let (mut service, _handle) = EngineService::new(engine_at(&path, sources));
        let report = service.refresh().await.unwrap();

        assert_eq!(report.spot.source, "primary");
        assert_eq!(report.rate.source, RateSource::Tetherland);
        assert_eq!(controls.secondary.calls(), 0);
        assert_eq!(controls.tetherland.calls(), 1);
        assert_eq!(controls.nobitex.calls(), 1);
    }

    // Restart with every provider down.
    let (sources, controls) = build(None);
    for c in [&controls.primary, &controls.secondary, &controls.tetherland, &controls.nobitex, &controls.settlement] {
        c.set(None);
    }
    let engine = engine_at(&path, sources);
    assert_eq!(engine.rate().value, 98_000.0);
    assert_eq!(engine.spot().value, 2650.0);
    assert_eq!(engine.settlement().value, 6_300_000.0);

    let (mut service, _handle) = EngineService::new(engine);
    let report = service.refresh().await.unwrap();
    assert_eq!(report.spot.value, 2650.0);
    assert_eq!(report.spot.source, "History");
    assert_eq!(report.settlement.source, "History");
    assert_eq!(report.rate.value, 98_000.0);
    assert!(!report.statuses.tetherland.ok && !report.statuses.nobitex.ok);

    delete_state(&path).unwrap();
}

#[tokio::test]
async fn test_deltas_and_preference_switch_through_commands() {
    let path = temp_state();
    let (sources, controls) = build(None);
    let (service, handle) = EngineService::new(engine_at(&path, sources));
    let mut status = handle.status.clone();
    let commands = handle.commands.clone();
    let task = tokio::spawn(service.run(std::future::pending()));

    // Startup cycle.
    while status.borrow_and_update().cycle_count < 1 {
        status.changed().await.unwrap();
    }

    controls.tetherland.set(Some(107_800.0));
    commands.send(Command::Refresh).await.unwrap();
    while status.borrow_and_update().cycle_count < 2 {
        status.changed().await.unwrap();
    }

    {
        let s = status.borrow();
        assert_eq!(s.rate.value, 107_800.0);
        assert_eq!(s.deltas.rate.direction, Direction::Up);
        assert_eq!(s.deltas.rate.formatted(), "10.00");
        assert_eq!(s.deltas.spot.direction, Direction::None);
    }

    // Switch to Nobitex using the statuses retained from the last cycle.
    let (tx, rx) = tokio::sync::oneshot::channel();
    let update = goldwatch::engine::PreferenceUpdate {
        rate_preference: Some(RatePreference::Nobitex),
        ..Default::default()
    };
    commands.send(Command::UpdatePreferences { update, reply: tx }).await.unwrap();
    rx.await.unwrap().unwrap();

    assert_eq!(status.borrow().rate.source, RateSource::Nobitex);
    assert_eq!(controls.nobitex.calls(), 2);

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.get(keys::RATE_PREFERENCE).as_deref(), Some("Nobitex"));
    assert_eq!(store.get(keys::EXCHANGE_SOURCE).as_deref(), Some("Nobitex"));

    task.abort();
    delete_state(&path).unwrap();
}

#[tokio::test]
async fn test_back_to_back_refreshes_never_overlap() {
    let path = temp_state();
    let (sources, controls) = build(Some(Duration::from_millis(50)));
    let (service, handle) = EngineService::new(engine_at(&path, sources));
    let mut status = handle.status.clone();
    let commands = handle.commands.clone();
    let task = tokio::spawn(service.run(std::future::pending()));

    for _ in 0..3 {
        commands.send(Command::Refresh).await.unwrap();
    }
    while status.borrow_and_update().cycle_count < 2 {
        status.changed().await.unwrap();
    }

    assert_eq!(controls.primary.max_active(), 1);
    assert!(controls.primary.calls() >= 2);

    task.abort();
    delete_state(&path).unwrap();
}

#[tokio::test]
async fn test_primary_outage_uses_secondary_tier() {
    let path = temp_state();
    let (sources, controls) = build(None);
    controls.primary.set(None);

    let (mut service, _handle) = EngineService::new(engine_at(&path, sources));
    let report = service.refresh().await.unwrap();

    assert_eq!(report.spot.value, 2640.0);
    assert_eq!(report.spot.source, "secondary");
    // Absent data is not a timeout, so no retry.
    assert_eq!(controls.primary.calls(), 1);

    delete_state(&path).unwrap();
}
