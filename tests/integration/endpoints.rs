//! Real provider adapters against the local fixture server.

use secrecy::SecretString;
use std::sync::atomic::Ordering;
use std::time::Duration;

use goldwatch::engine::chain::FallbackChain;
use goldwatch::providers::gold_api::GoldApiProvider;
use goldwatch::providers::goldapi_io::GoldApiIoProvider;
use goldwatch::providers::nobitex::NobitexProvider;
use goldwatch::providers::swissquote::{RelayRoute, SwissquoteProvider};
use goldwatch::providers::tetherland::TetherlandProvider;
use goldwatch::providers::wallgold::WallGoldProvider;
use goldwatch::providers::{FetchError, PriceProvider};
use goldwatch::storage::MemoryStore;
use goldwatch::types::{QuantityKind, Resolution};

use crate::fixture;

fn token() -> Option<SecretString> {
    Some(SecretString::new(fixture::TOKEN.to_string()))
}

#[tokio::test]
async fn test_gold_api_parses_grouped_string() {
    let base = fixture::start().await;
    let p = GoldApiProvider::with_endpoint(format!("{base}/gold-api")).unwrap();

    let q = p.try_fetch().await.unwrap();
    assert_eq!(q.value, 2650.50);
    assert_eq!(q.provider_id, "GoldAPI.com");
}

#[tokio::test]
async fn test_zero_price_is_absent() {
    let base = fixture::start().await;
    let p = GoldApiProvider::with_endpoint(format!("{base}/zero")).unwrap();
    assert!(matches!(p.try_fetch().await, Err(FetchError::DataAbsent { .. })));
    assert!(p.fetch().await.is_none());
}

#[tokio::test]
async fn test_non_json_body_is_absent() {
    let base = fixture::start().await;
    let p = GoldApiProvider::with_endpoint(format!("{base}/garbage")).unwrap();
    assert!(matches!(p.try_fetch().await, Err(FetchError::DataAbsent { .. })));
}

#[tokio::test]
async fn test_error_status_reported() {
    let base = fixture::start().await;
    let p = GoldApiProvider::with_endpoint(format!("{base}/down")).unwrap();
    assert_eq!(
        p.try_fetch().await,
        Err(FetchError::Status { provider: "gold-api.com".into(), status: 503 })
    );
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let p = GoldApiProvider::with_endpoint(fixture::dead_url().await).unwrap();
    assert!(matches!(p.try_fetch().await, Err(FetchError::Transport { .. })));
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let (url, hits) = fixture::start_slow(Duration::from_secs(3)).await;
    let p = GoldApiProvider::with_endpoint(url)
        .unwrap()
        .with_timeout(Duration::from_millis(200))
        .unwrap();

    assert_eq!(p.timeout(), Duration::from_millis(200));
    let err = p.try_fetch().await.unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err}");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_primary_timeout_retried_once() {
    let (url, hits) = fixture::start_slow(Duration::from_secs(3)).await;
    let primary = GoldApiProvider::with_endpoint(url)
        .unwrap()
        .with_timeout(Duration::from_millis(200))
        .unwrap();
    let chain = FallbackChain::new(QuantityKind::Spot).with_retrying_provider(Box::new(primary), 1);

    let resolved = chain.resolve(&MemoryStore::new(), None).await;
    assert_eq!(resolved, Resolution::none());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_goldapi_io_sends_token() {
    let base = fixture::start().await;

    let p = GoldApiIoProvider::with_endpoint(format!("{base}/goldapi-io"), token()).unwrap();
    let q = p.try_fetch().await.unwrap();
    assert_eq!(q.value, 2651.25);
    assert_eq!(q.provider_id, "Live");

    let wrong = GoldApiIoProvider::with_endpoint(
        format!("{base}/goldapi-io"),
        Some(SecretString::new("nope".into())),
    )
    .unwrap();
    assert!(matches!(wrong.try_fetch().await, Err(FetchError::Status { status: 401, .. })));

    let missing = GoldApiIoProvider::with_endpoint(format!("{base}/goldapi-io"), None).unwrap();
    assert!(matches!(missing.try_fetch().await, Err(FetchError::DataAbsent { .. })));
}

#[tokio::test]
async fn test_swissquote_falls_through_relays() {
    let base = fixture::start().await;
    let routes = vec![
        RelayRoute::new("down", &format!("{base}/relay-down?url=")),
        RelayRoute::new("up", &format!("{base}/relay-up?url=")),
    ];
    let p = SwissquoteProvider::with_routes("https://quotes.example/XAU/USD", routes).unwrap();

    let q = p.try_fetch().await.unwrap();
    assert_eq!(q.value, 2649.80);
    assert_eq!(q.provider_id, "Swissquote");
}

#[tokio::test]
async fn test_swissquote_all_relays_down() {
    let base = fixture::start().await;
    let routes = vec![
        RelayRoute::new("a", &format!("{base}/relay-down?url=")),
        RelayRoute::new("b", &format!("{base}/down?url=")),
    ];
    let p = SwissquoteProvider::with_routes("https://quotes.example/XAU/USD", routes).unwrap();

    assert_eq!(
        p.try_fetch().await,
        Err(FetchError::Status { provider: "swissquote".into(), status: 503 })
    );
}

#[tokio::test]
async fn test_rate_providers() {
    let base = fixture::start().await;

    let t = TetherlandProvider::with_endpoint(format!("{base}/tetherland")).unwrap();
    let q = t.try_fetch().await.unwrap();
    assert_eq!(q.value, 98_000.0);
    assert_eq!(q.provider_id, "Tetherland");

    let n = NobitexProvider::with_endpoint(format!("{base}/nobitex")).unwrap();
    let q = n.try_fetch().await.unwrap();
    assert_eq!(q.value, 98_500.0);
    assert_eq!(q.provider_id, "Nobitex");

    let failed = NobitexProvider::with_endpoint(format!("{base}/nobitex-failed")).unwrap();
    assert!(failed.fetch().await.is_none());
}

#[tokio::test]
async fn test_wallgold_bearer_auth() {
    let base = fixture::start().await;

    let p = WallGoldProvider::with_endpoint(format!("{base}/wallgold"), token()).unwrap();
    let q = p.try_fetch().await.unwrap();
    assert_eq!(q.value, 6_300_000.0);
    assert_eq!(p.kind(), QuantityKind::Settlement);

    let missing = WallGoldProvider::with_endpoint(format!("{base}/wallgold"), None).unwrap();
    assert!(missing.fetch().await.is_none());
}

#[tokio::test]
async fn test_spot_chain_reaches_third_tier() {
    let base = fixture::start().await;
    let relays = vec![RelayRoute::new("up", &format!("{base}/relay-up?url="))];

    let chain = FallbackChain::new(QuantityKind::Spot)
        .with_retrying_provider(Box::new(GoldApiProvider::with_endpoint(format!("{base}/down")).unwrap()), 1)
        .with_provider(Box::new(GoldApiIoProvider::with_endpoint(format!("{base}/goldapi-io"), None).unwrap()))
        .with_provider(Box::new(SwissquoteProvider::with_routes("https://quotes.example", relays).unwrap()));

    let r = chain.resolve(&MemoryStore::new(), None).await;
    assert_eq!(r.value, 2649.80);
    assert_eq!(r.source, "Swissquote");
}

#[tokio::test]
async fn test_spot_preference_skips_ahead() {
    let base = fixture::start().await;
    let relays = vec![RelayRoute::new("up", &format!("{base}/relay-up?url="))];

    let chain = FallbackChain::new(QuantityKind::Spot)
        .with_provider(Box::new(GoldApiProvider::with_endpoint(format!("{base}/gold-api")).unwrap()))
        .with_provider(Box::new(SwissquoteProvider::with_routes("https://quotes.example", relays).unwrap()));

    let r = chain.resolve(&MemoryStore::new(), Some("swissquote")).await;
    assert_eq!(r.source, "Swissquote");

    let r = chain.resolve(&MemoryStore::new(), None).await;
    assert_eq!(r.source, "GoldAPI.com");
}
