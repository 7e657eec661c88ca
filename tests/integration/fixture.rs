//! Local HTTP fixture standing in for the external price providers.

use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN: &str = "test-token";

/// Serve the fixture routes on an ephemeral port and return the base URL.
pub async fn start() -> String {
    let app = Router::new()
        .route("/gold-api", get(|| async { Json(json!({"name": "Gold", "price": "2,650.50", "symbol": "XAU"})) }))
        .route("/goldapi-io", get(goldapi_io))
        .route("/relay-down", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/relay-up", get(|| async {
            Json(json!([
                {"topo": {"platform": "AT"}, "spreadProfilePrices": [
                    {"spreadProfile": "standard", "bid": 2649.10, "ask": 2650.30},
                    {"spreadProfile": "prime", "bid": "2,649.80", "ask": 2650.00}
                ]}
            ]))
        }))
        .route("/tetherland", get(|| async {
            Json(json!({"status": 200, "data": {"currencies": {"USDT": {"price": "98,000", "diff24d": "-0.5"}}}}))
        }))
        .route("/nobitex", get(|| async {
            Json(json!({"status": "ok", "lastUpdate": 1760000000, "lastTradePrice": "985000"}))
        }))
        .route("/nobitex-failed", get(|| async { Json(json!({"status": "failed", "message": "maintenance"})) }))
        .route("/wallgold", get(wallgold))
        .route("/zero", get(|| async { Json(json!({"price": 0})) }))
        .route("/garbage", get(|| async { "<html>not json</html>" }))
        .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serve a price endpoint that answers only after `delay`. The counter
/// records every request that arrived.
pub async fn start_slow(delay: Duration) -> (String, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/slow",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Json(json!({"price": 2650.0}))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/slow"), hits)
}

/// A URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/nothing")
}

async fn goldapi_io(headers: HeaderMap) -> impl IntoResponse {
    if headers.get("x-access-token").and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"})));
    }
    (StatusCode::OK, Json(json!({"metal": "XAU", "currency": "USD", "price": 2651.25, "bid": 2650.9})))
}

async fn wallgold(headers: HeaderMap) -> impl IntoResponse {
    let expected = format!("Bearer {TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"success": false})));
    }
    (StatusCode::OK, Json(json!({"success": true, "result": {"symbol": "GLD_18C_750TMN", "price": "6,300,000"}})))
}
