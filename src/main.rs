//! GOLDWATCH: multi-source gold valuation engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk, wires the providers into the engine, and runs
//! the refresh loop with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use goldwatch::api::{self, routes::ApiState};
use goldwatch::config::AppConfig;
use goldwatch::engine::alert::{AlertSink, LogAlertSink, TelegramAlertSink};
use goldwatch::engine::chain::FallbackChain;
use goldwatch::engine::rates::RateSelector;
use goldwatch::engine::{EngineService, PriceSources, PricingEngine};
use goldwatch::providers::gold_api::GoldApiProvider;
use goldwatch::providers::goldapi_io::GoldApiIoProvider;
use goldwatch::providers::nobitex::NobitexProvider;
use goldwatch::providers::swissquote::SwissquoteProvider;
use goldwatch::providers::tetherland::TetherlandProvider;
use goldwatch::providers::wallgold::WallGoldProvider;
use goldwatch::storage::{JsonFileStore, KvStore, MemoryStore};
use goldwatch::types::{QuantityKind, RateProviderId};

const BANNER: &str = r#"
  ____  ___  _     ______        ___  _____ ____ _   _
 / ___|/ _ \| |   |  _ \ \      / / \|_   _/ ___| | | |
| |  _| | | | |   | | | \ \ /\ / / _ \ | || |   | |_| |
| |_| | |_| | |___| |_| |\ V  V / ___ \| || |___|  _  |
 \____|\___/|_____|____/  \_/\_/_/   \_\_| \____|_| |_|

  18k gold valuation from spot, USDT rate and market price
  v0.1.0
"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        app_name = %cfg.app.name,
        state_file = %cfg.app.state_file,
        api_enabled = cfg.api.enabled,
        "GOLDWATCH starting up"
    );

    // -- Restore state ---------------------------------------------------

    let store: Box<dyn KvStore> = if cfg.app.state_file.trim().is_empty() {
        warn!("No state file configured, state will not survive a restart");
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::open(&cfg.app.state_file)?)
    };

    // -- Initialise components -------------------------------------------

    let sources = build_sources(&cfg)?;
    let spot_providers: Vec<String> = sources.spot.provider_ids().into_iter().map(String::from).collect();

    let sink: Box<dyn AlertSink> = match cfg.telegram() {
        Some((token, chat_id)) => {
            info!("Telegram alerts configured");
            Box::new(TelegramAlertSink::new(token, chat_id)?)
        }
        None => Box::new(LogAlertSink),
    };

    let engine = PricingEngine::cold_start(store, sources, sink);
    let (service, handle) = EngineService::new(engine);

    if cfg.api.enabled {
        api::spawn_api(Arc::new(ApiState::new(handle.clone(), spot_providers)), cfg.api.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    info!("Entering refresh loop. Press Ctrl+C to stop.");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    service.run(shutdown).await.context("Engine service failed")?;

    // Keep the command channel open until the loop exits.
    drop(handle);
    info!("GOLDWATCH shut down cleanly.");
    Ok(())
}

/// Wire every provider into its resolver, in priority order.
fn build_sources(cfg: &AppConfig) -> Result<PriceSources> {
    let goldapi_io_token = cfg.goldapi_io_token();
    if goldapi_io_token.is_none() {
        warn!("goldapi.io token not set, that tier will be skipped");
    }
    let wallgold_token = cfg.wallgold_token();
    if wallgold_token.is_none() {
        warn!("WallGold token not set, market price will come from cache only");
    }

    let spot = FallbackChain::new(QuantityKind::Spot)
        .with_retrying_provider(Box::new(GoldApiProvider::new()?), cfg.providers.primary_timeout_retries)
        .with_provider(Box::new(GoldApiIoProvider::new(goldapi_io_token)?))
        .with_provider(Box::new(SwissquoteProvider::new()?));

    let rates = RateSelector::new()
        .with_provider(RateProviderId::Tetherland, Box::new(TetherlandProvider::new()?))
        .with_provider(RateProviderId::Nobitex, Box::new(NobitexProvider::new()?));

    let settlement = FallbackChain::new(QuantityKind::Settlement)
        .with_provider(Box::new(WallGoldProvider::new(wallgold_token)?));

    Ok(PriceSources { spot, rates, settlement })
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("goldwatch=info"));

    let json_logging = std::env::var("GOLDWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
