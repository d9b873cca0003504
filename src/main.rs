use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use mandi_intel::analysis::estimator::Estimator;
use mandi_intel::analysis::trend::TrendAnalyzer;
use mandi_intel::analysis::types::TrendPeriod;
use mandi_intel::config::{Config, EnvConfig};
use mandi_intel::data::cache::{start_sweep, QueryCache};
use mandi_intel::data::persistence::KvStore;
use mandi_intel::data::sources::forecast_api::ForecastClient;
use mandi_intel::data::sources::govt_feed::GovtFeedClient;
use mandi_intel::data::sources::vendor_api::VendorApiClient;
use mandi_intel::data::sources::{PriceSourceAdapter, StaticToken, TokenSource};
use mandi_intel::engine::aggregator::Aggregator;
use mandi_intel::engine::EngineError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("🌾 Mandi price engine starting...");

    tracing::info!("Loading configuration...");
    let config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;

    tracing::info!("Initializing database: {}", config.system.database_path);
    let store = Arc::new(KvStore::open(&config.system.database_path)?);

    let cache = Arc::new(QueryCache::with_store(config.cache.ttl_minutes, store));
    tracing::info!("Cache ready: {} entries rehydrated", cache.len());

    let token: Arc<dyn TokenSource> = Arc::new(StaticToken(env_config.platform_api_token));
    let govt = Arc::new(GovtFeedClient::new(
        env_config.govt_feed_url,
        env_config.govt_feed_api_key,
    ));
    let vendor = Arc::new(VendorApiClient::new(
        env_config.platform_api_url,
        token.clone(),
    ));
    let forecast = Arc::new(ForecastClient::new(env_config.forecast_api_url, token));

    let sources: Vec<Arc<dyn PriceSourceAdapter>> = vec![govt, vendor, forecast];
    let aggregator = Arc::new(Aggregator::new(sources, cache.clone()));

    let estimator = Estimator::with_settings(
        aggregator.clone(),
        config.estimator.window_days,
        config.estimator.min_confidence,
        config.estimator.freshness_max_age_hours,
    );
    let trends = TrendAnalyzer::new(aggregator.clone());

    // Warm-up pass: summarize each watchlist commodity so the cache is
    // primed before any caller arrives.
    for commodity in &config.system.watchlist {
        match estimator.price_range(commodity, None).await {
            Ok(range) => tracing::info!(
                "{}: ₹{}-₹{} (avg ₹{}, {} observations)",
                commodity,
                range.fair_range.lower,
                range.fair_range.upper,
                range.average,
                range.sample_size
            ),
            Err(EngineError::InsufficientData(reason)) => {
                tracing::warn!("{}: {}", commodity, reason)
            }
            Err(e) => tracing::warn!("{}: {}", commodity, e),
        }

        match trends.price_trend(commodity, TrendPeriod::Week, None).await {
            Ok(trend) => tracing::info!(
                "{}: {:?} trend, strength {}",
                commodity,
                trend.direction,
                trend.strength
            ),
            Err(e) => tracing::debug!("{}: no weekly trend ({})", commodity, e),
        }
    }

    let sweeper = start_sweep(
        cache.clone(),
        Duration::from_secs(config.cache.sweep_interval_minutes * 60),
    );

    tracing::info!("✅ Engine initialized, serving from cache");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    sweeper.stop().await;
    cache.persist();

    Ok(())
}
