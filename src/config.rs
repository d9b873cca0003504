use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
    /// Commodities the startup warm-up pass summarizes.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
    #[serde(default = "default_sweep_interval_minutes")]
    pub sweep_interval_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_freshness_max_age_hours")]
    pub freshness_max_age_hours: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            sweep_interval_minutes: default_sweep_interval_minutes(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_confidence: default_min_confidence(),
            freshness_max_age_hours: default_freshness_max_age_hours(),
        }
    }
}

fn default_watchlist() -> Vec<String> {
    vec!["wheat".to_string(), "rice".to_string(), "onion".to_string()]
}
fn default_ttl_minutes() -> i64 { 30 }
fn default_sweep_interval_minutes() -> u64 { 5 }
fn default_window_days() -> i64 { 7 }
fn default_min_confidence() -> f64 { 0.6 }
fn default_freshness_max_age_hours() -> f64 { 24.0 }

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub govt_feed_url: String,
    pub govt_feed_api_key: String,
    pub platform_api_url: String,
    pub platform_api_token: String,
    pub forecast_api_url: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            govt_feed_url: std::env::var("GOVT_FEED_URL").unwrap_or_else(|_| {
                "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070"
                    .to_string()
            }),
            govt_feed_api_key: std::env::var("GOVT_FEED_API_KEY")
                .context("GOVT_FEED_API_KEY not set")?,
            platform_api_url: std::env::var("PLATFORM_API_URL")
                .unwrap_or_else(|_| "https://api.mandi-intel.in/v1".to_string()),
            platform_api_token: std::env::var("PLATFORM_API_TOKEN")
                .context("PLATFORM_API_TOKEN not set")?,
            forecast_api_url: std::env::var("FORECAST_API_URL")
                .unwrap_or_else(|_| "https://forecast.mandi-intel.in/v1".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [system]
            database_path = "mandi.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl_minutes, 30);
        assert_eq!(config.cache.sweep_interval_minutes, 5);
        assert_eq!(config.estimator.window_days, 7);
        assert!((config.estimator.min_confidence - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.system.watchlist.len(), 3);
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [system]
            database_path = "mandi.db"
            watchlist = ["cotton"]

            [cache]
            ttl_minutes = 10

            [estimator]
            window_days = 14
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl_minutes, 10);
        assert_eq!(config.estimator.window_days, 14);
        assert_eq!(config.system.watchlist, vec!["cotton".to_string()]);
    }
}
