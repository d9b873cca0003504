use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::analysis::stats;
use crate::analysis::trend::daily_series;
use crate::analysis::types::{
    DemandLevel, Freshness, FreshnessCheck, MarketContext, PriceRange,
};
use crate::data::types::{DateRange, GeoPoint, PriceQuery};
use crate::engine::aggregator::Aggregator;
use crate::engine::EngineError;

const NEARBY_MARKETS_CAP: usize = 5;

/// Turns the aggregated observation window into rounded, user-facing
/// price summaries. Every derived rupee figure is rounded to the whole
/// rupee; confidences and levels are left as-is.
#[derive(Clone)]
pub struct Estimator {
    aggregator: Arc<Aggregator>,
    window_days: i64,
    min_confidence: f64,
    max_age_hours: f64,
}

impl Estimator {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self::with_settings(aggregator, 7, 0.6, 24.0)
    }

    pub fn with_settings(
        aggregator: Arc<Aggregator>,
        window_days: i64,
        min_confidence: f64,
        max_age_hours: f64,
    ) -> Self {
        Self {
            aggregator,
            window_days,
            min_confidence,
            max_age_hours,
        }
    }

    fn window_query(&self, commodity: &str, location: Option<&GeoPoint>) -> PriceQuery {
        PriceQuery {
            commodity: Some(commodity.to_string()),
            location: location.copied(),
            date_range: Some(DateRange::last_days(self.window_days)),
            min_confidence: Some(self.min_confidence),
            ..Default::default()
        }
    }

    /// Summarize the recent price surface for a commodity.
    pub async fn price_range(
        &self,
        commodity: &str,
        location: Option<&GeoPoint>,
    ) -> Result<PriceRange, EngineError> {
        let query = self.window_query(commodity, location);
        let observations = self.aggregator.query_prices(&query).await?;

        if observations.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "no observations for {} in the last {} days above confidence {}",
                commodity, self.window_days, self.min_confidence
            )));
        }

        let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
        let average = stats::mean(&prices);
        let std_dev = stats::std_deviation(&prices);

        let mut fair_range = stats::fair_price_range(&prices, average, std_dev, &observations);
        fair_range.lower = fair_range.lower.round();
        fair_range.upper = fair_range.upper.round();

        let mut interval = stats::confidence_interval(&prices, average, std_dev, 0.95);
        interval.lower = interval.lower.round();
        interval.upper = interval.upper.round();

        let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        debug!(
            "price range for {}: {} observations, avg {}",
            commodity,
            observations.len(),
            average.round()
        );

        Ok(PriceRange {
            min: min.round(),
            max: max.round(),
            average: average.round(),
            median: stats::median(&prices).round(),
            std_deviation: std_dev.round(),
            fair_range,
            confidence_interval: interval,
            sample_size: observations.len(),
            last_updated: Utc::now(),
        })
    }

    /// Annotate each observation in the window with a staleness indicator.
    pub async fn check_data_freshness(
        &self,
        commodity: &str,
        location: Option<&GeoPoint>,
    ) -> Result<Vec<FreshnessCheck>, EngineError> {
        let query = self.window_query(commodity, location);
        let observations = self.aggregator.query_prices(&query).await?;
        let now = Utc::now();
        let aging_threshold = self.max_age_hours / 2.0;

        Ok(observations
            .into_iter()
            .map(|observation| {
                let age_hours = observation.age_hours(now);
                let indicator = if age_hours > self.max_age_hours {
                    Freshness::Stale
                } else if age_hours >= aging_threshold {
                    Freshness::Aging
                } else {
                    Freshness::Fresh
                };
                FreshnessCheck {
                    observation,
                    is_stale: indicator == Freshness::Stale,
                    age_hours,
                    indicator,
                }
            })
            .collect())
    }

    /// Price range plus demand/supply posture, volatility and nearby markets.
    /// The second window query lands on the cache entry `price_range` filled.
    pub async fn market_context(
        &self,
        commodity: &str,
        location: Option<&GeoPoint>,
    ) -> Result<MarketContext, EngineError> {
        let price_range = self.price_range(commodity, location).await?;

        let query = self.window_query(commodity, location);
        let mut observations = self.aggregator.query_prices(&query).await?;
        observations.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));

        let tail_start = observations.len().saturating_sub(7);
        let recent = &observations[tail_start..];
        let recent_prices: Vec<f64> = recent.iter().map(|o| o.price).collect();
        let recent_trend = stats::trend_classification(&recent_prices);

        let volumes: Vec<f64> = recent
            .iter()
            .filter_map(|o| o.metadata.volume_quintals)
            .collect();
        let avg_volume = stats::mean(&volumes);

        let demand_level = demand_from(recent_trend, avg_volume);
        let supply_level = demand_level.implied_supply();

        let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
        let average = stats::mean(&prices);
        let volatility = if average > 0.0 {
            stats::std_deviation(&prices) / average
        } else {
            0.0
        };

        let mut nearby_markets = Vec::new();
        for obs in &observations {
            if !nearby_markets.contains(&obs.market_name) {
                nearby_markets.push(obs.market_name.clone());
            }
            if nearby_markets.len() >= NEARBY_MARKETS_CAP {
                break;
            }
        }

        let daily = daily_series(&observations);
        let daily_means: Vec<f64> = daily.iter().map(|d| d.price).collect();
        let historical_average = stats::mean(&daily_means).round();

        Ok(MarketContext {
            commodity_id: commodity.to_string(),
            price_range,
            demand_level,
            supply_level,
            volatility,
            nearby_markets,
            historical_average,
            updated_at: Utc::now(),
        })
    }
}

/// Demand posture from the recent trend and average traded volume.
fn demand_from(recent_trend: crate::data::types::Trend, avg_volume: f64) -> DemandLevel {
    use crate::data::types::Trend;
    match recent_trend {
        Trend::Rising if avg_volume > 1000.0 => DemandLevel::VeryHigh,
        Trend::Rising => DemandLevel::High,
        Trend::Falling => DemandLevel::Low,
        _ => DemandLevel::Medium,
    }
}
