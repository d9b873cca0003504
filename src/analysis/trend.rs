use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use tracing::debug;

use crate::analysis::stats;
use crate::analysis::types::{
    DailyPrice, PriceForecast, PriceTrend, SeasonalPattern, TrendPeriod,
};
use crate::data::types::{DateRange, GeoPoint, PriceObservation, PriceQuery, Trend};
use crate::engine::aggregator::Aggregator;
use crate::engine::EngineError;

/// Trailing window for the daily-series moving average.
const MOVING_AVERAGE_WINDOW: usize = 7;

/// Commodity seasonality, keyed by name substring. Months are 1-based.
const SEASONAL_TABLE: &[(&str, &[u32], &[u32], &str)] = &[
    ("wheat", &[4, 5, 6], &[10, 11, 12], "Prices peak around the rabi harvest"),
    ("rice", &[10, 11, 12], &[2, 3, 4], "Prices peak around the kharif arrivals"),
    ("onion", &[8, 9, 10], &[1, 2, 3], "Prices peak before the late-kharif crop lands"),
    ("potato", &[10, 11, 12], &[3, 4, 5], "Prices peak ahead of the winter harvest"),
    ("cotton", &[9, 10, 11], &[3, 4, 5], "Prices peak as ginning demand ramps up"),
];

/// Derives trend, volatility and short-horizon forecast signals from the
/// aggregated surface.
pub struct TrendAnalyzer {
    aggregator: Arc<Aggregator>,
}

impl TrendAnalyzer {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    pub async fn price_trend(
        &self,
        commodity_id: &str,
        period: TrendPeriod,
        location: Option<&GeoPoint>,
    ) -> Result<PriceTrend, EngineError> {
        let query = PriceQuery {
            commodity: Some(commodity_id.to_string()),
            location: location.copied(),
            date_range: Some(DateRange::last_days(period.days())),
            ..Default::default()
        };

        let observations = self.aggregator.query_prices(&query).await?;
        if observations.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "no price history for {} over the last {} days",
                commodity_id,
                period.days()
            )));
        }

        let daily = daily_series(&observations);
        let prices: Vec<f64> = daily.iter().map(|d| d.price).collect();

        let direction = stats::trend_classification(&prices);
        let strength = stats::trend_strength(&prices);
        let moving_average = stats::moving_average(&prices, MOVING_AVERAGE_WINDOW);
        let average = stats::mean(&prices);
        let volatility_index = if average > 0.0 {
            stats::std_deviation(&prices) / average
        } else {
            0.0
        };
        let levels = stats::support_resistance(&prices);

        let forecast = if period.has_forecast() {
            Some(forecast_from_daily(&daily))
        } else {
            None
        };

        debug!(
            "trend for {}: {:?} over {} daily points, strength {}",
            commodity_id,
            direction,
            daily.len(),
            strength
        );

        Ok(PriceTrend {
            commodity_id: commodity_id.to_string(),
            period,
            daily,
            direction,
            strength,
            moving_average,
            volatility_index,
            levels,
            forecast,
            seasonal: seasonal_pattern(commodity_id),
        })
    }
}

/// Group observations by calendar day: average price, summed volume.
pub fn daily_series(observations: &[PriceObservation]) -> Vec<DailyPrice> {
    let mut days: BTreeMap<NaiveDate, (Vec<f64>, f64, bool)> = BTreeMap::new();

    for obs in observations {
        let entry = days
            .entry(obs.observed_at.date_naive())
            .or_insert_with(|| (Vec::new(), 0.0, false));
        entry.0.push(obs.price);
        if let Some(volume) = obs.metadata.volume_quintals {
            entry.1 += volume;
            entry.2 = true;
        }
    }

    days.into_iter()
        .map(|(date, (prices, volume, has_volume))| DailyPrice {
            date,
            price: stats::mean(&prices),
            volume: has_volume.then_some(volume),
        })
        .collect()
}

/// Forecast policy: below 7 daily points the best guess is the latest
/// price at low confidence; otherwise the last 14 days' trend picks a
/// fixed percentage bump.
fn forecast_from_daily(daily: &[DailyPrice]) -> PriceForecast {
    let last_price = daily.last().map(|d| d.price).unwrap_or(0.0);

    if daily.len() < 7 {
        return PriceForecast {
            next_week: last_price,
            next_month: last_price,
            confidence: 0.3,
        };
    }

    let tail_start = daily.len().saturating_sub(14);
    let tail: Vec<f64> = daily[tail_start..].iter().map(|d| d.price).collect();

    let (week_bump, month_bump, confidence) = match stats::trend_classification(&tail) {
        Trend::Rising => (0.02, 0.05, 0.6),
        Trend::Falling => (-0.02, -0.05, 0.6),
        Trend::Volatile => {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(-0.02..=0.02),
                rng.gen_range(-0.04..=0.04),
                0.4,
            )
        }
        Trend::Stable => (0.0, 0.0, 0.7),
    };

    PriceForecast {
        next_week: last_price * (1.0 + week_bump),
        next_month: last_price * (1.0 + month_bump),
        confidence,
    }
}

fn seasonal_pattern(commodity: &str) -> Option<SeasonalPattern> {
    let name = commodity.to_lowercase();
    SEASONAL_TABLE
        .iter()
        .find(|(key, _, _, _)| name.contains(key))
        .map(|(_, peak, lean, description)| SeasonalPattern {
            peak_months: peak.to_vec(),
            lean_months: lean.to_vec(),
            description: description.to_string(),
        })
}
