use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::data::types::{PriceObservation, Trend};

/// Statistically derived band a reasonable offer should fall into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairRange {
    pub lower: f64,
    pub upper: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Derived, ephemeral summary of a commodity's price surface. Recomputed on
/// every call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub median: f64,
    pub std_deviation: f64,
    pub fair_range: FairRange,
    pub confidence_interval: ConfidenceInterval,
    pub sample_size: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    VeryHigh,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyLevel {
    High,
    Medium,
    Low,
}

impl DemandLevel {
    /// Fixed inverse mapping: strong demand implies tight supply.
    pub fn implied_supply(&self) -> SupplyLevel {
        match self {
            DemandLevel::VeryHigh => SupplyLevel::Low,
            DemandLevel::High => SupplyLevel::Medium,
            DemandLevel::Medium => SupplyLevel::Medium,
            DemandLevel::Low => SupplyLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub commodity_id: String,
    pub price_range: PriceRange,
    pub demand_level: DemandLevel,
    pub supply_level: SupplyLevel,
    pub volatility: f64,
    pub nearby_markets: Vec<String>,
    pub historical_average: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

/// Per-observation staleness annotation.
#[derive(Debug, Clone)]
pub struct FreshnessCheck {
    pub observation: PriceObservation,
    pub is_stale: bool,
    pub age_hours: f64,
    pub indicator: Freshness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendPeriod {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TrendPeriod {
    pub fn days(&self) -> i64 {
        match self {
            TrendPeriod::Day => 1,
            TrendPeriod::Week => 7,
            TrendPeriod::Month => 30,
            TrendPeriod::Quarter => 90,
            TrendPeriod::Year => 365,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "24h" => Some(TrendPeriod::Day),
            "7d" => Some(TrendPeriod::Week),
            "30d" => Some(TrendPeriod::Month),
            "90d" => Some(TrendPeriod::Quarter),
            "1y" => Some(TrendPeriod::Year),
            _ => None,
        }
    }

    /// Short-horizon forecasts are produced for weekly and monthly windows only.
    pub fn has_forecast(&self) -> bool {
        matches!(self, TrendPeriod::Week | TrendPeriod::Month)
    }
}

/// One calendar day of the trend series: average price, summed volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub date: NaiveDate,
    pub price: f64,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceForecast {
    pub next_week: f64,
    pub next_month: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub peak_months: Vec<u32>,
    pub lean_months: Vec<u32>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTrend {
    pub commodity_id: String,
    pub period: TrendPeriod,
    pub daily: Vec<DailyPrice>,
    pub direction: Trend,
    pub strength: u32,
    pub moving_average: f64,
    pub volatility_index: f64,
    pub levels: SupportResistance,
    pub forecast: Option<PriceForecast>,
    pub seasonal: Option<SeasonalPattern>,
}
