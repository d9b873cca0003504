use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Originating provider of a price observation.
///
/// The priority value doubles as the final sort tie-break in aggregated
/// results: government data outranks vendor reports, which outrank forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    GovernmentFeed,
    VendorSubmission,
    Predicted,
    Manual,
}

impl PriceSource {
    pub fn priority(&self) -> u8 {
        match self {
            PriceSource::GovernmentFeed => 3,
            PriceSource::VendorSubmission => 2,
            PriceSource::Predicted => 1,
            PriceSource::Manual => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::GovernmentFeed => "government_feed",
            PriceSource::VendorSubmission => "vendor_submission",
            PriceSource::Predicted => "predicted",
            PriceSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    Volatile,
}

/// Free-form extras attached by an adapter; all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationMetadata {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub region: Option<String>,
    pub volume_quintals: Option<f64>,
}

/// One normalized price data point. Immutable once produced by an adapter;
/// the aggregator only filters and copies, never mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub commodity_id: String,
    pub commodity_name: String,
    pub price: f64,
    pub unit: String,
    pub market_name: String,
    pub source: PriceSource,
    pub observed_at: DateTime<Utc>,
    pub confidence: f64,
    pub trend: Trend,
    pub change_percent: f64,
    pub quality_grade: Option<String>,
    #[serde(default)]
    pub metadata: ObservationMetadata,
}

impl PriceObservation {
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.observed_at).num_minutes() as f64 / 60.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn last_days(days: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::days(days),
            to,
        }
    }

    pub fn last_hours(hours: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::hours(hours),
            to,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from <= t && t <= self.to
    }

    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }
}

/// Request descriptor for the aggregator. Canonicalized via `cache_key` it
/// also serves as the cache key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceQuery {
    pub commodity: Option<String>,
    pub location: Option<GeoPoint>,
    pub radius_km: Option<f64>,
    pub date_range: Option<DateRange>,
    pub sources: Option<Vec<PriceSource>>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}

impl PriceQuery {
    pub fn for_commodity(commodity: &str) -> Self {
        Self {
            commodity: Some(commodity.to_string()),
            ..Default::default()
        }
    }

    /// Canonical cache key. Covers commodity, location, date range, the
    /// sorted source list and the confidence floor. `limit` is deliberately
    /// excluded: two queries differing only in limit share an entry.
    pub fn cache_key(&self) -> String {
        let commodity = self
            .commodity
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .unwrap_or_else(|| "*".to_string());

        let location = match self.location {
            Some(p) => format!(
                "{:.4},{:.4},{}",
                p.latitude,
                p.longitude,
                self.radius_km
                    .map(|r| format!("{:.1}", r))
                    .unwrap_or_else(|| "*".to_string())
            ),
            None => "*".to_string(),
        };

        let (from, to) = match self.date_range {
            Some(r) => (r.from.to_rfc3339(), r.to.to_rfc3339()),
            None => ("*".to_string(), "*".to_string()),
        };

        let sources = match &self.sources {
            Some(list) => {
                let mut names: Vec<&str> = list.iter().map(|s| s.as_str()).collect();
                names.sort_unstable();
                names.dedup();
                names.join(",")
            }
            None => "*".to_string(),
        };

        let min_confidence = self
            .min_confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "*".to_string());

        format!(
            "commodity={}|loc={}|from={}|to={}|sources={}|minconf={}",
            commodity, location, from, to, sources, min_confidence
        )
    }
}

/// Context a vendor may attach to justify an out-of-band price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub weather_condition: Option<String>,
    pub market_conditions: Option<String>,
    pub harvest_season: Option<bool>,
    pub festival_season: Option<bool>,
}

/// A vendor's self-reported price, as posted to the platform backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSubmission {
    pub commodity_id: String,
    pub commodity_name: String,
    pub price: f64,
    pub unit: String,
    pub market_name: String,
    pub location: Option<GeoPoint>,
    pub quality_grade: Option<String>,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
}

/// One cache entry: an aggregated result frozen at `cached_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub observations: Vec<PriceObservation>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub key_query: String,
}

impl CachedResult {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
