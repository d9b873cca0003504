use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::data::sources::PriceSourceAdapter;
use crate::data::types::{
    ObservationMetadata, PriceObservation, PriceQuery, PriceSource, Trend,
};

/// Government statistics feed of mandi arrival records. Treated as highly
/// reliable: every observation carries a fixed 0.9 confidence.
pub struct GovtFeedClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    records: Vec<FeedRecord>,
    #[allow(dead_code)]
    #[serde(default)]
    total: u64,
    #[allow(dead_code)]
    #[serde(default)]
    count: u64,
    #[allow(dead_code)]
    #[serde(default)]
    offset: u64,
}

/// Raw arrival record; the feed serializes its numeric fields as strings.
#[derive(Debug, Default, Deserialize)]
struct FeedRecord {
    state: Option<String>,
    district: Option<String>,
    market: Option<String>,
    commodity: Option<String>,
    variety: Option<String>,
    arrival_date: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    modal_price: Option<String>,
}

impl GovtFeedClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }

    async fn fetch_records(&self, query: &PriceQuery) -> Result<Vec<FeedRecord>> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("api-key", self.api_key.as_str()),
            ("format", "json"),
            ("limit", "100"),
        ]);

        if let Some(commodity) = &query.commodity {
            request = request.query(&[("filters[commodity]", commodity.as_str())]);
        }

        let response = request
            .send()
            .await
            .context("government feed request failed")?;

        if !response.status().is_success() {
            bail!("government feed returned status {}", response.status());
        }

        let payload: FeedResponse = response
            .json()
            .await
            .context("failed to parse government feed response")?;

        Ok(payload.records)
    }

    fn convert_record(&self, record: FeedRecord) -> Option<PriceObservation> {
        let commodity = record.commodity?;
        let modal = parse_price(record.modal_price.as_deref())?;
        let min = parse_price(record.min_price.as_deref());
        let max = parse_price(record.max_price.as_deref());

        let observed_at = record
            .arrival_date
            .as_deref()
            .and_then(parse_arrival_date)
            .unwrap_or_else(Utc::now);

        let region = match (record.district, record.state) {
            (Some(d), Some(s)) => Some(format!("{}, {}", d, s)),
            (Some(d), None) => Some(d),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        };

        Some(PriceObservation {
            commodity_id: slugify(&commodity),
            commodity_name: commodity,
            price: modal,
            unit: "quintal".to_string(),
            market_name: record.market.unwrap_or_else(|| "unknown".to_string()),
            source: PriceSource::GovernmentFeed,
            observed_at,
            confidence: 0.9,
            trend: band_trend(modal, min, max),
            change_percent: 0.0,
            quality_grade: record.variety,
            metadata: ObservationMetadata {
                min_price: min,
                max_price: max,
                region,
                volume_quintals: None,
            },
        })
    }
}

#[async_trait]
impl PriceSourceAdapter for GovtFeedClient {
    fn name(&self) -> &'static str {
        "government_feed"
    }

    async fn fetch(&self, query: &PriceQuery) -> Result<Vec<PriceObservation>> {
        let records = self.fetch_records(query).await?;
        debug!("government feed returned {} records", records.len());

        Ok(records
            .into_iter()
            .filter_map(|r| self.convert_record(r))
            .collect())
    }
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|p| *p > 0.0)
}

/// Position of the modal price within the [min, max] arrival band: near the
/// top reads as rising, near the bottom as falling.
fn band_trend(modal: f64, min: Option<f64>, max: Option<f64>) -> Trend {
    match (min, max) {
        (Some(lo), Some(hi)) if hi > lo => {
            let position = (modal - lo) / (hi - lo);
            if position > 0.7 {
                Trend::Rising
            } else if position < 0.3 {
                Trend::Falling
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    }
}

/// The feed dates arrivals as DD/MM/YYYY.
fn parse_arrival_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_trend_positions() {
        assert_eq!(band_trend(1950.0, Some(1000.0), Some(2000.0)), Trend::Rising);
        assert_eq!(band_trend(1050.0, Some(1000.0), Some(2000.0)), Trend::Falling);
        assert_eq!(band_trend(1500.0, Some(1000.0), Some(2000.0)), Trend::Stable);
        // Degenerate band
        assert_eq!(band_trend(1500.0, Some(1500.0), Some(1500.0)), Trend::Stable);
        assert_eq!(band_trend(1500.0, None, Some(2000.0)), Trend::Stable);
    }

    #[test]
    fn test_parse_arrival_date() {
        let parsed = parse_arrival_date("15/03/2026").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-15T00:00:00+00:00");
        assert!(parse_arrival_date("2026-03-15").is_none());
    }

    #[test]
    fn test_convert_record() {
        let client = GovtFeedClient::new("http://localhost".to_string(), "key".to_string());
        let record = FeedRecord {
            state: Some("Punjab".to_string()),
            district: Some("Ludhiana".to_string()),
            market: Some("Khanna".to_string()),
            commodity: Some("Wheat".to_string()),
            variety: Some("Dara".to_string()),
            arrival_date: Some("01/02/2026".to_string()),
            min_price: Some("1900".to_string()),
            max_price: Some("2100".to_string()),
            modal_price: Some("2050".to_string()),
        };

        let obs = client.convert_record(record).unwrap();
        assert_eq!(obs.commodity_id, "wheat");
        assert_eq!(obs.price, 2050.0);
        assert_eq!(obs.source, PriceSource::GovernmentFeed);
        assert!((obs.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(obs.trend, Trend::Rising);
        assert_eq!(obs.metadata.min_price, Some(1900.0));
        assert_eq!(obs.metadata.region.as_deref(), Some("Ludhiana, Punjab"));
    }

    #[test]
    fn test_convert_record_rejects_missing_modal_price() {
        let client = GovtFeedClient::new("http://localhost".to_string(), "key".to_string());
        let record = FeedRecord {
            commodity: Some("Wheat".to_string()),
            modal_price: Some("0".to_string()),
            ..Default::default()
        };
        assert!(client.convert_record(record).is_none());
    }
}
