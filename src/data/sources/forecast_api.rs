use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::data::sources::{PriceSourceAdapter, TokenSource};
use crate::data::types::{
    ObservationMetadata, PriceObservation, PriceQuery, PriceSource, Trend,
};

/// Forecasting backend serving model-predicted prices.
pub struct ForecastClient {
    client: Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    predictions: Vec<ForecastRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastRecord {
    commodity_id: Option<String>,
    commodity: Option<String>,
    predicted_price: Option<f64>,
    price: Option<f64>,
    unit: Option<String>,
    market: Option<String>,
    confidence: Option<f64>,
    valid_on: Option<String>,
    expected_change_percent: Option<f64>,
}

impl ForecastRecord {
    fn resolve(self) -> Option<PriceObservation> {
        let commodity_name = self.commodity?;
        let price = self.predicted_price.or(self.price).filter(|p| *p > 0.0)?;
        let change_percent = self.expected_change_percent.unwrap_or(0.0);

        Some(PriceObservation {
            commodity_id: self
                .commodity_id
                .unwrap_or_else(|| commodity_name.trim().to_lowercase().replace(' ', "-")),
            commodity_name,
            price,
            unit: self.unit.unwrap_or_else(|| "quintal".to_string()),
            market_name: self.market.unwrap_or_else(|| "projected".to_string()),
            source: PriceSource::Predicted,
            observed_at: self
                .valid_on
                .and_then(|s| parse_timestamp(&s))
                .unwrap_or_else(Utc::now),
            confidence: self.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            trend: if change_percent > 5.0 {
                Trend::Rising
            } else if change_percent < -5.0 {
                Trend::Falling
            } else {
                Trend::Stable
            },
            change_percent,
            quality_grade: None,
            metadata: ObservationMetadata::default(),
        })
    }
}

impl ForecastClient {
    pub fn new(base_url: String, token: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }
}

#[async_trait]
impl PriceSourceAdapter for ForecastClient {
    fn name(&self) -> &'static str {
        "predicted"
    }

    async fn fetch(&self, query: &PriceQuery) -> Result<Vec<PriceObservation>> {
        let url = format!("{}/predictions", self.base_url);
        let mut request = self.client.get(&url);

        if let Some(commodity) = &query.commodity {
            request = request.query(&[("commodity", commodity.as_str())]);
        }
        if let Some(token) = self.token.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("forecast backend request failed")?;

        if !response.status().is_success() {
            bail!("forecast backend returned status {}", response.status());
        }

        let payload: ForecastResponse = response
            .json()
            .await
            .context("failed to parse forecast response")?;

        debug!("forecast backend returned {} rows", payload.predictions.len());
        Ok(payload
            .predictions
            .into_iter()
            .filter_map(ForecastRecord::resolve)
            .collect())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
