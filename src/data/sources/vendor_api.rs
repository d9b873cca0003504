use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::data::sources::{PriceSourceAdapter, TokenSource};
use crate::data::types::{
    ObservationMetadata, PriceObservation, PriceQuery, PriceSource, PriceSubmission, Trend,
};

/// Platform backend holding vendor self-reported prices. All requests carry
/// the bearer credential from the token source.
pub struct VendorApiClient {
    client: Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct VendorPricesResponse {
    #[serde(default)]
    data: Vec<VendorRecord>,
}

/// Raw vendor row. The backend has shipped alternative field names over
/// time; `resolve` normalizes them. Resolution priority:
///   commodity: `commodity`, then `name`
///   market:    `market`, then `mandi`
///   price:     `price`, then `modal_price`
///   timestamp: `observed_at`, then `timestamp`
#[derive(Debug, Default, Deserialize)]
struct VendorRecord {
    commodity_id: Option<String>,
    commodity: Option<String>,
    name: Option<String>,
    market: Option<String>,
    mandi: Option<String>,
    price: Option<f64>,
    modal_price: Option<f64>,
    unit: Option<String>,
    confidence: Option<f64>,
    observed_at: Option<String>,
    timestamp: Option<String>,
    change_percent: Option<f64>,
    quality_grade: Option<String>,
    region: Option<String>,
    volume_quintals: Option<f64>,
}

impl VendorRecord {
    fn resolve(self) -> Option<PriceObservation> {
        let commodity_name = self.commodity.or(self.name)?;
        let price = self.price.or(self.modal_price).filter(|p| *p > 0.0)?;
        let market_name = self
            .market
            .or(self.mandi)
            .unwrap_or_else(|| "unknown".to_string());

        let observed_at = self
            .observed_at
            .or(self.timestamp)
            .and_then(|s| parse_timestamp(&s))
            .unwrap_or_else(Utc::now);

        let change_percent = self.change_percent.unwrap_or(0.0);

        Some(PriceObservation {
            commodity_id: self
                .commodity_id
                .unwrap_or_else(|| commodity_name.trim().to_lowercase().replace(' ', "-")),
            commodity_name,
            price,
            unit: self.unit.unwrap_or_else(|| "quintal".to_string()),
            market_name,
            source: PriceSource::VendorSubmission,
            observed_at,
            confidence: self.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            trend: trend_from_change(change_percent),
            change_percent,
            quality_grade: self.quality_grade,
            metadata: ObservationMetadata {
                min_price: None,
                max_price: None,
                region: self.region,
                volume_quintals: self.volume_quintals,
            },
        })
    }
}

impl VendorApiClient {
    pub fn new(base_url: String, token: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Submit a vendor price to the platform's submission endpoint.
    /// Persistence is the backend's concern; this only reports acceptance.
    pub async fn submit(&self, submission: &PriceSubmission) -> Result<()> {
        let url = format!("{}/prices/submit", self.base_url);

        let response = self
            .authorized(self.client.post(&url).json(submission))
            .send()
            .await
            .context("vendor submission request failed")?;

        if !response.status().is_success() {
            bail!("vendor backend rejected submission: {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSourceAdapter for VendorApiClient {
    fn name(&self) -> &'static str {
        "vendor_submission"
    }

    async fn fetch(&self, query: &PriceQuery) -> Result<Vec<PriceObservation>> {
        let url = format!("{}/prices", self.base_url);
        let mut request = self.client.get(&url);

        if let Some(commodity) = &query.commodity {
            request = request.query(&[("commodity", commodity.as_str())]);
        }

        let response = self
            .authorized(request)
            .send()
            .await
            .context("vendor price request failed")?;

        if !response.status().is_success() {
            bail!("vendor backend returned status {}", response.status());
        }

        let payload: VendorPricesResponse = response
            .json()
            .await
            .context("failed to parse vendor price response")?;

        debug!("vendor backend returned {} rows", payload.data.len());
        Ok(payload.data.into_iter().filter_map(VendorRecord::resolve).collect())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn trend_from_change(change_percent: f64) -> Trend {
    if change_percent > 5.0 {
        Trend::Rising
    } else if change_percent < -5.0 {
        Trend::Falling
    } else {
        Trend::Stable
    }
}
