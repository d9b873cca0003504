use std::sync::Arc;

use tracing::{info, warn};

use crate::analysis::estimator::Estimator;
use crate::analysis::types::PriceRange;
use crate::data::sources::vendor_api::VendorApiClient;
use crate::data::types::{DateRange, GeoPoint, PriceQuery, PriceSubmission};
use crate::engine::aggregator::Aggregator;
use crate::engine::types::{
    PriceVerdict, PriceVerification, SubmissionOutcome, ValidationOutcome,
};
use crate::engine::EngineError;

/// Deviation beyond which no justification can rescue a submission.
const MAX_JUSTIFIED_DEVIATION_PERCENT: f64 = 50.0;

const COMPARISON_WINDOW_DAYS: i64 = 7;

/// Validates vendor submissions and quoted prices against the derived
/// market surface, and forwards accepted submissions to the platform.
pub struct PriceValidator {
    aggregator: Arc<Aggregator>,
    estimator: Estimator,
    vendor: Arc<VendorApiClient>,
}

impl PriceValidator {
    pub fn new(
        aggregator: Arc<Aggregator>,
        estimator: Estimator,
        vendor: Arc<VendorApiClient>,
    ) -> Self {
        Self {
            aggregator,
            estimator,
            vendor,
        }
    }

    /// Judge a submission against the current market context. A price is
    /// acceptable when it sits inside the fair range, or deviates at most
    /// 50% with a stated justification (weather, market conditions, quality
    /// grade, or a harvest/festival season flag).
    pub async fn validate_price(
        &self,
        submission: &PriceSubmission,
    ) -> Result<ValidationOutcome, EngineError> {
        let market_context = self
            .estimator
            .market_context(&submission.commodity_id, submission.location.as_ref())
            .await?;

        let average = market_context.price_range.average;
        let deviation_amount = submission.price - average;
        let deviation_percent = if average > 0.0 {
            deviation_amount / average * 100.0
        } else {
            0.0
        };

        let fair = &market_context.price_range.fair_range;
        let in_fair_range = submission.price >= fair.lower && submission.price <= fair.upper;
        let justified = has_justification(submission);

        let is_valid = in_fair_range
            || (deviation_percent.abs() <= MAX_JUSTIFIED_DEVIATION_PERCENT && justified);

        let mut confidence: f64 = 0.5;
        if in_fair_range {
            confidence += 0.3;
        }
        if deviation_percent.abs() <= 10.0 {
            confidence += 0.2;
        }
        if submission.metadata.weather_condition.is_some() {
            confidence += 0.1;
        }
        if submission.metadata.market_conditions.is_some() {
            confidence += 0.1;
        }
        let confidence = confidence.min(0.99);

        Ok(ValidationOutcome {
            is_valid,
            confidence,
            deviation_amount,
            deviation_percent,
            recommendation: recommendation_for(deviation_percent),
            market_context,
        })
    }

    /// Assess a quoted price a buyer received, with a negotiation hint.
    pub async fn verify_price_quote(
        &self,
        commodity_id: &str,
        quoted_price: f64,
        location: Option<&GeoPoint>,
    ) -> Result<PriceVerification, EngineError> {
        let price_range = self.estimator.price_range(commodity_id, location).await?;

        let market_average = price_range.average;
        let deviation_percent = if market_average > 0.0 {
            (quoted_price - market_average) / market_average * 100.0
        } else {
            0.0
        };

        let verdict = verdict_for(deviation_percent);
        let markets = self.comparable_markets(commodity_id, location).await?;

        let confidence = (0.6
            + price_range.fair_range.confidence * 0.2
            + (markets as f64 * 0.05).min(0.2))
        .min(0.99);

        Ok(PriceVerification {
            commodity_id: commodity_id.to_string(),
            quoted_price,
            market_average,
            deviation_percent,
            verdict,
            confidence,
            suggestion: suggestion_for(verdict, &price_range),
            fair_range: price_range.fair_range,
        })
    }

    /// Validate, then forward to the platform backend. An invalid submission
    /// is never forwarded; a backend failure is reported as an unsuccessful
    /// outcome, not an error.
    pub async fn submit_price(
        &self,
        submission: &PriceSubmission,
    ) -> Result<SubmissionOutcome, EngineError> {
        let validation = self.validate_price(submission).await?;

        if !validation.is_valid {
            info!(
                "rejected submission for {} at {}: {:.1}% off market",
                submission.commodity_id, submission.price, validation.deviation_percent
            );
            return Ok(SubmissionOutcome {
                success: false,
                validation,
            });
        }

        match self.vendor.submit(submission).await {
            Ok(()) => {
                self.aggregator.invalidate_commodity(&submission.commodity_id);
                Ok(SubmissionOutcome {
                    success: true,
                    validation,
                })
            }
            Err(e) => {
                warn!(
                    "platform rejected validated submission for {}: {:#}",
                    submission.commodity_id, e
                );
                Ok(SubmissionOutcome {
                    success: false,
                    validation,
                })
            }
        }
    }

    async fn comparable_markets(
        &self,
        commodity_id: &str,
        location: Option<&GeoPoint>,
    ) -> Result<usize, EngineError> {
        let query = PriceQuery {
            commodity: Some(commodity_id.to_string()),
            location: location.copied(),
            date_range: Some(DateRange::last_days(COMPARISON_WINDOW_DAYS)),
            ..Default::default()
        };
        let observations = self.aggregator.query_prices(&query).await?;

        let mut markets: Vec<&str> = observations.iter().map(|o| o.market_name.as_str()).collect();
        markets.sort_unstable();
        markets.dedup();
        Ok(markets.len())
    }
}

fn has_justification(submission: &PriceSubmission) -> bool {
    let meta = &submission.metadata;
    meta.weather_condition.is_some()
        || meta.market_conditions.is_some()
        || submission.quality_grade.is_some()
        || meta.harvest_season == Some(true)
        || meta.festival_season == Some(true)
}

fn recommendation_for(deviation_percent: f64) -> String {
    if deviation_percent > 50.0 {
        "Price is significantly above market rate. Consider reviewing your pricing.".to_string()
    } else if deviation_percent < -50.0 {
        "Price is significantly below market rate. Verify the quote before proceeding."
            .to_string()
    } else if deviation_percent.abs() > 20.0 {
        "Price deviates notably from the market average. A justification will help buyers."
            .to_string()
    } else {
        "Price is within the expected market range.".to_string()
    }
}

fn verdict_for(deviation_percent: f64) -> PriceVerdict {
    if deviation_percent > 20.0 {
        PriceVerdict::VeryHigh
    } else if deviation_percent > 10.0 {
        PriceVerdict::High
    } else if deviation_percent < -20.0 {
        PriceVerdict::VeryLow
    } else if deviation_percent < -10.0 {
        PriceVerdict::Low
    } else {
        PriceVerdict::Fair
    }
}

fn suggestion_for(verdict: PriceVerdict, price_range: &PriceRange) -> String {
    match verdict {
        PriceVerdict::VeryHigh => format!(
            "Quoted price is well above market. Negotiate towards ₹{:.0} or below.",
            price_range.fair_range.upper
        ),
        PriceVerdict::High => {
            "Quoted price is above the typical range. There is room to negotiate.".to_string()
        }
        PriceVerdict::Fair => "Quoted price is in line with the market.".to_string(),
        PriceVerdict::Low => {
            "Quoted price is below the typical range. Check quality before accepting.".to_string()
        }
        PriceVerdict::VeryLow => {
            "Quoted price is well below market. Verify the offer is genuine.".to_string()
        }
    }
}
