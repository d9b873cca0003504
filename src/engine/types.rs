use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::types::{FairRange, MarketContext};
use crate::data::types::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    Above,
    Below,
    Equals,
}

/// User-owned price alert. Long-lived: deactivation only flips `is_active`,
/// alerts are never removed from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: String,
    pub user_id: String,
    pub commodity_id: String,
    pub target_price: f64,
    pub condition: AlertCondition,
    pub tolerance_percent: f64,
    pub location: Option<GeoPoint>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
}

/// Verdict on a vendor's submitted price.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub confidence: f64,
    pub deviation_amount: f64,
    pub deviation_percent: f64,
    pub recommendation: String,
    pub market_context: MarketContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceVerdict {
    Fair,
    High,
    VeryHigh,
    Low,
    VeryLow,
}

/// Assessment of a quoted price against the derived surface, with a
/// negotiation suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct PriceVerification {
    pub commodity_id: String,
    pub quoted_price: f64,
    pub market_average: f64,
    pub deviation_percent: f64,
    pub verdict: PriceVerdict,
    pub confidence: f64,
    pub suggestion: String,
    pub fair_range: FairRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub validation: ValidationOutcome,
}
