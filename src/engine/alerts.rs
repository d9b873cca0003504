use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::stats;
use crate::data::types::{DateRange, GeoPoint, PriceQuery};
use crate::engine::aggregator::Aggregator;
use crate::engine::types::{AlertCondition, PriceAlert};
use crate::engine::EngineError;

/// In-memory per-user alert registry. An alert fires at most once: the
/// first trigger stamps `triggered_at` and flips `notification_sent`.
pub struct AlertRegistry {
    aggregator: Arc<Aggregator>,
    alerts: DashMap<String, Vec<PriceAlert>>,
}

impl AlertRegistry {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            alerts: DashMap::new(),
        }
    }

    pub fn create_alert(
        &self,
        user_id: &str,
        commodity_id: &str,
        target_price: f64,
        condition: AlertCondition,
        tolerance_percent: f64,
        location: Option<GeoPoint>,
    ) -> PriceAlert {
        let alert = PriceAlert {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            commodity_id: commodity_id.to_string(),
            target_price,
            condition,
            tolerance_percent,
            location,
            is_active: true,
            created_at: Utc::now(),
            triggered_at: None,
            notification_sent: false,
        };

        info!(
            "alert {} created: {} {:?} {} for user {}",
            alert.id, commodity_id, condition, target_price, user_id
        );

        self.alerts
            .entry(user_id.to_string())
            .or_default()
            .push(alert.clone());
        alert
    }

    pub fn alerts_for_user(&self, user_id: &str) -> Vec<PriceAlert> {
        self.alerts
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Flips `is_active` off; the alert stays in the registry.
    pub fn deactivate_alert(&self, user_id: &str, alert_id: &str) -> bool {
        if let Some(mut entry) = self.alerts.get_mut(user_id) {
            if let Some(alert) = entry.iter_mut().find(|a| a.id == alert_id) {
                alert.is_active = false;
                return true;
            }
        }
        false
    }

    /// Evaluate a user's active, un-notified alerts against the 24-hour
    /// average price and return the ones that fired.
    pub async fn check_alerts(&self, user_id: &str) -> Result<Vec<PriceAlert>, EngineError> {
        // Snapshot candidates so no shard lock is held across the awaits.
        let candidates: Vec<(String, String, Option<GeoPoint>)> = self
            .alerts
            .get(user_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|a| a.is_active && !a.notification_sent)
                    .map(|a| (a.id.clone(), a.commodity_id.clone(), a.location))
                    .collect()
            })
            .unwrap_or_default();

        let mut triggered = Vec::new();

        for (alert_id, commodity_id, location) in candidates {
            let query = PriceQuery {
                commodity: Some(commodity_id.clone()),
                location,
                date_range: Some(DateRange::last_hours(24)),
                ..Default::default()
            };
            let observations = self.aggregator.query_prices(&query).await?;
            if observations.is_empty() {
                debug!("no recent prices for {}, alert {} skipped", commodity_id, alert_id);
                continue;
            }

            let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
            let average = stats::mean(&prices);

            if let Some(mut entry) = self.alerts.get_mut(user_id) {
                if let Some(alert) = entry.iter_mut().find(|a| a.id == alert_id) {
                    if condition_met(alert, average) {
                        alert.triggered_at.get_or_insert_with(Utc::now);
                        alert.notification_sent = true;
                        info!(
                            "alert {} fired: {} averaged {} against target {}",
                            alert.id, alert.commodity_id, average, alert.target_price
                        );
                        triggered.push(alert.clone());
                    }
                }
            }
        }

        Ok(triggered)
    }
}

fn condition_met(alert: &PriceAlert, average: f64) -> bool {
    match alert.condition {
        AlertCondition::Above => average > alert.target_price,
        AlertCondition::Below => average < alert.target_price,
        AlertCondition::Equals => {
            if alert.target_price <= 0.0 {
                return false;
            }
            let deviation = (average - alert.target_price).abs() / alert.target_price * 100.0;
            deviation <= alert.tolerance_percent
        }
    }
}
