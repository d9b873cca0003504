use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::data::cache::QueryCache;
use crate::data::sources::PriceSourceAdapter;
use crate::data::types::{GeoPoint, PriceObservation, PriceQuery};
use crate::engine::EngineError;

/// Fans a query out to every registered source, merges partial successes,
/// filters and sorts the union, and caches the result.
pub struct Aggregator {
    sources: Vec<Arc<dyn PriceSourceAdapter>>,
    cache: Arc<QueryCache>,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn PriceSourceAdapter>>, cache: Arc<QueryCache>) -> Self {
        Self { sources, cache }
    }

    /// Drop cached results referencing a commodity, typically after a new
    /// submission for it was accepted.
    pub fn invalidate_commodity(&self, commodity: &str) {
        self.cache.invalidate_commodity(commodity);
    }

    pub async fn query_prices(
        &self,
        query: &PriceQuery,
    ) -> Result<Vec<PriceObservation>, EngineError> {
        if let Some(range) = &query.date_range {
            if !range.is_valid() {
                return Err(EngineError::InvalidQuery(format!(
                    "date range starts after it ends: {} > {}",
                    range.from, range.to
                )));
            }
        }
        if let Some(min) = query.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(EngineError::InvalidQuery(format!(
                    "minimum confidence {} outside [0, 1]",
                    min
                )));
            }
        }

        let key = query.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!("cache hit for {}", key);
            return Ok(hit);
        }

        // Settle-all join: every (source, result) pair is collected; a
        // failing source degrades coverage, never the whole query.
        let fetches = self.sources.iter().map(|source| {
            let source = source.clone();
            let query = query.clone();
            async move { (source.name(), source.fetch(&query).await) }
        });

        let mut merged = Vec::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(observations) => {
                    debug!("{} contributed {} observations", name, observations.len());
                    merged.extend(observations);
                }
                Err(e) => warn!("source {} unavailable: {:#}", name, e),
            }
        }

        let mut result: Vec<PriceObservation> = merged
            .into_iter()
            .filter(|obs| matches_query(obs, query))
            .collect();

        sort_by_relevance(&mut result);

        if let Some(limit) = query.limit {
            result.truncate(limit);
        }

        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Filter order: commodity, location radius, date range, source allow-list,
/// minimum confidence.
fn matches_query(obs: &PriceObservation, query: &PriceQuery) -> bool {
    if let Some(commodity) = &query.commodity {
        let needle = commodity.trim().to_lowercase();
        let name_match = obs.commodity_name.to_lowercase().contains(&needle);
        let id_match = obs.commodity_id.eq_ignore_ascii_case(commodity.trim());
        if !name_match && !id_match {
            return false;
        }
    }

    if let (Some(center), Some(radius)) = (query.location.as_ref(), query.radius_km) {
        if !within_radius(center, radius, obs) {
            return false;
        }
    }

    if let Some(range) = &query.date_range {
        if !range.contains(obs.observed_at) {
            return false;
        }
    }

    if let Some(sources) = &query.sources {
        if !sources.contains(&obs.source) {
            return false;
        }
    }

    if let Some(min) = query.min_confidence {
        if obs.confidence < min {
            return false;
        }
    }

    true
}

/// Radius containment for the location filter. Observations carry no
/// coordinates yet, so every candidate is treated as in-range; a haversine
/// check against geocoded market locations is the pending replacement.
fn within_radius(_center: &GeoPoint, _radius_km: f64, _obs: &PriceObservation) -> bool {
    true
}

/// Hard ordering invariant for aggregated results: confidence descending,
/// then recency, then source priority.
fn sort_by_relevance(observations: &mut [PriceObservation]) {
    observations.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.observed_at.cmp(&a.observed_at))
            .then_with(|| b.source.priority().cmp(&a.source.priority()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use crate::data::types::{DateRange, ObservationMetadata, PriceSource, Trend};

    struct StubSource {
        name: &'static str,
        observations: Vec<PriceObservation>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubSource {
        fn new(name: &'static str, observations: Vec<PriceObservation>) -> Arc<Self> {
            Arc::new(Self {
                name,
                observations,
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                observations: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSourceAdapter for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _query: &PriceQuery) -> anyhow::Result<Vec<PriceObservation>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail {
                bail!("{} is down", self.name);
            }
            Ok(self.observations.clone())
        }
    }

    fn obs(
        commodity: &str,
        price: f64,
        confidence: f64,
        source: PriceSource,
        hours_ago: i64,
    ) -> PriceObservation {
        PriceObservation {
            commodity_id: commodity.to_lowercase().replace(' ', "-"),
            commodity_name: commodity.to_string(),
            price,
            unit: "quintal".to_string(),
            market_name: "Azadpur".to_string(),
            source,
            observed_at: Utc::now() - Duration::hours(hours_ago),
            confidence,
            trend: Trend::Stable,
            change_percent: 0.0,
            quality_grade: None,
            metadata: ObservationMetadata::default(),
        }
    }

    fn aggregator_with(sources: Vec<Arc<dyn PriceSourceAdapter>>) -> Aggregator {
        Aggregator::new(sources, Arc::new(QueryCache::new(30)))
    }

    #[tokio::test]
    async fn test_cache_idempotence_single_fanout() {
        let source = StubSource::new("government_feed", vec![obs(
            "Wheat",
            2000.0,
            0.9,
            PriceSource::GovernmentFeed,
            1,
        )]);
        let aggregator = aggregator_with(vec![source.clone()]);
        let query = PriceQuery::for_commodity("wheat");

        let first = aggregator.query_prices(&query).await.unwrap();
        let second = aggregator.query_prices(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_coverage() {
        let healthy = StubSource::new("vendor_submission", vec![obs(
            "Wheat",
            2000.0,
            0.7,
            PriceSource::VendorSubmission,
            1,
        )]);
        let broken = StubSource::failing("government_feed");
        let aggregator = aggregator_with(vec![healthy, broken.clone()]);

        let result = aggregator
            .query_prices(&PriceQuery::for_commodity("wheat"))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(broken.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_empty_result() {
        let aggregator = aggregator_with(vec![
            StubSource::failing("government_feed"),
            StubSource::failing("vendor_submission"),
            StubSource::failing("predicted"),
        ]);

        let result = aggregator
            .query_prices(&PriceQuery::for_commodity("wheat"))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_sort_confidence_desc_regardless_of_input_order() {
        let source = StubSource::new(
            "vendor_submission",
            vec![
                obs("Wheat", 1950.0, 0.4, PriceSource::VendorSubmission, 2),
                obs("Wheat", 2100.0, 0.9, PriceSource::VendorSubmission, 5),
                obs("Wheat", 2000.0, 0.7, PriceSource::VendorSubmission, 1),
            ],
        );
        let aggregator = aggregator_with(vec![source]);

        let result = aggregator
            .query_prices(&PriceQuery::for_commodity("wheat"))
            .await
            .unwrap();

        let confidences: Vec<f64> = result.iter().map(|o| o.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7, 0.4]);
    }

    #[tokio::test]
    async fn test_tie_breaks_recency_then_source_priority() {
        let now = Utc::now();
        let mut older_gov = obs("Wheat", 2000.0, 0.8, PriceSource::GovernmentFeed, 0);
        older_gov.observed_at = now - Duration::hours(10);
        let mut newer_vendor = obs("Wheat", 2010.0, 0.8, PriceSource::VendorSubmission, 0);
        newer_vendor.observed_at = now - Duration::hours(1);
        let mut tied_predicted = obs("Wheat", 2020.0, 0.8, PriceSource::Predicted, 0);
        tied_predicted.observed_at = older_gov.observed_at;

        let source = StubSource::new(
            "mixed",
            vec![tied_predicted, older_gov, newer_vendor],
        );
        let aggregator = aggregator_with(vec![source]);

        let result = aggregator
            .query_prices(&PriceQuery::for_commodity("wheat"))
            .await
            .unwrap();

        // Same confidence: recency wins, then source priority breaks the
        // remaining tie (government over predicted).
        assert_eq!(result[0].source, PriceSource::VendorSubmission);
        assert_eq!(result[1].source, PriceSource::GovernmentFeed);
        assert_eq!(result[2].source, PriceSource::Predicted);
    }

    #[tokio::test]
    async fn test_filters_commodity_sources_confidence_and_limit() {
        let source = StubSource::new(
            "mixed",
            vec![
                obs("Wheat", 2000.0, 0.9, PriceSource::GovernmentFeed, 1),
                obs("Basmati Rice", 3200.0, 0.9, PriceSource::GovernmentFeed, 1),
                obs("Wheat", 1990.0, 0.3, PriceSource::VendorSubmission, 1),
                obs("Wheat", 2040.0, 0.8, PriceSource::Predicted, 1),
            ],
        );
        let aggregator = aggregator_with(vec![source]);

        let query = PriceQuery {
            commodity: Some("wheat".to_string()),
            sources: Some(vec![PriceSource::GovernmentFeed, PriceSource::Predicted]),
            min_confidence: Some(0.5),
            limit: Some(1),
            ..Default::default()
        };

        let result = aggregator.query_prices(&query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source, PriceSource::GovernmentFeed);
    }

    #[tokio::test]
    async fn test_date_range_filter_is_inclusive() {
        let fresh = obs("Wheat", 2000.0, 0.9, PriceSource::GovernmentFeed, 1);
        let stale = obs("Wheat", 1900.0, 0.9, PriceSource::GovernmentFeed, 24 * 10);
        let source = StubSource::new("government_feed", vec![fresh, stale]);
        let aggregator = aggregator_with(vec![source]);

        let query = PriceQuery {
            commodity: Some("wheat".to_string()),
            date_range: Some(DateRange::last_days(7)),
            ..Default::default()
        };

        let result = aggregator.query_prices(&query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].price, 2000.0);
    }

    #[tokio::test]
    async fn test_invalid_date_range_rejected_before_fanout() {
        let source = StubSource::new("government_feed", Vec::new());
        let aggregator = aggregator_with(vec![source.clone()]);

        let now = Utc::now();
        let query = PriceQuery {
            date_range: Some(DateRange {
                from: now,
                to: now - Duration::days(1),
            }),
            ..Default::default()
        };

        let err = aggregator.query_prices(&query).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_commodity_matches_substring_or_exact_id() {
        let source = StubSource::new(
            "government_feed",
            vec![
                obs("Basmati Rice", 3200.0, 0.9, PriceSource::GovernmentFeed, 1),
                obs("Onion", 1400.0, 0.9, PriceSource::GovernmentFeed, 1),
            ],
        );
        let aggregator = aggregator_with(vec![source]);

        let by_substring = aggregator
            .query_prices(&PriceQuery::for_commodity("rice"))
            .await
            .unwrap();
        assert_eq!(by_substring.len(), 1);

        let by_id = aggregator
            .query_prices(&PriceQuery::for_commodity("basmati-rice"))
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
    }
}
