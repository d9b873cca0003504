//! Statistics kernel: pure numeric functions over price series and
//! observation sets. No I/O, no state.

use chrono::Utc;
use std::collections::HashSet;

use crate::analysis::types::{ConfidenceInterval, FairRange, SupportResistance};
use crate::data::types::{PriceObservation, PriceSource, Trend};

/// Two-sided Student-t critical values at the 95% level, keyed by degrees
/// of freedom. Sparse on purpose: lookups fall back to the nearest
/// tabulated df at or below the actual df, defaulting to 2.045.
const T_TABLE: &[(usize, f64)] = &[
    (1, 12.706),
    (2, 4.303),
    (3, 3.182),
    (4, 2.776),
    (5, 2.571),
    (6, 2.447),
    (7, 2.365),
    (8, 2.306),
    (9, 2.262),
    (10, 2.228),
    (12, 2.179),
    (15, 2.131),
    (20, 2.086),
    (25, 2.060),
    (29, 2.045),
];

const T_DEFAULT: f64 = 2.045;
const Z_95: f64 = 1.96;

/// Hours after which an observation's weight has fully decayed.
const FRESHNESS_HORIZON_HOURS: f64 = 48.0;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median; average of the two middle elements on even-length input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Population standard deviation.
pub fn std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile by index: element at `floor(n * q)` of the sorted input.
fn percentile_by_index(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Reliability weight per originating source.
pub fn source_weight(source: PriceSource) -> f64 {
    match source {
        PriceSource::GovernmentFeed => 1.0,
        PriceSource::VendorSubmission => 0.8,
        PriceSource::Predicted => 0.6,
        PriceSource::Manual => 0.4,
    }
}

/// Linear freshness decay over 48 hours, floored at 0.1.
pub fn freshness_decay(age_hours: f64) -> f64 {
    (1.0 - age_hours / FRESHNESS_HORIZON_HOURS).max(0.1)
}

/// Confidence-weighted average price: each observation weighted by source
/// reliability, stated confidence, and freshness decay.
pub fn weighted_average(observations: &[PriceObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let now = Utc::now();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for obs in observations {
        let weight =
            source_weight(obs.source) * obs.confidence * freshness_decay(obs.age_hours(now));
        weighted_sum += obs.price * weight;
        weight_total += weight;
    }

    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        mean(&observations.iter().map(|o| o.price).collect::<Vec<_>>())
    }
}

/// Fair price band from three candidate ranges: an IQR band with a half-IQR
/// margin, a one-sigma band around the average, and the observed min/max.
/// The tightest bound on each side wins, then the band is widened just
/// enough to contain the average (and the confidence-weighted average) so
/// `lower <= average <= upper` always holds for non-empty samples.
pub fn fair_price_range(
    prices: &[f64],
    average: f64,
    std_dev: f64,
    observations: &[PriceObservation],
) -> FairRange {
    if prices.is_empty() {
        return FairRange {
            lower: 0.0,
            upper: 0.0,
            confidence: 0.1,
        };
    }

    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = percentile_by_index(&sorted, 0.25);
    let q3 = percentile_by_index(&sorted, 0.75);
    let iqr = q3 - q1;

    let iqr_lower = q1 - 0.5 * iqr;
    let iqr_upper = q3 + 0.5 * iqr;
    let std_lower = average - std_dev;
    let std_upper = average + std_dev;
    let observed_min = sorted[0];
    let observed_max = sorted[sorted.len() - 1];

    let weighted = if observations.is_empty() {
        average
    } else {
        weighted_average(observations)
    };

    let lower = iqr_lower
        .max(std_lower)
        .max(observed_min)
        .min(average)
        .min(weighted);
    let upper = iqr_upper
        .min(std_upper)
        .min(observed_max)
        .max(average)
        .max(weighted);

    FairRange {
        lower,
        upper,
        confidence: range_confidence(observations),
    }
}

/// Confidence score for a derived range: base 0.5, bonuses for sample size,
/// average observation confidence, and source diversity. Clamped to
/// [0.1, 0.99] for any input, including empty and single-element sets.
pub fn range_confidence(observations: &[PriceObservation]) -> f64 {
    let n = observations.len();
    let mut confidence = 0.5;

    if n >= 50 {
        confidence += 0.3;
    } else if n >= 20 {
        confidence += 0.2;
    } else if n >= 10 {
        confidence += 0.1;
    }

    let avg_confidence = if n == 0 {
        0.0
    } else {
        observations.iter().map(|o| o.confidence).sum::<f64>() / n as f64
    };
    confidence += (avg_confidence - 0.5) * 0.4;

    let distinct_sources: HashSet<PriceSource> =
        observations.iter().map(|o| o.source).collect();
    confidence += (distinct_sources.len() as f64 * 0.05).min(0.2);

    confidence.clamp(0.1, 0.99)
}

fn t_critical(df: usize) -> f64 {
    T_TABLE
        .iter()
        .take_while(|(tabulated, _)| *tabulated <= df)
        .last()
        .map(|(_, t)| *t)
        .unwrap_or(T_DEFAULT)
}

/// Confidence interval around the mean: Student-t for n < 30 from the
/// sparse table, normal z-value otherwise.
pub fn confidence_interval(
    prices: &[f64],
    sample_mean: f64,
    std_dev: f64,
    level: f64,
) -> ConfidenceInterval {
    let n = prices.len();
    if n == 0 {
        return ConfidenceInterval {
            lower: sample_mean,
            upper: sample_mean,
            level,
        };
    }

    let standard_error = std_dev / (n as f64).sqrt();
    let critical = if n < 30 { t_critical(n - 1) } else { Z_95 };
    let margin = critical * standard_error;

    ConfidenceInterval {
        lower: sample_mean - margin,
        upper: sample_mean + margin,
        level,
    }
}

/// Simple trailing average over the last `window` points; falls back to the
/// last available price when the series is shorter than the window.
pub fn moving_average(series: &[f64], window: usize) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    if series.len() < window || window == 0 {
        return series[series.len() - 1];
    }
    let tail = &series[series.len() - window..];
    tail.iter().sum::<f64>() / window as f64
}

/// First-vs-last classification with a 5% threshold; flat series are split
/// into volatile/stable on a 10% coefficient of variation.
pub fn trend_classification(points: &[f64]) -> Trend {
    if points.len() < 2 {
        return Trend::Stable;
    }

    let first = points[0];
    let last = points[points.len() - 1];

    if first > 0.0 {
        let change = (last - first) / first;
        if change > 0.05 {
            return Trend::Rising;
        }
        if change < -0.05 {
            return Trend::Falling;
        }
    }

    let avg = mean(points);
    let volatility = if avg > 0.0 {
        std_deviation(points) / avg
    } else {
        0.0
    };

    if volatility > 0.10 {
        Trend::Volatile
    } else {
        Trend::Stable
    }
}

/// Directional conviction: |up-moves − down-moves| over total moves, as a
/// rounded percentage. 0 for series with no moves.
pub fn trend_strength(points: &[f64]) -> u32 {
    let mut up = 0i64;
    let mut down = 0i64;

    for pair in points.windows(2) {
        if pair[1] > pair[0] {
            up += 1;
        } else if pair[1] < pair[0] {
            down += 1;
        }
    }

    let moves = up + down;
    if moves == 0 {
        return 0;
    }
    ((up - down).abs() as f64 / moves as f64 * 100.0).round() as u32
}

/// Support/resistance from the densest of 10 equal-width price buckets.
pub fn support_resistance(points: &[f64]) -> SupportResistance {
    if points.is_empty() {
        return SupportResistance {
            support: 0.0,
            resistance: 0.0,
        };
    }

    let min = points.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = points.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return SupportResistance {
            support: min,
            resistance: max,
        };
    }

    const BUCKETS: usize = 10;
    let width = (max - min) / BUCKETS as f64;
    let mut counts = [0usize; BUCKETS];
    for p in points {
        let idx = (((p - min) / width).floor() as usize).min(BUCKETS - 1);
        counts[idx] += 1;
    }

    let densest = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| **c)
        .map(|(i, _)| i)
        .unwrap_or(0);

    SupportResistance {
        support: min + densest as f64 * width,
        resistance: min + (densest + 1) as f64 * width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::data::types::ObservationMetadata;

    fn obs(price: f64, confidence: f64, source: PriceSource, hours_ago: i64) -> PriceObservation {
        PriceObservation {
            commodity_id: "wheat".to_string(),
            commodity_name: "Wheat".to_string(),
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

    #[test]
    fn test_mean_and_median_reference_scenario() {
        let prices = [2000.0, 2100.0, 1900.0, 2050.0, 1950.0];
        assert!((mean(&prices) - 2000.0).abs() < f64::EPSILON);
        assert!((median(&prices) - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_median_even_length() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_population_std_deviation() {
        let prices = [2000.0, 2100.0, 1900.0, 2050.0, 1950.0];
        // variance = (0 + 10000 + 10000 + 2500 + 2500) / 5 = 5000
        assert!((std_deviation(&prices) - 5000f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_fair_range_reference_scenario() {
        let prices = [2000.0, 2100.0, 1900.0, 2050.0, 1950.0];
        let observations: Vec<_> = prices
            .iter()
            .map(|p| obs(*p, 0.9, PriceSource::GovernmentFeed, 1))
            .collect();

        let avg = mean(&prices);
        let sd = std_deviation(&prices);
        let range = fair_price_range(&prices, avg, sd, &observations);

        assert!(range.lower >= 1900.0);
        assert!(range.upper <= 2100.0);
        assert!(range.lower <= avg && avg <= range.upper);
    }

    #[test]
    fn test_fair_range_contains_average_on_skewed_sample() {
        // Heavily skewed: tightest-bounds rule alone would exclude the mean.
        let prices = [1.0, 100.0, 100.0, 100.0, 100.0];
        let avg = mean(&prices);
        let sd = std_deviation(&prices);
        let range = fair_price_range(&prices, avg, sd, &[]);

        assert!(range.lower <= avg && avg <= range.upper);
    }

    #[test]
    fn test_range_confidence_bounds() {
        assert!(range_confidence(&[]) >= 0.1);
        assert!(range_confidence(&[]) <= 0.99);

        let one = vec![obs(2000.0, 1.0, PriceSource::GovernmentFeed, 0)];
        let c = range_confidence(&one);
        assert!((0.1..=0.99).contains(&c));

        let many: Vec<_> = (0..60)
            .map(|i| obs(2000.0 + i as f64, 0.95, PriceSource::GovernmentFeed, 0))
            .collect();
        let c = range_confidence(&many);
        assert!((0.1..=0.99).contains(&c));
    }

    #[test]
    fn test_range_confidence_sample_size_bonus() {
        let small: Vec<_> = (0..5)
            .map(|_| obs(2000.0, 0.9, PriceSource::GovernmentFeed, 0))
            .collect();
        let large: Vec<_> = (0..25)
            .map(|_| obs(2000.0, 0.9, PriceSource::GovernmentFeed, 0))
            .collect();

        // 0.5 + (0.9-0.5)*0.4 + 0.05 = 0.71 for the small set
        assert!((range_confidence(&small) - 0.71).abs() < 1e-9);
        // +0.2 sample bonus for n >= 20
        assert!((range_confidence(&large) - 0.91).abs() < 1e-9);
    }

    #[test]
    fn test_t_critical_fallback() {
        assert!((t_critical(4) - 2.776).abs() < f64::EPSILON);
        // df=11 is not tabulated; nearest at or below is 10
        assert!((t_critical(11) - 2.228).abs() < f64::EPSILON);
        // df=0 has no tabulated entry at or below it
        assert!((t_critical(0) - 2.045).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_interval_small_sample_uses_t() {
        let prices = [2000.0, 2100.0, 1900.0, 2050.0, 1950.0];
        let avg = mean(&prices);
        let sd = std_deviation(&prices);
        let ci = confidence_interval(&prices, avg, sd, 0.95);

        let se = sd / 5f64.sqrt();
        let expected_margin = 2.776 * se;
        assert!((ci.lower - (avg - expected_margin)).abs() < 1e-9);
        assert!((ci.upper - (avg + expected_margin)).abs() < 1e-9);
        assert!((ci.level - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_interval_large_sample_uses_z() {
        let prices: Vec<f64> = (0..40).map(|i| 2000.0 + i as f64).collect();
        let avg = mean(&prices);
        let sd = std_deviation(&prices);
        let ci = confidence_interval(&prices, avg, sd, 0.95);

        let se = sd / (prices.len() as f64).sqrt();
        assert!((ci.upper - avg - 1.96 * se).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average_and_fallback() {
        let series = [10.0, 20.0, 30.0, 40.0];
        assert!((moving_average(&series, 2) - 35.0).abs() < f64::EPSILON);
        // Shorter than the window: last available price
        assert!((moving_average(&series, 10) - 40.0).abs() < f64::EPSILON);
        assert!((moving_average(&[], 5) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(trend_classification(&[100.0, 110.0]), Trend::Rising);
        assert_eq!(trend_classification(&[100.0, 90.0]), Trend::Falling);
        assert_eq!(trend_classification(&[100.0, 101.0]), Trend::Stable);
        // Flat endpoints, wild middle: volatile
        assert_eq!(
            trend_classification(&[100.0, 150.0, 50.0, 100.0]),
            Trend::Volatile
        );
        assert_eq!(trend_classification(&[100.0]), Trend::Stable);
    }

    #[test]
    fn test_trend_strength() {
        // 2 up-moves, 1 down-move: |1| / 3 * 100 = 33
        assert_eq!(trend_strength(&[1.0, 2.0, 3.0, 2.0]), 33);
        assert_eq!(trend_strength(&[5.0, 5.0, 5.0]), 0);
        assert_eq!(trend_strength(&[1.0, 2.0, 3.0]), 100);
    }

    #[test]
    fn test_support_resistance_densest_bucket() {
        // Cluster at the bottom of the range
        let points = [10.0, 11.0, 12.0, 13.0, 14.0, 100.0];
        let levels = support_resistance(&points);
        assert!(levels.support >= 10.0);
        assert!(levels.resistance <= 100.0);
        assert!(levels.support < levels.resistance);
        // The cluster sits in the first bucket: [10, 19)
        assert!((levels.support - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_support_resistance_degenerate() {
        let levels = support_resistance(&[50.0, 50.0]);
        assert!((levels.support - 50.0).abs() < f64::EPSILON);
        assert!((levels.resistance - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weighted_average_prefers_fresh_reliable_sources() {
        let observations = vec![
            obs(2000.0, 0.9, PriceSource::GovernmentFeed, 1),
            obs(3000.0, 0.3, PriceSource::Manual, 47),
        ];
        let avg = weighted_average(&observations);
        // The stale, low-confidence manual report barely moves the needle.
        assert!(avg < 2200.0);
        assert!(avg > 2000.0);
    }
}
