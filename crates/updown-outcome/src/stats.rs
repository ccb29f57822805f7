//! Aggregate and bucketed outcome statistics.

use crate::logger::SignalOutcomeLogger;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use updown_core::{Signal, SignalOutcome};

/// Query limits are clamped into this range.
const LIMIT_MIN: usize = 1;
const LIMIT_MAX: usize = 1000;

pub(crate) fn clamp_limit(limit: usize) -> usize {
    limit.clamp(LIMIT_MIN, LIMIT_MAX)
}

/// Aggregate statistics over a set of signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeStats {
    pub total: usize,
    pub with_outcome: usize,
    pub pending: usize,
    pub wins: usize,
    pub total_pnl: Decimal,
    pub avg_confidence: f64,
}

impl OutcomeStats {
    fn from_rows(rows: &[(Signal, Option<SignalOutcome>)]) -> Self {
        let total = rows.len();
        let with_outcome = rows.iter().filter(|(_, o)| o.is_some()).count();
        let wins = rows
            .iter()
            .filter(|(_, o)| o.as_ref().map(|o| o.signal_correct).unwrap_or(false))
            .count();
        let total_pnl = rows
            .iter()
            .filter_map(|(_, o)| o.as_ref().map(|o| o.pnl))
            .sum();
        let avg_confidence = if total == 0 {
            0.0
        } else {
            rows.iter().map(|(s, _)| s.confidence).sum::<f64>() / total as f64
        };
        Self {
            total,
            with_outcome,
            pending: total - with_outcome,
            wins,
            total_pnl,
            avg_confidence,
        }
    }
}

/// Attribution dimension for bucketed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketBy {
    TimeToExpiry,
    Staleness,
    Confidence,
    Symbol,
}

/// One bucket's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRow {
    pub bucket: String,
    pub stats: OutcomeStats,
}

fn time_bucket(ms: i64) -> &'static str {
    match ms {
        i64::MIN..=59_999 => "<1m",
        60_000..=179_999 => "1-3m",
        180_000..=299_999 => "3-5m",
        300_000..=599_999 => "5-10m",
        _ => ">10m",
    }
}

fn staleness_bucket(ms: i64) -> &'static str {
    match ms {
        i64::MIN..=999 => "<1s",
        1_000..=4_999 => "1-5s",
        5_000..=14_999 => "5-15s",
        _ => ">15s",
    }
}

fn confidence_bucket(confidence: f64) -> &'static str {
    if confidence < 0.25 {
        "0.00-0.25"
    } else if confidence < 0.5 {
        "0.25-0.50"
    } else if confidence < 0.75 {
        "0.50-0.75"
    } else {
        "0.75-1.00"
    }
}

impl SignalOutcomeLogger {
    /// Aggregate statistics over the most recent `limit` signals.
    pub fn stats(&self, limit: usize) -> OutcomeStats {
        let mut rows = self.rows();
        rows.truncate(clamp_limit(limit));
        OutcomeStats::from_rows(&rows)
    }

    /// Bucketed statistics over the most recent `limit` signals.
    pub fn bucketed_stats(&self, by: BucketBy, limit: usize) -> Vec<BucketRow> {
        let mut rows = self.rows();
        rows.truncate(clamp_limit(limit));

        let mut buckets: BTreeMap<String, Vec<(Signal, Option<SignalOutcome>)>> = BTreeMap::new();
        for (signal, outcome) in rows {
            let bucket = match by {
                BucketBy::TimeToExpiry => time_bucket(signal.inputs.time_remaining_ms).to_string(),
                BucketBy::Staleness => {
                    staleness_bucket(signal.inputs.oracle_staleness_ms).to_string()
                }
                BucketBy::Confidence => confidence_bucket(signal.confidence).to_string(),
                BucketBy::Symbol => signal.symbol.as_str().to_string(),
            };
            buckets.entry(bucket).or_default().push((signal, outcome));
        }

        buckets
            .into_iter()
            .map(|(bucket, rows)| BucketRow {
                bucket,
                stats: OutcomeStats::from_rows(&rows),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::tests::signal;
    use rust_decimal_macros::dec;
    use updown_core::{Direction, Price};
    use uuid::Uuid;

    #[test]
    fn test_limit_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(500), 500);
        assert_eq!(clamp_limit(10_000), 1000);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(time_bucket(59_999), "<1m");
        assert_eq!(time_bucket(60_000), "1-3m");
        assert_eq!(time_bucket(600_000), ">10m");
        assert_eq!(staleness_bucket(0), "<1s");
        assert_eq!(staleness_bucket(5_000), "5-15s");
        assert_eq!(confidence_bucket(0.75), "0.75-1.00");
        assert_eq!(confidence_bucket(0.10), "0.00-0.25");
    }

    #[tokio::test]
    async fn test_aggregate_stats() {
        let logger = SignalOutcomeLogger::new(None);
        logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.30))))
            .await
            .unwrap();
        logger
            .log_signal(signal("w2", Uuid::new_v4(), Direction::FadeDown, Some(dec!(0.40))))
            .await
            .unwrap();

        // Settle only w1: final below strike, fade_up wins 0.70.
        logger
            .settle_window("w1", Price::new(dec!(0.50)), Price::new(dec!(0.40)), None)
            .await
            .unwrap();

        let stats = logger.stats(100);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.with_outcome, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.total_pnl, dec!(0.70));
        assert!((stats.avg_confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bucketed_by_symbol() {
        let logger = SignalOutcomeLogger::new(None);
        logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap();
        logger
            .log_signal(signal("w2", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap();

        let rows = logger.bucketed_stats(BucketBy::Symbol, 100);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket, "BTC");
        assert_eq!(rows[0].stats.total, 2);
    }

    #[tokio::test]
    async fn test_bucketed_by_confidence() {
        let logger = SignalOutcomeLogger::new(None);
        logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap();

        let rows = logger.bucketed_stats(BucketBy::Confidence, 100);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket, "0.75-1.00");
    }
}
