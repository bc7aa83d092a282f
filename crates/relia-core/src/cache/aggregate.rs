use crate::model::{EvaluationRecord, SearchPerformed};

pub const DEFAULT_MIN_HITS: usize = 3;

/// A cache result, possibly synthesized from several records.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub record: EvaluationRecord,
    pub is_aggregate: bool,
    /// Number of fresh records behind this result.
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    min_hits: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_HITS)
    }
}

fn rounded_mean(values: impl Iterator<Item = i64>) -> Option<i64> {
    let (sum, n) = values.fold((0i64, 0i64), |(s, n), v| (s.saturating_add(v), n + 1));
    (n > 0).then(|| (sum as f64 / n as f64).round() as i64)
}

impl Aggregator {
    pub fn new(min_hits: usize) -> Self {
        Self {
            min_hits: min_hits.max(1),
        }
    }

    /// `ranked` must be best-first. With at least `min_hits` records the
    /// numbers are averaged over the records that have them and everything
    /// else comes from the most recent record; otherwise the best record is
    /// returned as is.
    pub fn combine(&self, ranked: Vec<EvaluationRecord>) -> Option<CacheHit> {
        let count = ranked.len();
        let best = ranked.first()?;
        if count < self.min_hits {
            return Some(CacheHit {
                record: best.clone(),
                is_aggregate: false,
                count,
            });
        }

        let newest = ranked
            .iter()
            .max_by_key(|r| r.created_at)
            .unwrap_or(best);

        let mut record = newest.clone();
        record.score = rounded_mean(ranked.iter().filter_map(|r| r.score)).map(|s| s.clamp(0, 100));
        record.avg_repair_cost = rounded_mean(ranked.iter().filter_map(|r| r.avg_repair_cost));
        record.mileage_bucket = best.mileage_bucket.clone();
        record.search_performed = SearchPerformed::HistoricalAggregate;

        tracing::debug!(event = "cache_aggregated", count = count, score = ?record.score);
        Some(CacheHit {
            record,
            is_aggregate: true,
            count,
        })
    }
}
