//! Cache-first lookup over stored evaluations.

pub mod aggregate;
pub mod selector;

pub use aggregate::{Aggregator, CacheHit};
pub use selector::{CandidateSelector, Selection};

use crate::model::{AnalyzeRequest, EvaluationRecord};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub hit: Option<CacheHit>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    selector: CandidateSelector,
    aggregator: Aggregator,
}

impl ResultCache {
    pub fn new(selector: CandidateSelector, aggregator: Aggregator) -> Self {
        Self {
            selector,
            aggregator,
        }
    }

    pub fn lookup(
        &self,
        records: &[EvaluationRecord],
        req: &AnalyzeRequest,
        now: DateTime<Utc>,
    ) -> CacheOutcome {
        let selection = self.selector.select(records, req, now);
        let used_fallback = selection.used_fallback;
        let threshold = selection.threshold;
        let hit = self.aggregator.combine(selection.ranked);

        match &hit {
            Some(h) => tracing::info!(
                event = "cache_hit",
                make = %req.make,
                model = %req.model,
                year = req.year,
                count = h.count,
                aggregate = h.is_aggregate,
                used_fallback = used_fallback,
                threshold = ?threshold
            ),
            None => tracing::info!(
                event = "cache_miss",
                make = %req.make,
                model = %req.model,
                year = req.year,
                scanned = records.len()
            ),
        }

        CacheOutcome { hit, used_fallback }
    }
}
