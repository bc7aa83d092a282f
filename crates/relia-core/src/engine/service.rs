use super::retry::RetryPolicy;
use crate::cache::selector::MAX_FRESHNESS_DAYS;
use crate::cache::{Aggregator, CandidateSelector, ResultCache};
use crate::clock::Clock;
use crate::config::ReliaConfig;
use crate::errors::{EngineError, StoreError};
use crate::fingerprint::request_key;
use crate::history::{self, HistoryPage};
use crate::mileage::MileageReconciler;
use crate::model::{
    AnalyzeRequest, AnalyzeResponse, EvaluationRecord, QuotaInfo, ResultSource, ANONYMOUS_CALLER,
};
use crate::normalize::Normalizer;
use crate::on_error::log_fail_safe;
use crate::providers::llm::AnalysisClient;
use crate::providers::payload;
use crate::quota::{QuotaLimits, QuotaTracker};
use crate::similarity::SimilarityMatcher;
use crate::storage::{append_within, read_all_within, RecordStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cache-first lookup with quota enforcement and a model fallback.
pub struct ReliabilityService {
    store: Arc<dyn RecordStore>,
    client: Arc<dyn AnalysisClient>,
    clock: Arc<dyn Clock>,
    quota: QuotaTracker,
    cache: ResultCache,
    mileage: MileageReconciler,
    retry: RetryPolicy,
    normalizer: Normalizer,
    store_timeout: Duration,
}

impl ReliabilityService {
    pub fn new(
        cfg: &ReliaConfig,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn AnalysisClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let normalizer = Normalizer::new(cfg.cache.normalize);
        let matcher = SimilarityMatcher::new(normalizer);
        let mileage = MileageReconciler::new(matcher, cfg.cache.mileage_threshold);
        let selector = CandidateSelector::new(
            matcher,
            mileage,
            vec![cfg.cache.strict_threshold, cfg.cache.loose_threshold],
            chrono::Duration::days(cfg.cache.freshness_days.clamp(1, MAX_FRESHNESS_DAYS)),
        );
        let quota = QuotaTracker::new(
            store.clone(),
            clock.clone(),
            QuotaLimits {
                global_daily: cfg.quota.global_daily,
                per_caller_daily: cfg.quota.per_caller_daily,
            },
            cfg.store.timeout(),
            cfg.quota.on_store_error,
        );

        Self {
            store,
            client,
            clock,
            quota,
            cache: ResultCache::new(selector, Aggregator::new(cfg.cache.aggregate_min_hits)),
            mileage,
            retry: RetryPolicy::from_settings(&cfg.analysis),
            normalizer,
            store_timeout: cfg.store.timeout(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn caller<'a>(&self, caller_id: &'a str) -> &'a str {
        let c = caller_id.trim();
        if c.is_empty() {
            ANONYMOUS_CALLER
        } else {
            c
        }
    }

    pub async fn analyze(
        &self,
        caller_id: &str,
        req: &AnalyzeRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalyzeResponse, EngineError> {
        req.validate().map_err(EngineError::InvalidRequest)?;
        let caller = self.caller(caller_id);

        let quota = self.quota.check(caller).await?;
        if let Some(denied) = quota.denial() {
            tracing::warn!(event = "quota_denied", caller = %caller, error = %denied);
            return Err(denied);
        }

        let mut warnings = Vec::new();
        if quota.stale {
            warnings.push("quota counts could not be refreshed; using last known values".to_string());
        }

        let now = self.clock.now();
        let key = request_key(&self.normalizer, req);
        tracing::debug!(event = "cache_lookup", caller = %caller, request_key = %key);

        let records = match read_all_within(self.store.as_ref(), self.store_timeout).await {
            Ok(r) => r,
            Err(e) => {
                log_fail_safe(&format!("cache read failed: {}", e), "cache");
                warnings.push(format!("cache unavailable: {}", e));
                Vec::new()
            }
        };

        let outcome = self.cache.lookup(&records, req, now);
        drop(records);

        if let Some(hit) = outcome.hit {
            let mismatch = self
                .mileage
                .is_mismatch(&req.mileage_bucket, &hit.record.mileage_bucket);
            let (result, delta, note) = self.mileage.adjust(hit.record, &req.mileage_bucket).into_parts();
            return Ok(AnalyzeResponse {
                source: ResultSource::Cache,
                used_fallback: outcome.used_fallback,
                mileage_mismatch: mismatch,
                mileage_note: note,
                score_adjustment: delta,
                is_aggregate: hit.is_aggregate,
                count: hit.count,
                result,
                quota: quota.remaining(0),
                request_key: key,
                warnings,
            });
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let client = self.client.clone();
        let (payload, backend) = self
            .retry
            .execute(cancel, |backend| {
                let client = client.clone();
                async move {
                    let raw = client.evaluate(&backend, req).await?;
                    payload::decode_payload(&raw.text)
                }
            })
            .await?;

        let record = payload::into_record(&payload, req, caller, now);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let consumed = match append_within(self.store.as_ref(), &record, self.store_timeout).await {
            Ok(()) => {
                tracing::info!(
                    event = "record_appended",
                    caller = %caller,
                    backend = %backend,
                    score = ?record.score
                );
                1
            }
            // The write may still commit after the wait expires; count it so
            // the reported quota never overstates what is left.
            Err(e @ StoreError::Timeout(_)) => {
                tracing::warn!(event = "append_outcome_unknown", caller = %caller, error = %e);
                warnings.push(format!("save outcome unknown: {}", e));
                1
            }
            Err(e) => {
                tracing::warn!(event = "append_failed", caller = %caller, error = %e);
                warnings.push(format!("result not saved: {}", e));
                0
            }
        };

        let (result, delta, note) = self.mileage.adjust(record, &req.mileage_bucket).into_parts();
        Ok(AnalyzeResponse {
            source: ResultSource::Model,
            used_fallback: false,
            mileage_mismatch: false,
            mileage_note: note,
            score_adjustment: delta,
            is_aggregate: false,
            count: 1,
            result,
            quota: quota.remaining(consumed),
            request_key: key,
            warnings,
        })
    }

    pub async fn remaining_quota(&self, caller_id: &str) -> Result<QuotaInfo, EngineError> {
        let status = self.quota.check(self.caller(caller_id)).await?;
        Ok(status.remaining(0))
    }

    async fn read_for_history(&self) -> Result<Vec<EvaluationRecord>, EngineError> {
        read_all_within(self.store.as_ref(), self.store_timeout)
            .await
            .map_err(EngineError::StoreUnavailable)
    }

    pub async fn history(
        &self,
        caller_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, EngineError> {
        if history::is_anonymous(caller_id) {
            return Ok(HistoryPage::default());
        }
        let records = self.read_for_history().await?;
        Ok(history::list_for_caller(&records, caller_id.trim(), limit, offset))
    }

    pub async fn export_history_csv(&self, caller_id: &str) -> Result<String, EngineError> {
        if history::is_anonymous(caller_id) {
            return Err(EngineError::InvalidRequest(
                "history export requires an identified caller".into(),
            ));
        }
        let records = self.read_for_history().await?;
        Ok(history::export_csv(&records, caller_id.trim()))
    }
}
