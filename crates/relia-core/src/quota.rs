//! Daily request ceilings derived from the store itself.
//!
//! There is no counter: usage is today's record count, so it survives
//! restarts and is shared by every process using the same store. Check and
//! append are not atomic; two concurrent requests may both pass at `limit - 1`.

use crate::clock::Clock;
use crate::errors::{EngineError, StoreError};
use crate::model::{EvaluationRecord, QuotaInfo};
use crate::on_error::{log_fail_safe, FailurePolicy};
use crate::storage::{read_all_within, RecordStore};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_GLOBAL_DAILY: u32 = 1000;
pub const DEFAULT_PER_CALLER_DAILY: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    Global,
    Caller,
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::Global => f.write_str("global"),
            QuotaScope::Caller => f.write_str("per-caller"),
        }
    }
}

/// `per_caller_daily == 0` disables the per-caller ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub global_daily: u32,
    pub per_caller_daily: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            global_daily: DEFAULT_GLOBAL_DAILY,
            per_caller_daily: DEFAULT_PER_CALLER_DAILY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub global_used: u32,
    pub user_used: u32,
    pub limits: QuotaLimits,
    /// Counts came from an earlier same-day read, or were assumed after a
    /// fail-open.
    pub stale: bool,
}

impl QuotaStatus {
    fn new(limits: QuotaLimits, global_used: u32, user_used: u32, stale: bool) -> Self {
        let global_ok = global_used < limits.global_daily;
        let user_ok = limits.per_caller_daily == 0 || user_used < limits.per_caller_daily;
        Self {
            allowed: global_ok && user_ok,
            global_used,
            user_used,
            limits,
            stale,
        }
    }

    /// The ceiling that denies this request, global first.
    pub fn denial(&self) -> Option<EngineError> {
        if self.global_used >= self.limits.global_daily {
            return Some(EngineError::QuotaExceeded {
                scope: QuotaScope::Global,
                used: self.global_used,
                limit: self.limits.global_daily,
            });
        }
        if self.limits.per_caller_daily > 0 && self.user_used >= self.limits.per_caller_daily {
            return Some(EngineError::QuotaExceeded {
                scope: QuotaScope::Caller,
                used: self.user_used,
                limit: self.limits.per_caller_daily,
            });
        }
        None
    }

    /// Remaining after `consumed` further requests from this caller.
    pub fn remaining(&self, consumed: u32) -> QuotaInfo {
        let global_left = self
            .limits
            .global_daily
            .saturating_sub(self.global_used.saturating_add(consumed));
        let user_left = (self.limits.per_caller_daily > 0).then(|| {
            self.limits
                .per_caller_daily
                .saturating_sub(self.user_used.saturating_add(consumed))
        });
        QuotaInfo {
            user_left,
            global_left,
        }
    }
}

/// Today's usage: all records, and those of each caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyUsage {
    pub day: Option<NaiveDate>,
    pub total: u32,
    pub per_caller: HashMap<String, u32>,
}

impl DailyUsage {
    pub fn for_caller(&self, caller_id: &str) -> u32 {
        self.per_caller.get(caller_id).copied().unwrap_or(0)
    }
}

/// Counts records whose creation falls on `day` in system local time.
/// Records without a parseable timestamp are not counted.
pub fn tally(records: &[EvaluationRecord], day: NaiveDate) -> DailyUsage {
    let mut usage = DailyUsage {
        day: Some(day),
        ..Default::default()
    };
    for r in records {
        let Some(created) = r.created_at else {
            continue;
        };
        if created.with_timezone(&Local).date_naive() != day {
            continue;
        }
        usage.total += 1;
        *usage.per_caller.entry(r.caller_id.clone()).or_insert(0) += 1;
    }
    usage
}

pub struct QuotaTracker {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    limits: QuotaLimits,
    timeout: Duration,
    on_store_error: FailurePolicy,
    last_usage: Mutex<Option<DailyUsage>>,
}

impl QuotaTracker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        limits: QuotaLimits,
        timeout: Duration,
        on_store_error: FailurePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
            timeout,
            on_store_error,
            last_usage: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Reads today's usage. On a store failure falls back to the last
    /// same-day read, then to `on_store_error`.
    pub async fn check(&self, caller_id: &str) -> Result<QuotaStatus, EngineError> {
        let today = self.clock.today();
        match read_all_within(self.store.as_ref(), self.timeout).await {
            Ok(records) => {
                let usage = tally(&records, today);
                let status = QuotaStatus::new(
                    self.limits,
                    usage.total,
                    usage.for_caller(caller_id),
                    false,
                );
                if let Ok(mut last) = self.last_usage.lock() {
                    *last = Some(usage);
                }
                tracing::debug!(
                    event = "quota_check",
                    caller = %caller_id,
                    global_used = status.global_used,
                    user_used = status.user_used,
                    allowed = status.allowed
                );
                Ok(status)
            }
            Err(e) => self.degraded(caller_id, today, e),
        }
    }

    fn degraded(
        &self,
        caller_id: &str,
        today: NaiveDate,
        error: StoreError,
    ) -> Result<QuotaStatus, EngineError> {
        let snapshot = self
            .last_usage
            .lock()
            .ok()
            .and_then(|last| last.clone())
            .filter(|u| u.day == Some(today));

        if let Some(usage) = snapshot {
            tracing::warn!(
                event = "quota_check",
                error = %error,
                "store unavailable, using same-day quota snapshot"
            );
            return Ok(QuotaStatus::new(
                self.limits,
                usage.total,
                usage.for_caller(caller_id),
                true,
            ));
        }

        if self.on_store_error.allows_on_error() {
            log_fail_safe(&format!("quota read failed: {}", error), "quota");
            return Ok(QuotaStatus::new(self.limits, 0, 0, true));
        }

        tracing::warn!(event = "quota_check", error = %error, "store unavailable, denying");
        Err(EngineError::StoreUnavailable(error))
    }
}
