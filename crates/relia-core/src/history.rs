//! Per-caller history views over stored evaluations.

use crate::model::{EvaluationRecord, ANONYMOUS_CALLER};
use crate::storage::{row, schema::COLUMNS};
use chrono::Local;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Local calendar date, `YYYY-MM-DD`; empty when unknown.
    pub date: String,
    pub make: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_model: Option<String>,
    pub year: i32,
    pub fuel: String,
    pub transmission: String,
    pub mileage_range: String,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub total: usize,
}

pub fn is_anonymous(caller_id: &str) -> bool {
    let c = caller_id.trim();
    c.is_empty() || c == ANONYMOUS_CALLER
}

/// The caller's records, newest first. Undated records sort last.
pub fn records_for_caller<'a>(
    records: &'a [EvaluationRecord],
    caller_id: &str,
) -> Vec<&'a EvaluationRecord> {
    if is_anonymous(caller_id) {
        return Vec::new();
    }
    let mut mine: Vec<&EvaluationRecord> = records
        .iter()
        .filter(|r| r.caller_id == caller_id)
        .collect();
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    mine
}

pub fn list_for_caller(
    records: &[EvaluationRecord],
    caller_id: &str,
    limit: usize,
    offset: usize,
) -> HistoryPage {
    let mine = records_for_caller(records, caller_id);
    let total = mine.len();
    let items = mine
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|r| HistoryItem {
            date: r
                .created_at
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            make: r.make.clone(),
            model: r.model.clone(),
            sub_model: (!r.sub_model.is_empty()).then(|| r.sub_model.clone()),
            year: r.year,
            fuel: r.fuel.clone(),
            transmission: r.transmission.clone(),
            mileage_range: r.mileage_bucket.clone(),
            score: r.score,
        })
        .collect();
    HistoryPage { items, total }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// CSV of the caller's rows in persisted column order, header included.
pub fn export_csv(records: &[EvaluationRecord], caller_id: &str) -> String {
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for r in records_for_caller(records, caller_id) {
        let raw = row::encode(r);
        let line: Vec<String> = raw.ordered().into_iter().map(csv_field).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}
