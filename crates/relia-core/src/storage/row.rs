//! Cell-level encoding between `EvaluationRecord` and the text columns of
//! the evaluations table.

use super::schema::{COLUMNS, LEGACY_SCORE_COLUMN};
use crate::decode::{delimited_list, json_cell, lenient_i64_str, string_list};
use crate::model::{CompetitorBrief, EvaluationRecord, IssueWithCost, ScoreBreakdown, SearchPerformed};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// One stored row as text cells. Missing columns read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Cells in persisted column order, backfilling absent ones.
    pub fn ordered(&self) -> Vec<&str> {
        COLUMNS.iter().map(|c| self.get(c)).collect()
    }
}

pub fn encode(record: &EvaluationRecord) -> RawRow {
    let json = |v: Value| v.to_string();
    let opt_num = |n: Option<i64>| n.map(|n| n.to_string()).unwrap_or_default();

    RawRow::new()
        .with(
            "date",
            record
                .created_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        )
        .with("user_id", record.caller_id.as_str())
        .with("make", record.make.as_str())
        .with("model", record.model.as_str())
        .with("sub_model", record.sub_model.as_str())
        .with("year", record.year.to_string())
        .with("fuel", record.fuel.as_str())
        .with("transmission", record.transmission.as_str())
        .with("mileage_range", record.mileage_bucket.as_str())
        .with("base_score_calculated", opt_num(record.score))
        .with("score_breakdown", json(serde_json::json!(record.score_breakdown)))
        .with("avg_cost", opt_num(record.avg_repair_cost))
        .with("issues", record.issues.join("; "))
        .with("search_performed", record.search_performed.as_cell())
        .with("reliability_summary", record.summary.as_str())
        .with("issues_with_costs", json(serde_json::json!(record.issues_with_cost)))
        .with("sources", json(serde_json::json!(record.sources)))
        .with("recommended_checks", json(serde_json::json!(record.recommended_checks)))
        .with(
            "common_competitors_brief",
            json(serde_json::json!(record.competitor_briefs)),
        )
}

/// Total: every cell decodes to something, bad cells to their empty value.
pub fn decode(row: &RawRow) -> EvaluationRecord {
    let score = lenient_i64_str(row.get("base_score_calculated"))
        .or_else(|| lenient_i64_str(row.get(LEGACY_SCORE_COLUMN)))
        .map(|s| s.clamp(0, 100));

    EvaluationRecord {
        make: row.get("make").trim().to_string(),
        model: row.get("model").trim().to_string(),
        sub_model: row.get("sub_model").trim().to_string(),
        year: lenient_i64_str(row.get("year"))
            .and_then(|y| i32::try_from(y).ok())
            .unwrap_or(0),
        fuel: row.get("fuel").trim().to_string(),
        transmission: row.get("transmission").trim().to_string(),
        mileage_bucket: row.get("mileage_range").trim().to_string(),
        score,
        score_breakdown: json_cell(row.get("score_breakdown"))
            .map(|v| ScoreBreakdown::from_value(&v))
            .unwrap_or_default(),
        avg_repair_cost: lenient_i64_str(row.get("avg_cost")),
        issues: list_cell(row.get("issues")),
        issues_with_cost: json_cell(row.get("issues_with_costs"))
            .map(|v| IssueWithCost::list_from_value(&v))
            .unwrap_or_default(),
        summary: row.get("reliability_summary").trim().to_string(),
        sources: list_cell(row.get("sources")),
        recommended_checks: list_cell(row.get("recommended_checks")),
        competitor_briefs: json_cell(row.get("common_competitors_brief"))
            .map(|v| CompetitorBrief::list_from_value(&v))
            .unwrap_or_default(),
        created_at: parse_created_at(row.get("date")),
        search_performed: SearchPerformed::from_cell(row.get("search_performed")),
        caller_id: row.get("user_id").trim().to_string(),
    }
}

/// JSON array cell, or delimited text in older rows.
fn list_cell(cell: &str) -> Vec<String> {
    if cell.trim_start().starts_with('[') {
        if let Some(v @ Value::Array(_)) = json_cell(cell) {
            return string_list(&v);
        }
    }
    delimited_list(cell)
}

/// RFC 3339, naive local timestamps, or a bare date read as local midnight.
pub fn parse_created_at(cell: &str) -> Option<DateTime<Utc>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(cell) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cell, fmt) {
            return local_to_utc(naive);
        }
    }
    let date = NaiveDate::parse_from_str(cell, "%Y-%m-%d").ok()?;
    local_to_utc(date.and_hms_opt(0, 0, 0)?)
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn sample() -> EvaluationRecord {
        EvaluationRecord {
            make: "Toyota".into(),
            model: "Corolla".into(),
            year: 2020,
            mileage_bucket: "100,000-150,000".into(),
            score: Some(78),
            issues: vec!["rattle".into(), "water pump".into()],
            sources: vec!["https://example.org/a".into()],
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single(),
            search_performed: SearchPerformed::Yes,
            caller_id: "u1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn encoded_row_follows_column_order() {
        let row = encode(&sample());
        let cells = row.ordered();
        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[0], "2026-03-01T10:00:00Z");
        assert_eq!(cells[1], "u1");
        assert_eq!(cells[9], "78");
        assert_eq!(cells[12], "rattle; water pump");
        assert_eq!(cells[13], "true");
    }

    #[test]
    fn decode_recovers_encoded_record() {
        let rec = sample();
        assert_eq!(decode(&encode(&rec)), rec);
    }

    #[test]
    fn legacy_row_backfills_missing_columns() {
        let row = RawRow::new()
            .with("date", "2026-03-01")
            .with("make", "Mazda")
            .with("model", "3")
            .with("year", "2019.0")
            .with("base_score", "81")
            .with("issues", "rust, clutch")
            .with("sources", "forum");

        let rec = decode(&row);
        assert_eq!(rec.year, 2019);
        assert_eq!(rec.score, Some(81));
        assert_eq!(rec.issues, vec!["rust", "clutch"]);
        assert_eq!(rec.sources, vec!["forum"]);
        assert!(rec.sub_model.is_empty());
        assert!(rec.score_breakdown.is_empty());
        assert_eq!(rec.search_performed, SearchPerformed::No);

        let local = rec.created_at.unwrap().with_timezone(&Local);
        assert_eq!((local.year(), local.month(), local.day()), (2026, 3, 1));
    }

    #[test]
    fn garbage_cells_decode_to_empty_values() {
        let row = RawRow::new()
            .with("year", "n/a")
            .with("base_score_calculated", "")
            .with("score_breakdown", "{not json")
            .with("date", "yesterday");
        let rec = decode(&row);
        assert_eq!(rec.year, 0);
        assert_eq!(rec.score, None);
        assert_eq!(rec.created_at, None);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let rec = decode(&RawRow::new().with("base_score_calculated", "140"));
        assert_eq!(rec.score, Some(100));
    }
}
