use crate::decode::{lenient_i64, lenient_string, string_list};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Named sub-scores, each 0–10.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(rename = "engine_transmission_score", default)]
    pub engine_transmission: Option<u8>,
    #[serde(rename = "electrical_score", default)]
    pub electrical: Option<u8>,
    #[serde(rename = "suspension_brakes_score", default)]
    pub suspension_brakes: Option<u8>,
    #[serde(rename = "maintenance_cost_score", default)]
    pub maintenance_cost: Option<u8>,
    #[serde(rename = "satisfaction_score", default)]
    pub satisfaction: Option<u8>,
    #[serde(rename = "recalls_score", default)]
    pub recalls: Option<u8>,
}

impl ScoreBreakdown {
    /// Lenient decode: numeric strings accepted, values clamped to 0–10,
    /// unknown keys ignored, non-objects yield an empty breakdown.
    pub fn from_value(v: &Value) -> Self {
        let sub = |key: &str| -> Option<u8> {
            v.get(key)
                .and_then(lenient_i64)
                .map(|n| n.clamp(0, 10) as u8)
        };
        Self {
            engine_transmission: sub("engine_transmission_score"),
            electrical: sub("electrical_score"),
            suspension_brakes: sub("suspension_brakes_score"),
            maintenance_cost: sub("maintenance_cost_score"),
            satisfaction: sub("satisfaction_score"),
            recalls: sub("recalls_score"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueWithCost {
    pub issue: String,
    #[serde(rename = "avg_cost_ILS", alias = "cost", default)]
    pub cost: Option<i64>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub severity: String,
}

impl IssueWithCost {
    /// Objects without an `issue` name are dropped; a bare string becomes an
    /// issue with no cost.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Object(_) => {
                let issue = v.get("issue").map(lenient_string).unwrap_or_default();
                if issue.is_empty() {
                    return None;
                }
                Some(Self {
                    issue,
                    cost: v
                        .get("avg_cost_ILS")
                        .or_else(|| v.get("cost"))
                        .and_then(lenient_i64),
                    source: v.get("source").map(lenient_string).unwrap_or_default(),
                    severity: v.get("severity").map(lenient_string).unwrap_or_default(),
                })
            }
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                issue: s.trim().to_string(),
                ..Self::default()
            }),
            _ => None,
        }
    }

    pub fn list_from_value(v: &Value) -> Vec<Self> {
        match v {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Object(_) => Self::from_value(v).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorBrief {
    #[serde(rename = "model", alias = "name")]
    pub name: String,
    #[serde(rename = "brief_summary", alias = "summary", default)]
    pub summary: String,
}

impl CompetitorBrief {
    pub fn from_value(v: &Value) -> Option<Self> {
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| v.get(*k))
                .map(lenient_string)
                .unwrap_or_default()
        };
        let name = field(&["model", "name"]);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            summary: field(&["brief_summary", "summary"]),
        })
    }

    pub fn list_from_value(v: &Value) -> Vec<Self> {
        match v {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

/// Whether the analysis searched live sources, or the result is a
/// synthesized historical aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPerformed {
    #[default]
    No,
    Yes,
    HistoricalAggregate,
}

const AGGREGATE_CELL: &str = "true (history aggregate)";

impl SearchPerformed {
    pub fn from_cell(cell: &str) -> Self {
        let c = cell.trim().to_lowercase();
        if c.contains("aggregate") {
            SearchPerformed::HistoricalAggregate
        } else if matches!(c.as_str(), "true" | "1" | "yes") {
            SearchPerformed::Yes
        } else {
            SearchPerformed::No
        }
    }

    pub fn as_cell(&self) -> &'static str {
        match self {
            SearchPerformed::No => "false",
            SearchPerformed::Yes => "true",
            SearchPerformed::HistoricalAggregate => AGGREGATE_CELL,
        }
    }

    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Bool(true) => SearchPerformed::Yes,
            Value::Bool(false) => SearchPerformed::No,
            Value::String(s) => Self::from_cell(s),
            _ => SearchPerformed::No,
        }
    }
}

impl Serialize for SearchPerformed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SearchPerformed::No => serializer.serialize_bool(false),
            SearchPerformed::Yes => serializer.serialize_bool(true),
            SearchPerformed::HistoricalAggregate => serializer.serialize_str("historical_aggregate"),
        }
    }
}

impl<'de> Deserialize<'de> for SearchPerformed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(SearchPerformed::from_value(&v))
    }
}

/// One completed evaluation. Created once when an analysis is produced,
/// never mutated or deleted afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub sub_model: String,
    pub year: i32,

    #[serde(default)]
    pub fuel: String,
    #[serde(default)]
    pub transmission: String,
    #[serde(default)]
    pub mileage_bucket: String,

    pub score: Option<i64>,
    #[serde(default)]
    pub score_breakdown: ScoreBreakdown,
    pub avg_repair_cost: Option<i64>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub issues_with_cost: Vec<IssueWithCost>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub recommended_checks: Vec<String>,
    #[serde(default)]
    pub competitor_briefs: Vec<CompetitorBrief>,

    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub search_performed: SearchPerformed,
    #[serde(default)]
    pub caller_id: String,
}

impl EvaluationRecord {
    /// Fresh iff `created_at` is known and no older than `max_age`.
    /// A window reaching past the earliest representable instant admits any
    /// dated record.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match now.checked_sub_signed(max_age) {
            Some(cutoff) => self.created_at.is_some_and(|t| t >= cutoff),
            None => self.created_at.is_some(),
        }
    }
}

pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Caller-facing lookup request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub sub_model: Option<String>,
    pub year: i32,
    #[serde(default, alias = "fuel_type")]
    pub fuel: String,
    #[serde(default)]
    pub transmission: String,
    #[serde(alias = "mileage_range")]
    pub mileage_bucket: String,
}

impl AnalyzeRequest {
    /// The sub-model, when one was actually supplied.
    pub fn sub_model(&self) -> Option<&str> {
        self.sub_model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.make.trim().is_empty() {
            return Err("make is required".into());
        }
        if self.model.trim().is_empty() {
            return Err("model is required".into());
        }
        if !(1900..=2100).contains(&self.year) {
            return Err(format!("year {} out of range", self.year));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Model,
}

/// Remaining requests today. `user_left` is `None` when there is no
/// per-caller cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub user_left: Option<u32>,
    pub global_left: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub source: ResultSource,
    pub used_fallback: bool,
    pub mileage_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage_note: Option<String>,
    pub score_adjustment: i64,
    pub is_aggregate: bool,
    pub count: usize,
    pub result: EvaluationRecord,
    pub quota: QuotaInfo,
    pub request_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn freshness_with_out_of_range_window() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
        let dated = EvaluationRecord {
            created_at: Some(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let undated = EvaluationRecord::default();
        let huge = chrono::Duration::days(100_000_000);

        assert!(dated.is_fresh(now, huge));
        assert!(!undated.is_fresh(now, huge));
        assert!(!dated.is_fresh(now, chrono::Duration::days(45)));
    }

    #[test]
    fn breakdown_decodes_loose_values() {
        let b = ScoreBreakdown::from_value(&json!({
            "engine_transmission_score": "8",
            "electrical_score": 12,
            "recalls_score": -1,
            "unknown": 3
        }));
        assert_eq!(b.engine_transmission, Some(8));
        assert_eq!(b.electrical, Some(10));
        assert_eq!(b.recalls, Some(0));
        assert_eq!(b.satisfaction, None);
        assert!(ScoreBreakdown::from_value(&json!("garbage")).is_empty());
    }

    #[test]
    fn issues_with_cost_accept_legacy_shapes() {
        let list = IssueWithCost::list_from_value(&json!([
            {"issue": "gearbox", "avg_cost_ILS": "4,500", "source": "forum", "severity": "high"},
            {"avg_cost_ILS": 100},
            "timing belt"
        ]));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].cost, Some(4500));
        assert_eq!(list[1].issue, "timing belt");
        assert_eq!(list[1].cost, None);
    }

    #[test]
    fn competitor_briefs_accept_both_key_styles() {
        let list = CompetitorBrief::list_from_value(&json!([
            {"model": "Mazda 3", "brief_summary": "reliable"},
            {"name": "Civic", "summary": "solid"},
            {"brief_summary": "nameless"}
        ]));
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "Civic");
    }

    #[test]
    fn search_performed_cells_and_json() {
        assert_eq!(SearchPerformed::from_cell("TRUE"), SearchPerformed::Yes);
        assert_eq!(SearchPerformed::from_cell(""), SearchPerformed::No);
        assert_eq!(
            SearchPerformed::from_cell(SearchPerformed::HistoricalAggregate.as_cell()),
            SearchPerformed::HistoricalAggregate
        );
        assert_eq!(
            serde_json::to_value(SearchPerformed::HistoricalAggregate).unwrap(),
            json!("historical_aggregate")
        );
        let back: SearchPerformed = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(back, SearchPerformed::Yes);
    }

    #[test]
    fn request_validation_and_blank_sub_model() {
        let mut req = AnalyzeRequest {
            make: "Toyota".into(),
            model: "Corolla".into(),
            sub_model: Some("  ".into()),
            year: 2020,
            mileage_bucket: "100,000-150,000".into(),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
        assert_eq!(req.sub_model(), None);

        req.year = 1800;
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_accepts_form_field_names() {
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "make": "Kia", "model": "Picanto", "year": 2018,
            "fuel_type": "gasoline", "transmission": "automatic",
            "mileage_range": "50,000-100,000"
        }))
        .unwrap();
        assert_eq!(req.fuel, "gasoline");
        assert_eq!(req.mileage_bucket, "50,000-100,000");
    }
}
