//! Validation, one-shot repair and mapping of analysis payloads.

use crate::decode::{extract_json, lenient_i64, lenient_string, repair_json, string_list};
use crate::errors::AnalysisError;
use crate::model::{
    AnalyzeRequest, CompetitorBrief, EvaluationRecord, IssueWithCost, ScoreBreakdown,
    SearchPerformed,
};
use chrono::{DateTime, Utc};
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::sync::OnceLock;

fn schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let raw = json!({
            "type": "object",
            "anyOf": [
                {"required": ["base_score_calculated"]},
                {"required": ["reliability_summary"]}
            ],
            "properties": {
                "base_score_calculated": {"type": ["number", "string", "null"]},
                "avg_repair_cost_ILS": {"type": ["number", "string", "null"]},
                "score_breakdown": {"type": ["object", "null"]},
                "common_issues": {"type": ["array", "string", "null"]},
                "issues_with_costs": {"type": ["array", "object", "null"]},
                "reliability_summary": {"type": ["string", "null"]},
                "sources": {"type": ["array", "string", "null"]},
                "recommended_checks": {"type": ["array", "string", "null"]},
                "common_competitors_brief": {"type": ["array", "null"]},
                "search_performed": {"type": ["boolean", "string", "null"]}
            }
        });
        JSONSchema::compile(&raw).expect("static payload schema")
    })
}

fn violations(v: &Value) -> Option<String> {
    match schema().validate(v) {
        Ok(()) => None,
        Err(errors) => {
            let msgs: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            Some(msgs.join("; "))
        }
    }
}

/// Parses a service answer into a validated payload.
///
/// Text that does not parse, or parses to something outside the payload
/// schema, gets exactly one repair pass.
pub fn decode_payload(text: &str) -> Result<Value, AnalysisError> {
    let first_problem = match extract_json(text) {
        Some(v) => match violations(&v) {
            None => return Ok(v),
            Some(why) => why,
        },
        None => "no JSON object found".to_string(),
    };

    tracing::debug!(event = "payload_repair", reason = %first_problem);
    let repaired = repair_json(text);
    let v: Value = serde_json::from_str(&repaired).map_err(|e| {
        AnalysisError::MalformedPayload(format!("{} (repair failed: {})", first_problem, e))
    })?;
    match violations(&v) {
        None => Ok(v),
        Some(why) => Err(AnalysisError::MalformedPayload(why)),
    }
}

/// Builds the record to persist for `req` from a validated payload.
pub fn into_record(
    payload: &Value,
    req: &AnalyzeRequest,
    caller_id: &str,
    now: DateTime<Utc>,
) -> EvaluationRecord {
    let field = |k: &str| payload.get(k).unwrap_or(&Value::Null);

    EvaluationRecord {
        make: req.make.trim().to_string(),
        model: req.model.trim().to_string(),
        sub_model: req.sub_model().unwrap_or_default().to_string(),
        year: req.year,
        fuel: req.fuel.trim().to_string(),
        transmission: req.transmission.trim().to_string(),
        mileage_bucket: req.mileage_bucket.trim().to_string(),
        score: lenient_i64(field("base_score_calculated")).map(|s| s.clamp(0, 100)),
        score_breakdown: ScoreBreakdown::from_value(field("score_breakdown")),
        avg_repair_cost: lenient_i64(field("avg_repair_cost_ILS")),
        issues: string_list(field("common_issues")),
        issues_with_cost: IssueWithCost::list_from_value(field("issues_with_costs")),
        summary: lenient_string(field("reliability_summary")),
        sources: string_list(field("sources")),
        recommended_checks: string_list(field("recommended_checks")),
        competitor_briefs: CompetitorBrief::list_from_value(field("common_competitors_brief")),
        created_at: Some(now),
        search_performed: match field("search_performed") {
            Value::Null => SearchPerformed::Yes,
            v => SearchPerformed::from_value(v),
        },
        caller_id: caller_id.to_string(),
    }
}
