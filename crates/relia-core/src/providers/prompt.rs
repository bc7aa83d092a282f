use crate::model::AnalyzeRequest;

const PAYLOAD_TEMPLATE: &str = r#"{
  "search_performed": true,
  "score_breakdown": {
    "engine_transmission_score": "number 1-10",
    "electrical_score": "number 1-10",
    "suspension_brakes_score": "number 1-10",
    "maintenance_cost_score": "number 1-10",
    "satisfaction_score": "number 1-10",
    "recalls_score": "number 1-10"
  },
  "base_score_calculated": "number 0-100",
  "common_issues": ["common faults relevant to this mileage"],
  "avg_repair_cost_ILS": "average number",
  "issues_with_costs": [
    {"issue": "fault name", "avg_cost_ILS": "number", "source": "source", "severity": "low/medium/high"}
  ],
  "reliability_summary": "summary",
  "sources": ["list of sites"],
  "recommended_checks": ["specific recommended inspections"],
  "common_competitors_brief": [
    {"model": "competitor 1", "brief_summary": "reliability in brief"},
    {"model": "competitor 2", "brief_summary": "reliability in brief"}
  ]
}"#;

/// Instruction text for one vehicle query.
pub fn build_prompt(req: &AnalyzeRequest) -> String {
    let sub = req
        .sub_model()
        .map(|s| format!(" sub-model/trim: {}", s))
        .unwrap_or_default();

    format!(
        "You are a vehicle reliability expert for the Israeli market with web search access.\n\
         The analysis must refer specifically to the given mileage range.\n\
         Return JSON only, in exactly this shape:\n\n\
         {template}\n\n\
         Vehicle: {make} {model}{sub} {year}\n\
         Mileage range: {mileage}\n\
         Fuel: {fuel}\n\
         Transmission: {transmission}\n\
         Write all text values in Hebrew.",
        template = PAYLOAD_TEMPLATE,
        make = req.make.trim(),
        model = req.model.trim(),
        sub = sub,
        year = req.year,
        mileage = req.mileage_bucket.trim(),
        fuel = req.fuel.trim(),
        transmission = req.transmission.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_the_vehicle() {
        let p = build_prompt(&AnalyzeRequest {
            make: "Skoda".into(),
            model: "Octavia".into(),
            sub_model: Some("RS".into()),
            year: 2017,
            fuel: "gasoline".into(),
            transmission: "automatic".into(),
            mileage_bucket: "150,000-200,000".into(),
        });
        assert!(p.contains("Vehicle: Skoda Octavia sub-model/trim: RS 2017"));
        assert!(p.contains("Mileage range: 150,000-200,000"));
        assert!(p.contains("\"base_score_calculated\""));
    }
}
