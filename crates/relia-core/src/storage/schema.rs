pub const TABLE: &str = "evaluations";

/// Persisted column order. Existing deployments depend on it; only append.
pub const COLUMNS: [&str; 19] = [
    "date",
    "user_id",
    "make",
    "model",
    "sub_model",
    "year",
    "fuel",
    "transmission",
    "mileage_range",
    "base_score_calculated",
    "score_breakdown",
    "avg_cost",
    "issues",
    "search_performed",
    "reliability_summary",
    "issues_with_costs",
    "sources",
    "recommended_checks",
    "common_competitors_brief",
];

/// Older layouts stored the score here.
pub const LEGACY_SCORE_COLUMN: &str = "base_score";

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS evaluations (
  id                        INTEGER PRIMARY KEY AUTOINCREMENT,
  date                      TEXT,
  user_id                   TEXT,
  make                      TEXT,
  model                     TEXT,
  sub_model                 TEXT,
  year                      TEXT,
  fuel                      TEXT,
  transmission              TEXT,
  mileage_range             TEXT,
  base_score_calculated     TEXT,
  score_breakdown           TEXT,
  avg_cost                  TEXT,
  issues                    TEXT,
  search_performed          TEXT,
  reliability_summary       TEXT,
  issues_with_costs         TEXT,
  sources                   TEXT,
  recommended_checks        TEXT,
  common_competitors_brief  TEXT
);
"#;
