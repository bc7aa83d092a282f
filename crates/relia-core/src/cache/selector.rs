use crate::mileage::MileageReconciler;
use crate::model::{AnalyzeRequest, EvaluationRecord};
use crate::similarity::{SimilarityMatcher, LOOSE_THRESHOLD, STRICT_THRESHOLD};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_FRESHNESS_DAYS: i64 = 45;
/// Upper bound for a configured freshness window, about a century.
pub const MAX_FRESHNESS_DAYS: i64 = 36_500;

/// Surviving candidates, best first.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub ranked: Vec<EvaluationRecord>,
    pub used_fallback: bool,
    /// Threshold of the pass that produced `ranked`.
    pub threshold: Option<f64>,
}

impl Selection {
    pub fn best(&self) -> Option<&EvaluationRecord> {
        self.ranked.first()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    matcher: SimilarityMatcher,
    mileage: MileageReconciler,
    thresholds: Vec<f64>,
    freshness: Duration,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(
            SimilarityMatcher::default(),
            MileageReconciler::default(),
            vec![STRICT_THRESHOLD, LOOSE_THRESHOLD],
            Duration::days(DEFAULT_FRESHNESS_DAYS),
        )
    }
}

impl CandidateSelector {
    /// `thresholds` are tried in order; a later one only when every earlier
    /// pass found nothing.
    pub fn new(
        matcher: SimilarityMatcher,
        mileage: MileageReconciler,
        thresholds: Vec<f64>,
        freshness: Duration,
    ) -> Self {
        Self {
            matcher,
            mileage,
            thresholds,
            freshness,
        }
    }

    pub fn select(
        &self,
        records: &[EvaluationRecord],
        req: &AnalyzeRequest,
        now: DateTime<Utc>,
    ) -> Selection {
        let pool: Vec<&EvaluationRecord> = records
            .iter()
            .filter(|r| r.year == req.year && r.is_fresh(now, self.freshness))
            .collect();

        if let Some((hits, th)) = self.cascade(&pool, req, req.sub_model()) {
            return self.ranked(hits, req, th, false);
        }
        if req.sub_model().is_some() {
            if let Some((hits, th)) = self.cascade(&pool, req, None) {
                return self.ranked(hits, req, th, true);
            }
            return Selection {
                used_fallback: true,
                ..Selection::default()
            };
        }
        Selection::default()
    }

    fn cascade<'a>(
        &self,
        pool: &[&'a EvaluationRecord],
        req: &AnalyzeRequest,
        sub_model: Option<&str>,
    ) -> Option<(Vec<&'a EvaluationRecord>, f64)> {
        self.thresholds.iter().find_map(|&th| {
            let hits: Vec<&EvaluationRecord> = pool
                .iter()
                .copied()
                .filter(|r| {
                    self.matcher.matches(&req.make, &r.make, th)
                        && self.matcher.matches(&req.model, &r.model, th)
                        && sub_model.map_or(true, |s| self.matcher.matches(s, &r.sub_model, th))
                })
                .collect();
            (!hits.is_empty()).then_some((hits, th))
        })
    }

    fn ranked(
        &self,
        hits: Vec<&EvaluationRecord>,
        req: &AnalyzeRequest,
        threshold: f64,
        used_fallback: bool,
    ) -> Selection {
        let mut scored: Vec<(f64, &EvaluationRecord)> = hits
            .into_iter()
            .map(|r| {
                (
                    self.mileage
                        .label_similarity(&req.mileage_bucket, &r.mileage_bucket),
                    r,
                )
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Selection {
            ranked: scored.into_iter().map(|(_, r)| r.clone()).collect(),
            used_fallback,
            threshold: Some(threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn rec(make: &str, model: &str, sub: &str, mileage: &str, days_ago: i64) -> EvaluationRecord {
        EvaluationRecord {
            make: make.into(),
            model: model.into(),
            sub_model: sub.into(),
            year: 2020,
            mileage_bucket: mileage.into(),
            score: Some(75),
            created_at: Some(now() - Duration::days(days_ago)),
            ..Default::default()
        }
    }

    fn req(make: &str, model: &str, sub: Option<&str>) -> AnalyzeRequest {
        AnalyzeRequest {
            make: make.into(),
            model: model.into(),
            sub_model: sub.map(String::from),
            year: 2020,
            mileage_bucket: "100,000-150,000".into(),
            ..Default::default()
        }
    }

    #[test]
    fn year_is_exact_and_stale_rows_are_ignored() {
        let mut other_year = rec("Toyota", "Corolla", "", "100,000-150,000", 1);
        other_year.year = 2021;
        let stale = rec("Toyota", "Corolla", "", "100,000-150,000", 46);
        let mut undated = rec("Toyota", "Corolla", "", "100,000-150,000", 0);
        undated.created_at = None;

        let sel = CandidateSelector::default().select(
            &[other_year, stale, undated],
            &req("Toyota", "Corolla", None),
            now(),
        );
        assert!(sel.is_empty());
        assert!(!sel.used_fallback);
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let edge = rec("Toyota", "Corolla", "", "", 45);
        let sel = CandidateSelector::default().select(&[edge], &req("Toyota", "Corolla", None), now());
        assert_eq!(sel.ranked.len(), 1);
    }

    #[test]
    fn loose_pass_only_when_strict_finds_nothing() {
        let records = vec![rec("Volkswagen", "Gulf", "", "", 1)];
        let sel = CandidateSelector::default().select(&records, &req("Volkswagen", "Golf", None), now());
        // "golf" vs "gulf" alone is 0.75; it must fail both passes
        assert!(sel.is_empty());

        let records = vec![rec("volkswagen gulf", "x", "", "", 1)];
        let sel = CandidateSelector::default().select(&records, &req("volkswagen golf", "x", None), now());
        assert_eq!(sel.threshold, Some(LOOSE_THRESHOLD));
    }

    #[test]
    fn sub_model_fallback_is_flagged() {
        let records = vec![rec("Toyota", "Corolla", "Sun", "", 1)];

        let sel = CandidateSelector::default().select(&records, &req("Toyota", "Corolla", Some("Sun")), now());
        assert_eq!(sel.ranked.len(), 1);
        assert!(!sel.used_fallback);

        let sel = CandidateSelector::default().select(&records, &req("Toyota", "Corolla", Some("GLi")), now());
        assert_eq!(sel.ranked.len(), 1);
        assert!(sel.used_fallback);

        let sel = CandidateSelector::default().select(&records, &req("Toyota", "Corolla", Some("  ")), now());
        assert!(!sel.used_fallback);
    }

    #[test]
    fn ranks_by_mileage_then_recency() {
        let records = vec![
            rec("Toyota", "Corolla", "", "150,000-200,000", 1),
            rec("Toyota", "Corolla", "", "100,000-150,000", 10),
            rec("Toyota", "Corolla", "", "100,000 - 150,000 km", 3),
        ];
        let sel = CandidateSelector::default().select(&records, &req("Toyota", "Corolla", None), now());
        assert_eq!(sel.ranked.len(), 3);
        assert_eq!(sel.ranked[0].mileage_bucket, "100,000 - 150,000 km");
        assert_eq!(sel.ranked[1].mileage_bucket, "100,000-150,000");
        assert_eq!(sel.ranked[2].mileage_bucket, "150,000-200,000");
    }
}
