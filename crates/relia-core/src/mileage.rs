use crate::model::EvaluationRecord;
use crate::similarity::SimilarityMatcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Similarity a stored mileage label must reach to count as the same bucket.
pub const MILEAGE_THRESHOLD: f64 = 0.92;

/// Ordered mileage ranges, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MileageBucket {
    UpTo50k,
    From50kTo100k,
    From100kTo150k,
    From150kTo200k,
    Over200k,
}

fn number_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*").expect("static regex"))
}

impl MileageBucket {
    pub const ALL: [MileageBucket; 5] = [
        MileageBucket::UpTo50k,
        MileageBucket::From50kTo100k,
        MileageBucket::From100kTo150k,
        MileageBucket::From150kTo200k,
        MileageBucket::Over200k,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MileageBucket::UpTo50k => "up to 50,000",
            MileageBucket::From50kTo100k => "50,000-100,000",
            MileageBucket::From100kTo150k => "100,000-150,000",
            MileageBucket::From150kTo200k => "150,000-200,000",
            MileageBucket::Over200k => "200,000+",
        }
    }

    /// Classifies a free-text range label by its numeric bounds.
    ///
    /// `"100,000 - 150,000 km"`, `"100-150k"` and `"100,000-150,000"` all map
    /// to the same bucket; open-ended labels (`"200,000+"`, `"over 200k"`) are
    /// classified by their lower bound, closed ones by their upper bound.
    pub fn classify(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        let bounds: Vec<u64> = number_token()
            .find_iter(&lowered)
            .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
            .map(|n| if n >= 1000 { n / 1000 } else { n })
            .collect();
        let top = *bounds.iter().max()?;

        let open_ended = lowered.contains('+')
            || ["over", "above", "more than", "מעל"]
                .iter()
                .any(|w| lowered.contains(w));

        let bucket = if open_ended {
            match top {
                t if t >= 200 => MileageBucket::Over200k,
                t if t >= 150 => MileageBucket::From150kTo200k,
                t if t >= 100 => MileageBucket::From100kTo150k,
                t if t >= 50 => MileageBucket::From50kTo100k,
                _ => MileageBucket::UpTo50k,
            }
        } else {
            match top {
                t if t <= 50 => MileageBucket::UpTo50k,
                t if t <= 100 => MileageBucket::From50kTo100k,
                t if t <= 150 => MileageBucket::From100kTo150k,
                t if t <= 200 => MileageBucket::From150kTo200k,
                _ => MileageBucket::Over200k,
            }
        };
        Some(bucket)
    }

    /// Score delta for requesting this bucket: top −15, second −10, third −5.
    pub fn penalty(&self) -> i64 {
        match self {
            MileageBucket::Over200k => -15,
            MileageBucket::From150kTo200k => -10,
            MileageBucket::From100kTo150k => -5,
            MileageBucket::From50kTo100k | MileageBucket::UpTo50k => 0,
        }
    }

    fn note(&self) -> Option<&'static str> {
        match self {
            MileageBucket::Over200k => {
                Some("Score lowered by 15 points for very high mileage (200,000+ km).")
            }
            MileageBucket::From150kTo200k => {
                Some("Score lowered by 10 points for high mileage (150,000-200,000 km).")
            }
            MileageBucket::From100kTo150k => {
                Some("Score lowered by 5 points for medium-high mileage (100,000-150,000 km).")
            }
            MileageBucket::From50kTo100k | MileageBucket::UpTo50k => None,
        }
    }
}

/// Canonical label when the text is classifiable, otherwise the text itself.
pub fn canonical_label(text: &str) -> String {
    MileageBucket::classify(text)
        .map(|b| b.label().to_string())
        .unwrap_or_else(|| text.to_string())
}

/// Clamps `base + delta` into the score range.
pub fn clamp_score(base: i64, delta: i64) -> i64 {
    base.saturating_add(delta).clamp(0, 100)
}

/// A result whose score has been adjusted for the requested mileage.
///
/// Only [`MileageReconciler::adjust`] builds one, and it consumes the plain
/// record, so a response cannot be adjusted twice.
#[derive(Debug, Clone)]
pub struct Adjusted {
    record: EvaluationRecord,
    delta: i64,
    note: Option<String>,
}

impl Adjusted {
    pub fn record(&self) -> &EvaluationRecord {
        &self.record
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn into_parts(self) -> (EvaluationRecord, i64, Option<String>) {
        (self.record, self.delta, self.note)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MileageReconciler {
    matcher: SimilarityMatcher,
    threshold: f64,
}

impl Default for MileageReconciler {
    fn default() -> Self {
        Self::new(SimilarityMatcher::default(), MILEAGE_THRESHOLD)
    }
}

impl MileageReconciler {
    pub fn new(matcher: SimilarityMatcher, threshold: f64) -> Self {
        Self { matcher, threshold }
    }

    /// Similarity of two mileage labels, compared in canonical form.
    pub fn label_similarity(&self, requested: &str, stored: &str) -> f64 {
        self.matcher
            .similarity(&canonical_label(requested), &canonical_label(stored))
    }

    /// `true` when the stored bucket is too far from the requested one. The
    /// result is still usable; callers surface this as a warning. Two empty
    /// labels are identical and match.
    pub fn is_mismatch(&self, requested: &str, stored: &str) -> bool {
        let (req_empty, stored_empty) = (requested.trim().is_empty(), stored.trim().is_empty());
        if req_empty || stored_empty {
            return req_empty != stored_empty;
        }
        self.label_similarity(requested, stored) < self.threshold
    }

    /// Applies the requested-bucket penalty to whatever score the record has.
    pub fn adjust(&self, mut record: EvaluationRecord, requested: &str) -> Adjusted {
        let Some(bucket) = MileageBucket::classify(requested) else {
            return Adjusted {
                record,
                delta: 0,
                note: None,
            };
        };
        let delta = bucket.penalty();
        if delta != 0 {
            record.score = record.score.map(|s| clamp_score(s, delta));
            tracing::debug!(
                event = "mileage_adjusted",
                bucket = bucket.label(),
                delta = delta,
                score = ?record.score
            );
        }
        Adjusted {
            record,
            delta,
            note: bucket.note().map(String::from),
        }
    }
}
