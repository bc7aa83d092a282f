//! Sequence-alignment similarity between normalized identifiers.
//!
//! The ratio is the Ratcliff/Obershelp measure: find the longest common
//! block, recurse on both sides of it, and report `2·M / (|a| + |b|)` where
//! `M` is the total size of all matched blocks. No junk heuristic is applied;
//! identifiers are short.

use crate::normalize::Normalizer;
use std::collections::HashMap;

/// Threshold used for the first matching pass.
pub const STRICT_THRESHOLD: f64 = 0.97;
/// Threshold used only when the strict pass found nothing.
pub const LOOSE_THRESHOLD: f64 = 0.93;

/// Similarity ratio in `[0.0, 1.0]` of two already-normalized strings.
///
/// Symmetric: arguments are put in a canonical order before alignment, since
/// block matching breaks ties by position and is not symmetric on its own.
pub fn ratio(a: &str, b: &str) -> f64 {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    (2.0 * matched as f64) / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` within the given windows, earliest
/// in `a` (then in `b`) on ties.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0usize);
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let prev = if j > 0 {
                    j2len.get(&(j - 1)).copied().unwrap_or(0)
                } else {
                    0
                };
                let k = prev + 1;
                next.insert(j, k);
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            }
        }
        j2len = next;
    }
    (best_i, best_j, best_k)
}

/// Threshold matching on top of a [`Normalizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityMatcher {
    normalizer: Normalizer,
}

impl SimilarityMatcher {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Similarity of two raw strings after normalizing both.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        ratio(&self.normalizer.normalize(a), &self.normalizer.normalize(b))
    }

    pub fn matches(&self, query: &str, candidate: &str, threshold: f64) -> bool {
        self.similarity(query, candidate) >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_strings_score_one() {
        assert!(approx(ratio("corolla", "corolla"), 1.0));
        assert!(approx(ratio("", ""), 1.0));
    }

    #[test]
    fn known_ratios() {
        // "abcd" vs "bcde": one block "bcd" of 3 → 6/8
        assert!(approx(ratio("abcd", "bcde"), 0.75));
        assert!(approx(ratio("corolla", ""), 0.0));
        assert!(approx(ratio("abc", "xyz"), 0.0));
        // two blocks: "ab" + "d"
        assert!(approx(ratio("abxd", "abd"), 6.0 / 7.0));
    }

    #[test]
    fn symmetric_on_tie_sensitive_pairs() {
        let pairs = [
            ("tide", "diet"),
            ("qabxcd", "abycdf"),
            ("150,000-200,000", "100,000-150,000"),
            ("mazda 3", "3 mazda"),
            ("ab", "ba"),
        ];
        for (a, b) in pairs {
            assert!(approx(ratio(a, b), ratio(b, a)), "{} / {}", a, b);
        }
    }

    #[test]
    fn matcher_normalizes_before_comparing() {
        let m = SimilarityMatcher::default();
        assert!(m.matches("Toyota ", "toyota", STRICT_THRESHOLD));
        assert!(m.matches("Corolla (2019-2024)", "corolla", STRICT_THRESHOLD));
        assert!(!m.matches("Corolla", "Camry", LOOSE_THRESHOLD));
    }

    #[test]
    fn one_letter_typo_passes_only_loose_pass() {
        let m = SimilarityMatcher::default();
        // 15 + 15 chars, 14 matched → 28/30 ≈ 0.933
        let s = m.similarity("volkswagen golf", "volkswagen gulf");
        assert!(s >= LOOSE_THRESHOLD && s < STRICT_THRESHOLD, "{}", s);
    }
}
