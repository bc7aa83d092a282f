use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Which characters survive normalization.
///
/// `Lenient` keeps everything except parenthesized segments. `Strict` further
/// restricts the output to Latin and Hebrew letters, digits, space and hyphen,
/// which is what catalog-driven forms produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    #[default]
    Lenient,
    Strict,
}

fn parens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // (?s) so a segment spanning a newline is removed on the first pass
    RE.get_or_init(|| Regex::new(r"(?s)\(.*?\)").expect("static regex"))
}

fn disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9a-z\x{05D0}-\x{05EA}\s-]+").expect("static regex"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    mode: NormalizeMode,
}

impl Normalizer {
    pub fn new(mode: NormalizeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> NormalizeMode {
        self.mode
    }

    /// Canonical comparable form of a free-text identifier.
    ///
    /// Total and idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(&self, input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }
        let stripped = parens().replace_all(input, " ");
        let lowered = stripped.to_lowercase();
        let filtered = match self.mode {
            NormalizeMode::Lenient => lowered,
            NormalizeMode::Strict => disallowed().replace_all(&lowered, " ").into_owned(),
        };
        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn normalize_opt(&self, input: Option<&str>) -> String {
        input.map(|s| self.normalize(s)).unwrap_or_default()
    }
}

/// Lenient normalization, the default for stored identifiers.
pub fn normalize(input: &str) -> String {
    Normalizer::default().normalize(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_year_range_annotations() {
        assert_eq!(normalize("Corolla (2019-2024)"), "corolla");
        assert_eq!(normalize("  Mazda   3 (BM) Sport "), "mazda 3 sport");
    }

    #[test]
    fn empty_and_whitespace_inputs() {
        let n = Normalizer::default();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("   \t\n"), "");
        assert_eq!(n.normalize_opt(None), "");
    }

    #[test]
    fn strict_mode_restricts_alphabet() {
        let n = Normalizer::new(NormalizeMode::Strict);
        assert_eq!(n.normalize("Škoda Octavia!"), "koda octavia");
        assert_eq!(n.normalize("טויוטה קורולה"), "טויוטה קורולה");
        assert_eq!(n.normalize("CX-5 / 2.5L"), "cx-5 2 5l");
    }

    #[test]
    fn idempotent_on_awkward_inputs() {
        let samples = [
            "(a\nb) Model",
            "((x)) y",
            "Toyota ",
            "אאודי A4 (B9)",
            "Land-Rover  Defender (",
            ") Mini (",
            "CX-5 / 2.5L",
            "Straße ΣΑΣ",
        ];
        for mode in [NormalizeMode::Lenient, NormalizeMode::Strict] {
            let n = Normalizer::new(mode);
            for s in samples {
                let once = n.normalize(s);
                assert_eq!(n.normalize(&once), once, "mode={:?} input={:?}", mode, s);
            }
        }
    }
}
