use crate::mileage::canonical_label;
use crate::model::AnalyzeRequest;
use crate::normalize::Normalizer;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Stable key for a request: equal for requests that differ only in case,
/// spacing, parenthesized notes or mileage label spelling.
pub fn request_key(normalizer: &Normalizer, req: &AnalyzeRequest) -> String {
    let parts = [
        format!("make={}", normalizer.normalize(&req.make)),
        format!("model={}", normalizer.normalize(&req.model)),
        format!("sub_model={}", normalizer.normalize_opt(req.sub_model())),
        format!("year={}", req.year),
        format!("fuel={}", normalizer.normalize(&req.fuel)),
        format!("transmission={}", normalizer.normalize(&req.transmission)),
        format!("mileage={}", canonical_label(&req.mileage_bucket)),
    ];
    sha256_hex(&parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(make: &str, mileage: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            make: make.into(),
            model: "Corolla".into(),
            year: 2020,
            mileage_bucket: mileage.into(),
            ..Default::default()
        }
    }

    #[test]
    fn key_ignores_cosmetic_differences() {
        let n = Normalizer::default();
        let a = request_key(&n, &req("Toyota", "100,000-150,000"));
        let b = request_key(&n, &req("  TOYOTA (JP) ", "100,000 - 150,000 km"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_changes_with_identity() {
        let n = Normalizer::default();
        assert_ne!(
            request_key(&n, &req("Toyota", "100,000-150,000")),
            request_key(&n, &req("Mazda", "100,000-150,000"))
        );
    }
}
