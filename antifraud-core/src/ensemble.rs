//! Deterministic local risk ensemble.
//!
//! The ensemble always runs, whether or not an external scorer or the mesh is
//! available. It perturbs the base risk of the candidate's features with 32
//! hash-derived jitters and averages them. Identical candidates must produce
//! identical scores on every host, so nothing here may depend on randomness,
//! time or hash-map iteration order.

use serde::Serialize;

use crate::clamp_unit;
use crate::decision::Decision;
use crate::features::{derive_features, RiskSignal};
use crate::transaction::TransactionCandidate;

/// Number of pseudo-models in the ensemble.
pub const MODEL_COUNT: usize = 32;

/// Version tag reported for the local ensemble.
pub const MODEL_VERSION: &str = "mock-ensemble-32-v1";

/// Total width of the per-model jitter (±0.075).
const JITTER_SPAN: f64 = 0.15;

/// Outcome of the local ensemble.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleOutcome {
    /// Mean score rounded to 4 decimals.
    pub score: f64,
    /// Unrounded mean, used for threshold comparison and blending.
    #[serde(skip)]
    pub mean: f64,
    pub decision: Decision,
    pub reason: String,
    pub model_version: String,
    pub model_count: usize,
    pub signals: Vec<String>,
}

/// 32-bit string hash over UTF-16 code units (`h = h * 31 + c`, wrapping),
/// returned as an absolute value.
pub fn hash_string(value: &str) -> u32 {
    let hash = value
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32)
        });
    hash.unsigned_abs()
}

/// Shortest decimal text of `value` in ECMAScript `Number::toString` form.
///
/// Plain notation inside `[1e-6, 1e21)`, exponent notation with an explicit
/// sign outside it (`1e-7`, `1e+21`). Seeds depend on this text.
fn seed_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&value.abs()) {
        return value.to_string();
    }
    let text = format!("{:e}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => text,
    }
}

/// Jitter for model `index`, in `[-0.075, 0.075)`.
fn model_jitter(tx: &TransactionCandidate, index: usize) -> f64 {
    let seed = hash_string(&format!(
        "{}|{}|{}|{}",
        tx.address(),
        seed_number(tx.amount()),
        seed_number(tx.fee_rate()),
        index
    ));
    ((seed % 1000) as f64 / 1000.0 - 0.5) * JITTER_SPAN
}

/// Round to 4 decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Human-readable explanation of a decision.
pub fn build_reason(decision: Decision, score: f64, threshold: f64, signals: &[String]) -> String {
    let score_label = format!("score {:.1}%", score * 100.0);
    let threshold_label = format!("umbral {:.0}%", threshold * 100.0);
    let signal_list = signals.join(", ");
    match decision {
        Decision::Approve => format!(
            "Aprobada: {} por debajo del {}. Señales: {}.",
            score_label, threshold_label, signal_list
        ),
        Decision::Reject => format!(
            "Bloqueada: {} supera el {}. Señales: {}.",
            score_label, threshold_label, signal_list
        ),
    }
}

/// Score a candidate with the local ensemble.
pub fn run_local_ensemble(tx: &TransactionCandidate, threshold: f64) -> EnsembleOutcome {
    let features = derive_features(tx);
    let risk_signals = features.risk_signals();
    let base = features.base_risk();

    let total: f64 = (0..MODEL_COUNT)
        .map(|index| clamp_unit(base + model_jitter(tx, index)))
        .sum();
    let mean = total / MODEL_COUNT as f64;
    let decision = Decision::from_score(mean, threshold);
    let signals: Vec<String> = risk_signals.iter().map(RiskSignal::to_string).collect();

    EnsembleOutcome {
        score: round4(mean),
        mean,
        decision,
        reason: build_reason(decision, mean, threshold, &signals),
        model_version: MODEL_VERSION.to_string(),
        model_count: MODEL_COUNT,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(address: &str, amount: f64, fee_rate: f64) -> TransactionCandidate {
        TransactionCandidate::new(address, amount, fee_rate, "mainnet").unwrap()
    }

    #[test]
    fn test_hash_string_known_values() {
        assert_eq!(hash_string(""), 0);
        assert_eq!(hash_string("a"), 97);
        // 97 * 31 + 98
        assert_eq!(hash_string("ab"), 3105);
    }

    #[test]
    fn test_seed_number_formatting() {
        assert_eq!(seed_number(2.0), "2");
        assert_eq!(seed_number(0.1), "0.1");
        assert_eq!(seed_number(12.5), "12.5");
        assert_eq!(seed_number(0.000001), "0.000001");
        assert_eq!(seed_number(1e-7), "1e-7");
        assert_eq!(seed_number(2.5e-8), "2.5e-8");
        assert_eq!(seed_number(1e21), "1e+21");
        assert_eq!(seed_number(-0.0), "0");
    }

    #[test]
    fn test_hash_string_wraps() {
        // Long inputs overflow i32 and must wrap rather than panic.
        let long = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT|6|35|31".repeat(8);
        let _ = hash_string(&long);
    }

    #[test]
    fn test_deterministic() {
        let tx = candidate("bc1qexampleaddress1234", 0.5, 12.0);
        let first = run_local_ensemble(&tx, 0.7);
        let second = run_local_ensemble(&tx, 0.7);
        assert_eq!(first, second);
        assert_eq!(first.model_count, MODEL_COUNT);
        assert_eq!(first.model_version, MODEL_VERSION);
    }

    #[test]
    fn test_high_risk_candidate() {
        let tx = candidate("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", 6.0, 35.0);
        let outcome = run_local_ensemble(&tx, 0.7);

        assert_eq!(outcome.signals, vec!["monto_alto", "tarifa_alta", "direccion_legacy"]);
        // Base risk 0.70 perturbed by at most ±0.075.
        assert!(outcome.mean >= 0.625 && outcome.mean <= 0.775);
        assert_eq!(outcome.score, round4(outcome.mean));

        // Threshold boundary is inclusive.
        let at_boundary = run_local_ensemble(&tx, outcome.mean);
        assert_eq!(at_boundary.decision, Decision::Reject);
        let just_above = run_local_ensemble(&tx, outcome.mean + 1e-9);
        assert_eq!(just_above.decision, Decision::Approve);
    }

    #[test]
    fn test_reason_mentions_numbers_and_signals() {
        let tx = candidate("bc1qexampleaddress1234", 0.5, 12.0);
        let outcome = run_local_ensemble(&tx, 0.7);
        assert_eq!(outcome.decision, Decision::Approve);
        assert!(outcome.reason.starts_with("Aprobada: score "));
        assert!(outcome.reason.contains("umbral 70%"));
        assert!(outcome.reason.contains("direccion_segwit"));
    }

    #[test]
    fn test_reject_reason() {
        let reason = build_reason(Decision::Reject, 0.8123, 0.7, &["monto_alto".to_string()]);
        assert_eq!(
            reason,
            "Bloqueada: score 81.2% supera el umbral 70%. Señales: monto_alto."
        );
    }
}
