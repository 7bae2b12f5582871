//! Confidence scoring and candidate selection.
//!
//! Scores every field candidate from a base value adjusted by proximity to
//! the anchor line, currency corroboration, the strength of the rule that
//! produced it, and range plausibility. The highest-scoring candidate per
//! field wins; ties go to the candidate closer to the anchor.

use crate::config::PipelineConfig;
use crate::models::{
    FieldCandidate, FieldKind, MatchStrength, UnresolvedEntry, UnresolvedReason,
};
use std::collections::HashMap;

const BASE_SCORE: f64 = 0.5;
const PROXIMITY_PENALTY_PER_LINE: f64 = 0.05;
const CURRENCY_BONUS: f64 = 0.15;
const TEMPLATE_BONUS: f64 = 0.2;
const COLUMN_HINT_BONUS: f64 = 0.15;
const DERIVED_PENALTY: f64 = 0.2;
const RANGE_BONUS: f64 = 0.1;
/// Out-of-range values are capped near zero but kept visible.
const OUT_OF_RANGE_CAP: f64 = 0.05;

/// Broad static bounds for prices and quantities; the market value band is
/// the configured plausible range.
const PRICE_BOUNDS: [f64; 2] = [0.0001, 10_000_000.0];
const QUANTITY_BOUNDS: [f64; 2] = [0.000001, 1_000_000_000_000.0];

/// Aggregation weights; market value and the identifier dominate.
const FIELD_WEIGHTS: &[(FieldKind, f64)] = &[
    (FieldKind::Identifier, 3.0),
    (FieldKind::MarketValue, 3.0),
    (FieldKind::Price, 2.0),
    (FieldKind::Quantity, 2.0),
    (FieldKind::Name, 1.0),
    (FieldKind::Currency, 1.0),
];

/// Winning candidates for one anchor plus the aggregate confidence.
pub struct ScoredAnchor {
    pub winners: HashMap<FieldKind, FieldCandidate>,
    pub overall: f64,
}

/// Score all candidates of an anchor and select one winner per field.
pub fn score(
    identifier: &str,
    anchor_line: usize,
    candidates: Vec<FieldCandidate>,
    config: &PipelineConfig,
    expected_total: Option<f64>,
) -> (ScoredAnchor, Vec<UnresolvedEntry>) {
    let mut unresolved = Vec::new();
    let mut winners: HashMap<FieldKind, FieldCandidate> = HashMap::new();

    for mut candidate in candidates {
        let (confidence, out_of_range) =
            score_candidate(&candidate, anchor_line, config, expected_total);
        candidate.confidence = confidence;

        if out_of_range {
            log::warn!(
                "{}: {} value {:?} outside plausible bounds",
                identifier,
                candidate.field.as_str(),
                candidate.value
            );
            unresolved.push(UnresolvedEntry {
                identifier: identifier.to_string(),
                reason: UnresolvedReason::OutOfRangeValue,
                detail: Some(format!(
                    "{} {} from line {}",
                    candidate.field.as_str(),
                    candidate.raw,
                    candidate.provenance.line
                )),
            });
        }

        let replace = match winners.get(&candidate.field) {
            Some(current) => beats(&candidate, current, anchor_line),
            None => true,
        };
        if replace {
            winners.insert(candidate.field, candidate);
        }
    }

    let overall = overall_confidence(&winners);
    (ScoredAnchor { winners, overall }, unresolved)
}

/// Higher confidence wins; exact ties go to the smaller line distance.
fn beats(challenger: &FieldCandidate, current: &FieldCandidate, anchor_line: usize) -> bool {
    if challenger.confidence != current.confidence {
        return challenger.confidence > current.confidence;
    }
    distance(challenger, anchor_line) < distance(current, anchor_line)
}

fn distance(candidate: &FieldCandidate, anchor_line: usize) -> usize {
    candidate.provenance.line.abs_diff(anchor_line)
}

fn score_candidate(
    candidate: &FieldCandidate,
    anchor_line: usize,
    config: &PipelineConfig,
    expected_total: Option<f64>,
) -> (f64, bool) {
    let mut score = BASE_SCORE;

    score -= PROXIMITY_PENALTY_PER_LINE * distance(candidate, anchor_line) as f64;

    let is_numeric_field = matches!(
        candidate.field,
        FieldKind::Quantity | FieldKind::Price | FieldKind::MarketValue
    );
    if is_numeric_field && candidate.currency_corroborated {
        score += CURRENCY_BONUS;
    }

    score += match candidate.strength {
        MatchStrength::Template => TEMPLATE_BONUS,
        MatchStrength::ColumnHint => COLUMN_HINT_BONUS,
        MatchStrength::Heuristic => 0.0,
        MatchStrength::Derived => -DERIVED_PENALTY,
    };

    let mut out_of_range = false;
    if let Some(value) = candidate.value {
        let in_range = match candidate.field {
            FieldKind::MarketValue => config.is_plausible(value, expected_total),
            FieldKind::Price => value >= PRICE_BOUNDS[0] && value <= PRICE_BOUNDS[1],
            FieldKind::Quantity => value >= QUANTITY_BOUNDS[0] && value <= QUANTITY_BOUNDS[1],
            _ => true,
        };
        if in_range {
            score += RANGE_BONUS;
        } else {
            out_of_range = true;
            score = score.min(OUT_OF_RANGE_CAP);
        }
    }

    (score.clamp(0.0, 1.0), out_of_range)
}

/// Weighted mean of field confidences. Fields with no winner count as zero,
/// the identifier (checksum-validated) as one.
fn overall_confidence(winners: &HashMap<FieldKind, FieldCandidate>) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (field, weight) in FIELD_WEIGHTS {
        total_weight += weight;
        let confidence = match field {
            FieldKind::Identifier => 1.0,
            _ => winners.get(field).map(|c| c.confidence).unwrap_or(0.0),
        };
        weighted += weight * confidence;
    }
    weighted / total_weight
}
