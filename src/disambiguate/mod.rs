//! Numeric disambiguation.
//!
//! Assigns the numeric runs gathered per anchor to quantity, price, and market
//! value. Fused digit runs are split by the format template library; plain
//! tokens follow their column-role hint; leftovers are resolved by arithmetic
//! consistency where possible. A price-and-quantity pair without a market
//! value derives one when the instrument prices as percentage of par.

pub mod templates;

use crate::config::PipelineConfig;
use crate::extract::{AnchorContext, NumericRun};
use crate::models::{
    FieldCandidate, FieldKind, MatchStrength, Provenance, UnresolvedEntry, UnresolvedReason,
};
use templates::matching_templates;

/// Relative tolerance for the quantity x price ~ market value consistency
/// check on unhinted integer pairs.
const PAIR_CONSISTENCY_TOLERANCE: f64 = 0.01;

/// Price band (percent of par) inside which bond-style derivation applies.
const PAR_PRICE_RANGE: [f64; 2] = [0.0, 200.0];

/// Resolve an anchor's numeric runs into field-labeled candidates.
pub fn disambiguate(
    anchor: &AnchorContext,
    config: &PipelineConfig,
    expected_total: Option<f64>,
) -> (Vec<FieldCandidate>, Vec<UnresolvedEntry>) {
    let mut candidates = Vec::new();
    let mut unresolved = Vec::new();
    let mut leftovers: Vec<&NumericRun> = Vec::new();

    for run in &anchor.numeric_runs {
        let plain_value = run.raw.parse::<f64>().ok();

        if let (Some(value), Some(field)) = (plain_value, run.hint) {
            candidates.push(candidate(
                field,
                run.raw.clone(),
                Some(value),
                MatchStrength::ColumnHint,
                run,
                "column_hint",
            ));
            continue;
        }

        let matches = matching_templates(&run.raw);
        if !matches.is_empty() {
            // More than one structural match: prefer the split whose market
            // value is plausible, else the highest-priority one.
            let chosen = matches
                .iter()
                .find(|m| {
                    m.market_value()
                        .map(|v| config.is_plausible(v, expected_total))
                        .unwrap_or(false)
                })
                .unwrap_or(&matches[0]);
            for (field, raw, value) in &chosen.parts {
                candidates.push(candidate(
                    *field,
                    raw.clone(),
                    Some(*value),
                    MatchStrength::Template,
                    run,
                    chosen.template.name,
                ));
            }
            continue;
        }

        match (plain_value, run.hint) {
            // Fused run, no template, but a governing column: keep it on that
            // column unparsed rather than losing it.
            (None, Some(field)) => {
                candidates.push(candidate(
                    field,
                    run.raw.clone(),
                    None,
                    MatchStrength::Heuristic,
                    run,
                    "column_hint_fallback",
                ));
            }
            (None, None) => {
                log::warn!("no template matched numeric run '{}'", run.raw);
                unresolved.push(UnresolvedEntry {
                    identifier: anchor.identifier.clone(),
                    reason: UnresolvedReason::AmbiguousNumericRun,
                    detail: Some(format!("run '{}' at line {}", run.raw, run.line)),
                });
            }
            // Plain unhinted token; resolved below by arithmetic consistency.
            (Some(_), _) => leftovers.push(run),
        }
    }

    let resolved_pair = resolve_leftover_pair(anchor, &candidates, &leftovers);
    candidates.extend(resolved_pair);

    derive_market_value(anchor, &mut candidates);

    (candidates, unresolved)
}

fn candidate(
    field: FieldKind,
    raw: String,
    value: Option<f64>,
    strength: MatchStrength,
    run: &NumericRun,
    rule: &'static str,
) -> FieldCandidate {
    FieldCandidate {
        field,
        raw,
        value,
        confidence: 0.0,
        strength,
        provenance: Provenance { line: run.line, rule },
        currency_corroborated: run.currency_on_line,
    }
}

fn has_field(candidates: &[FieldCandidate], field: FieldKind) -> bool {
    candidates.iter().any(|c| c.field == field && c.value.is_some())
}

/// Two unhinted integers next to a known price: check which assignment of
/// (quantity, market value) satisfies quantity x price (= or /100) ~ value.
fn resolve_leftover_pair(
    anchor: &AnchorContext,
    existing: &[FieldCandidate],
    leftovers: &[&NumericRun],
) -> Vec<FieldCandidate> {
    if leftovers.len() != 2
        || has_field(existing, FieldKind::Quantity)
        || has_field(existing, FieldKind::MarketValue)
    {
        return Vec::new();
    }
    let Some(price) = best_value(existing, FieldKind::Price) else {
        return Vec::new();
    };

    let a = leftovers[0];
    let b = leftovers[1];
    let (va, vb) = match (a.raw.parse::<f64>(), b.raw.parse::<f64>()) {
        (Ok(va), Ok(vb)) => (va, vb),
        _ => return Vec::new(),
    };

    // Both orderings, par formula before plain, first consistent wins.
    let assignments = [
        (a, va, b, vb, 100.0),
        (a, va, b, vb, 1.0),
        (b, vb, a, va, 100.0),
        (b, vb, a, va, 1.0),
    ];
    for (qty_run, qty, value_run, value, divisor) in assignments {
        if divisor > 1.0 && !anchor.bond_context {
            continue;
        }
        let computed = qty * price / divisor;
        if value > 0.0 && (computed - value).abs() <= PAIR_CONSISTENCY_TOLERANCE * value {
            log::debug!(
                "{}: pair consistency resolved qty={} value={}",
                anchor.identifier,
                qty,
                value
            );
            return vec![
                candidate(
                    FieldKind::Quantity,
                    qty_run.raw.clone(),
                    Some(qty),
                    MatchStrength::Heuristic,
                    qty_run,
                    "pair_consistency",
                ),
                candidate(
                    FieldKind::MarketValue,
                    value_run.raw.clone(),
                    Some(value),
                    MatchStrength::Heuristic,
                    value_run,
                    "pair_consistency",
                ),
            ];
        }
    }
    Vec::new()
}

/// Price and quantity without a market value: derive it for percentage-of-par
/// instruments. The derived candidate is marked as such and scores lower than
/// anything extracted from the text.
fn derive_market_value(anchor: &AnchorContext, candidates: &mut Vec<FieldCandidate>) {
    if has_field(candidates, FieldKind::MarketValue) || !anchor.bond_context {
        return;
    }
    let (Some(price), Some(quantity)) = (
        best_value(candidates, FieldKind::Price),
        best_value(candidates, FieldKind::Quantity),
    ) else {
        return;
    };
    if price < PAR_PRICE_RANGE[0] || price > PAR_PRICE_RANGE[1] {
        return;
    }

    let derived = price * quantity / 100.0;
    let line = candidates
        .iter()
        .find(|c| c.field == FieldKind::Price)
        .map(|c| c.provenance.line)
        .unwrap_or(anchor.anchor_line);
    candidates.push(FieldCandidate {
        field: FieldKind::MarketValue,
        raw: format!("{:.2}", derived),
        value: Some(derived),
        confidence: 0.0,
        strength: MatchStrength::Derived,
        provenance: Provenance {
            line,
            rule: "derived_price_times_quantity",
        },
        currency_corroborated: false,
    });
}

/// Best available value for a field, preferring stronger match classes, then
/// proximity to the anchor. Mirrors the scorer's ordering closely enough for
/// pre-scoring arithmetic.
fn best_value(candidates: &[FieldCandidate], field: FieldKind) -> Option<f64> {
    candidates
        .iter()
        .filter(|c| c.field == field)
        .filter_map(|c| c.value.map(|v| (strength_rank(c.strength), v)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, v)| v)
}

fn strength_rank(strength: MatchStrength) -> u8 {
    match strength {
        MatchStrength::Template => 0,
        MatchStrength::ColumnHint => 1,
        MatchStrength::Heuristic => 2,
        MatchStrength::Derived => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::normalize::normalize;
    use crate::structure::analyze;

    fn anchors_for(text: &str) -> Vec<AnchorContext> {
        let mut doc = normalize(text);
        let regions = analyze(&mut doc);
        extract(&doc, &regions, &PipelineConfig::default()).0
    }

    fn values(candidates: &[FieldCandidate], field: FieldKind) -> Vec<f64> {
        candidates
            .iter()
            .filter(|c| c.field == field)
            .filter_map(|c| c.value)
            .collect()
    }

    #[test]
    fn test_hinted_runs_become_candidates() {
        let anchors = anchors_for(
            "Bezeichnung Währung Anzahl Kurs Kurswert\nISIN XS2530201644 CHF 200000 99.5400 199080\n",
        );
        let (candidates, unresolved) =
            disambiguate(&anchors[0], &PipelineConfig::default(), None);

        assert!(unresolved.is_empty());
        assert_eq!(values(&candidates, FieldKind::Quantity), vec![200_000.0]);
        assert_eq!(values(&candidates, FieldKind::Price), vec![99.54]);
        assert_eq!(values(&candidates, FieldKind::MarketValue), vec![199_080.0]);
    }

    #[test]
    fn test_fused_run_split_by_template() {
        let anchors = anchors_for(
            "TORONTO DOMINION NOTES POSITION\nXS2530201644 CHF 100.200099.6285200'288\n",
        );
        let (candidates, unresolved) =
            disambiguate(&anchors[0], &PipelineConfig::default(), None);

        assert!(unresolved.is_empty());
        assert_eq!(values(&candidates, FieldKind::Price), vec![100.2]);
        assert_eq!(values(&candidates, FieldKind::MarketValue), vec![200_288.0]);
    }

    #[test]
    fn test_pair_consistency_resolves_unhinted_integers() {
        // No header: quantity and value are bare integers, the price is the
        // only shaped token. 200000 x 99.54 / 100 = 199080.
        let anchors =
            anchors_for("BANK NOTES REG-S VRN\nXS2530201644 CHF 200'000 99.5400 199'080\n");
        let (candidates, _) = disambiguate(&anchors[0], &PipelineConfig::default(), None);

        assert_eq!(values(&candidates, FieldKind::Quantity), vec![200_000.0]);
        assert_eq!(values(&candidates, FieldKind::MarketValue), vec![199_080.0]);
    }

    #[test]
    fn test_equity_pair_consistency_without_par() {
        // 100 shares x 102.5000 = 10250, no bond context.
        let anchors = anchors_for("PLAIN SHARES POSITION\nCH0038863350 CHF 100 102.5000 10'250\n");
        let (candidates, _) = disambiguate(&anchors[0], &PipelineConfig::default(), None);

        assert_eq!(values(&candidates, FieldKind::Quantity), vec![100.0]);
        assert_eq!(values(&candidates, FieldKind::MarketValue), vec![10_250.0]);
    }

    #[test]
    fn test_derived_market_value_for_bonds() {
        let anchors = anchors_for(
            "Bezeichnung Anzahl Kurs\nBOND NOTES 23-27 POSITION\nXS2530201644 200000 99.5400\n",
        );
        let (candidates, _) = disambiguate(&anchors[0], &PipelineConfig::default(), None);

        let derived: Vec<_> = candidates
            .iter()
            .filter(|c| c.strength == MatchStrength::Derived)
            .collect();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].field, FieldKind::MarketValue);
        assert_eq!(derived[0].value, Some(199_080.0));
        assert_eq!(derived[0].provenance.rule, "derived_price_times_quantity");
    }

    #[test]
    fn test_unmatched_fused_run_reported() {
        let anchors = anchors_for("ODD POSITION DATA\nXS2530201644 CHF 1.2.3.4.5\n");
        let (candidates, unresolved) =
            disambiguate(&anchors[0], &PipelineConfig::default(), None);

        assert!(values(&candidates, FieldKind::MarketValue).is_empty());
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].reason, UnresolvedReason::AmbiguousNumericRun);
    }

    #[test]
    fn test_template_choice_prefers_plausible_market_value() {
        let config = PipelineConfig {
            expected_holding_count: Some(20),
            ..Default::default()
        };
        let anchors =
            anchors_for("BOND NOTES POSITION\nXS2530201644 CHF 100.200099.6285200'288\n");
        let (candidates, _) = disambiguate(&anchors[0], &config, Some(4_000_000.0));

        // 4M / 20 holdings = 200k average; 200288 sits inside the band.
        assert_eq!(values(&candidates, FieldKind::MarketValue), vec![200_288.0]);
    }
}
