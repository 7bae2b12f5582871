//! Reconciliation against expected totals.
//!
//! Deduplicates holdings by identifier, compares the extracted total (and
//! per-asset-class subtotals where available) against externally supplied
//! expected totals, and applies a bounded proportional correction or flags the
//! run as unreconciled. Never adds or removes holdings to force agreement.

use crate::config::PipelineConfig;
use crate::models::{
    AssetClassDeviation, CorrectionEntry, CorrectionRule, ExpectedTotals, HoldingRecord,
    SummaryTotal, UnresolvedEntry, UnresolvedReason, ValidationReport,
};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Read-only context for one reconciliation run.
pub struct ReconcileContext<'a> {
    pub config: &'a PipelineConfig,
    pub expected: Option<&'a ExpectedTotals>,
    /// Labeled totals from the document's own summary regions; used as the
    /// expected-total fallback when the caller supplied none.
    pub summary_totals: &'a [SummaryTotal],
    pub conversion_rates: &'a HashMap<String, f64>,
    pub correction_rules: &'a [CorrectionRule],
    pub statement_date: Option<NaiveDate>,
}

/// Reconcile scored holdings into the final list plus the validation report.
pub fn reconcile(
    holdings: Vec<HoldingRecord>,
    ctx: &ReconcileContext<'_>,
    mut unresolved: Vec<UnresolvedEntry>,
) -> (Vec<HoldingRecord>, ValidationReport) {
    let mut corrections: Vec<CorrectionEntry> = Vec::new();

    let mut holdings = dedup(holdings, &mut unresolved);

    apply_correction_rules(&mut holdings, ctx.correction_rules, &mut corrections);

    let extracted_total: f64 = holdings
        .iter()
        .filter_map(|h| converted_value(h, ctx))
        .sum();

    let (expected_total, tolerance) = resolve_expected_total(ctx);

    let mut deviation = None;
    if let Some(expected) = expected_total {
        let dev = (extracted_total - expected).abs() / expected;
        deviation = Some(dev);

        if dev > tolerance {
            let ratio = if expected > 0.0 { extracted_total / expected } else { 0.0 };
            let [min_ratio, max_ratio] = ctx.config.scaling_eligible_range;
            if ratio >= min_ratio && ratio <= max_ratio && extracted_total > 0.0 {
                // Deviation looks systematic: scale every holding by one
                // factor and keep the originals for audit.
                let factor = expected / extracted_total;
                log::info!(
                    "scaling {} holdings by {:.6} (extracted {:.2}, expected {:.2})",
                    holdings.len(),
                    factor,
                    extracted_total,
                    expected
                );
                for holding in holdings.iter_mut() {
                    // Externally pinned values are authoritative.
                    if holding.corrected {
                        continue;
                    }
                    if let Some(value) = holding.market_value {
                        holding.original_market_value = Some(value);
                        holding.market_value = Some(value * factor);
                        holding.corrected = true;
                        corrections.push(CorrectionEntry {
                            identifier: holding.identifier.clone(),
                            original: value,
                            corrected: value * factor,
                            rule: "proportionalScaling".to_string(),
                        });
                    }
                }
            } else {
                // Isolated errors, not a systematic factor: blind scaling
                // would corrupt otherwise-correct holdings.
                log::warn!(
                    "unreconciled total: extracted {:.2} vs expected {:.2} (ratio {:.3})",
                    extracted_total,
                    expected,
                    ratio
                );
                unresolved.push(UnresolvedEntry {
                    identifier: String::new(),
                    reason: UnresolvedReason::UnreconciledTotal,
                    detail: Some(format!(
                        "extracted {:.2} vs expected {:.2} (ratio {:.3})",
                        extracted_total, expected, ratio
                    )),
                });
            }
        }
    }

    let asset_class_deviations = compare_asset_classes(ctx);

    let report = ValidationReport {
        holdings_count: holdings.len(),
        extracted_total,
        expected_total,
        deviation,
        corrections_applied: corrections,
        unresolved,
        asset_class_deviations,
        statement_date: ctx.statement_date,
    };

    (holdings, report)
}

/// Keep the higher-confidence record per identifier, preserving first-seen
/// order, and report every merge.
fn dedup(
    holdings: Vec<HoldingRecord>,
    unresolved: &mut Vec<UnresolvedEntry>,
) -> Vec<HoldingRecord> {
    let mut index_by_identifier: HashMap<String, usize> = HashMap::new();
    let mut deduped: Vec<HoldingRecord> = Vec::new();

    for holding in holdings {
        match index_by_identifier.get(&holding.identifier) {
            Some(&i) => {
                let kept = holding.confidence.max(deduped[i].confidence);
                let dropped = holding.confidence.min(deduped[i].confidence);
                unresolved.push(UnresolvedEntry {
                    identifier: holding.identifier.clone(),
                    reason: UnresolvedReason::DuplicateIdentifier,
                    detail: Some(format!(
                        "kept confidence {:.2}, dropped {:.2}",
                        kept, dropped
                    )),
                });
                if holding.confidence > deduped[i].confidence {
                    deduped[i] = holding;
                }
            }
            None => {
                index_by_identifier.insert(holding.identifier.clone(), deduped.len());
                deduped.push(holding);
            }
        }
    }
    deduped
}

fn apply_correction_rules(
    holdings: &mut [HoldingRecord],
    rules: &[CorrectionRule],
    corrections: &mut Vec<CorrectionEntry>,
) {
    for rule in rules {
        let Some(holding) = holdings.iter_mut().find(|h| h.identifier == rule.identifier)
        else {
            continue;
        };
        if holding.market_value == Some(rule.expected_value) {
            continue;
        }
        log::info!(
            "external correction for {}: {:?} -> {}",
            rule.identifier,
            holding.market_value,
            rule.expected_value
        );
        corrections.push(CorrectionEntry {
            identifier: holding.identifier.clone(),
            original: holding.market_value.unwrap_or(0.0),
            corrected: rule.expected_value,
            rule: "externalRule".to_string(),
        });
        holding.original_market_value = holding.market_value;
        holding.market_value = Some(rule.expected_value);
        holding.corrected = true;
    }
}

/// Market value converted into the reconciliation base currency with the
/// caller-supplied rates. Missing rates leave the value unconverted.
fn converted_value(holding: &HoldingRecord, ctx: &ReconcileContext<'_>) -> Option<f64> {
    let value = holding.market_value?;
    let (Some(currency), Some(base)) = (&holding.currency, &ctx.config.base_currency) else {
        return Some(value);
    };
    if currency == base {
        return Some(value);
    }
    match ctx.conversion_rates.get(currency) {
        Some(rate) => Some(value * rate),
        None => {
            log::warn!("no conversion rate for {}, using unconverted value", currency);
            Some(value)
        }
    }
}

/// Supplied totals win; the document's own summary total is the fallback.
fn resolve_expected_total(ctx: &ReconcileContext<'_>) -> (Option<f64>, f64) {
    if let Some(expected) = ctx.expected {
        return (Some(expected.overall_total), expected.tolerance);
    }
    let from_summary = ctx
        .summary_totals
        .iter()
        .map(|t| t.amount)
        .filter(|a| *a > 0.0)
        .fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.max(a))));
    (from_summary, ctx.config.tolerance_band)
}

fn compare_asset_classes(ctx: &ReconcileContext<'_>) -> Vec<AssetClassDeviation> {
    let Some(expected) = ctx.expected else {
        return Vec::new();
    };
    let Some(class_totals) = &expected.asset_class_totals else {
        return Vec::new();
    };

    class_totals
        .iter()
        .map(|class| {
            let name_lower = class.name.to_lowercase();
            let extracted = ctx
                .summary_totals
                .iter()
                .find(|t| t.label.to_lowercase().contains(&name_lower))
                .map(|t| t.amount)
                .unwrap_or(0.0);
            let deviation = if class.total > 0.0 {
                (extracted - class.total).abs() / class.total
            } else {
                1.0
            };
            AssetClassDeviation {
                name: class.name.clone(),
                expected: class.total,
                extracted,
                deviation,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(identifier: &str, value: Option<f64>, confidence: f64) -> HoldingRecord {
        HoldingRecord {
            identifier: identifier.to_string(),
            name: None,
            quantity: None,
            price: None,
            currency: Some("CHF".to_string()),
            market_value: value,
            confidence,
            corrected: false,
            original_market_value: None,
        }
    }

    fn ctx<'a>(
        config: &'a PipelineConfig,
        expected: Option<&'a ExpectedTotals>,
    ) -> ReconcileContext<'a> {
        static EMPTY_RATES: once_cell::sync::Lazy<HashMap<String, f64>> =
            once_cell::sync::Lazy::new(HashMap::new);
        ReconcileContext {
            config,
            expected,
            summary_totals: &[],
            conversion_rates: &EMPTY_RATES,
            correction_rules: &[],
            statement_date: None,
        }
    }

    #[test]
    fn test_dedup_keeps_higher_confidence() {
        let config = PipelineConfig::default();
        let holdings = vec![
            holding("XS2530201644", Some(100_000.0), 0.4),
            holding("XS2530201644", Some(199_080.0), 0.8),
        ];
        let (result, report) = reconcile(holdings, &ctx(&config, None), Vec::new());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 0.8);
        assert_eq!(result[0].market_value, Some(199_080.0));
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].reason, UnresolvedReason::DuplicateIdentifier);
    }

    #[test]
    fn test_proportional_scaling_inside_eligible_range() {
        let config = PipelineConfig::default();
        let expected = ExpectedTotals {
            overall_total: 19_464_431.0,
            asset_class_totals: None,
            tolerance: 0.02,
        };
        let holdings = vec![
            holding("XS2530201644", Some(4_000_000.0), 0.8),
            holding("CH0038863350", Some(5_000_000.0), 0.7),
        ];
        let (result, report) = reconcile(holdings, &ctx(&config, Some(&expected)), Vec::new());

        // ratio 9M / 19,464,431 = 0.46, inside [0.3, 2.0]
        let factor = 19_464_431.0 / 9_000_000.0;
        for h in &result {
            assert!(h.corrected);
            let original = h.original_market_value.unwrap();
            let scaled = h.market_value.unwrap();
            assert!((scaled / original - factor).abs() < 1e-9);
        }
        assert_eq!(report.corrections_applied.len(), 2);
        assert_eq!(report.holdings_count, 2);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn test_unreconciled_outside_eligible_range() {
        let config = PipelineConfig::default();
        let expected = ExpectedTotals {
            overall_total: 19_464_431.0,
            asset_class_totals: None,
            tolerance: 0.02,
        };
        let holdings = vec![holding("XS2530201644", Some(1_000_000.0), 0.8)];
        let (result, report) = reconcile(holdings, &ctx(&config, Some(&expected)), Vec::new());

        // ratio 0.051 is outside [0.3, 2.0]: values stay untouched.
        assert!(!result[0].corrected);
        assert_eq!(result[0].market_value, Some(1_000_000.0));
        let dev = report.deviation.unwrap();
        assert!((dev - 0.949).abs() < 0.001);
        assert!(report
            .unresolved
            .iter()
            .any(|u| u.reason == UnresolvedReason::UnreconciledTotal));
        assert!(report.corrections_applied.is_empty());
    }

    #[test]
    fn test_within_tolerance_leaves_values_alone() {
        let config = PipelineConfig::default();
        let expected = ExpectedTotals {
            overall_total: 1_000_000.0,
            asset_class_totals: None,
            tolerance: 0.02,
        };
        let holdings = vec![holding("XS2530201644", Some(995_000.0), 0.9)];
        let (result, report) = reconcile(holdings, &ctx(&config, Some(&expected)), Vec::new());

        assert!(!result[0].corrected);
        assert!(report.corrections_applied.is_empty());
        assert!(report.deviation.unwrap() < 0.02);
    }

    #[test]
    fn test_external_correction_rule() {
        let config = PipelineConfig::default();
        let rules = vec![CorrectionRule {
            identifier: "XS2530201644".to_string(),
            expected_value: 199_080.0,
        }];
        let rates = HashMap::new();
        let context = ReconcileContext {
            config: &config,
            expected: None,
            summary_totals: &[],
            conversion_rates: &rates,
            correction_rules: &rules,
            statement_date: None,
        };
        let holdings = vec![holding("XS2530201644", Some(123.0), 0.5)];
        let (result, report) = reconcile(holdings, &context, Vec::new());

        assert_eq!(result[0].market_value, Some(199_080.0));
        assert_eq!(result[0].original_market_value, Some(123.0));
        assert!(result[0].corrected);
        assert_eq!(report.corrections_applied[0].rule, "externalRule");
    }

    #[test]
    fn test_conversion_rates_applied_to_total() {
        let config = PipelineConfig {
            base_currency: Some("CHF".to_string()),
            ..Default::default()
        };
        let mut rates = HashMap::new();
        rates.insert("USD".to_string(), 0.9);
        let mut usd_holding = holding("US0378331005", Some(1_000.0), 0.9);
        usd_holding.currency = Some("USD".to_string());
        let holdings = vec![holding("XS2530201644", Some(500.0), 0.9), usd_holding];
        let context = ReconcileContext {
            config: &config,
            expected: None,
            summary_totals: &[],
            conversion_rates: &rates,
            correction_rules: &[],
            statement_date: None,
        };
        let (_, report) = reconcile(holdings, &context, Vec::new());

        assert_eq!(report.extracted_total, 500.0 + 900.0);
    }

    #[test]
    fn test_summary_total_fallback() {
        let config = PipelineConfig::default();
        let summary = vec![
            SummaryTotal {
                label: "Total Obligationen CHF".to_string(),
                amount: 199_080.0,
                line: 10,
            },
            SummaryTotal {
                label: "Total Portfolio CHF".to_string(),
                amount: 200_000.0,
                line: 12,
            },
        ];
        let rates = HashMap::new();
        let context = ReconcileContext {
            config: &config,
            expected: None,
            summary_totals: &summary,
            conversion_rates: &rates,
            correction_rules: &[],
            statement_date: None,
        };
        let holdings = vec![holding("XS2530201644", Some(199_080.0), 0.9)];
        let (_, report) = reconcile(holdings, &context, Vec::new());

        // Largest summary amount serves as the expected total.
        assert_eq!(report.expected_total, Some(200_000.0));
        assert!(report.deviation.is_some());
    }

    #[test]
    fn test_asset_class_deviations() {
        let config = PipelineConfig::default();
        let expected = ExpectedTotals {
            overall_total: 200_000.0,
            asset_class_totals: Some(vec![
                crate::models::AssetClassTotal {
                    name: "Obligationen".to_string(),
                    total: 199_080.0,
                },
                crate::models::AssetClassTotal {
                    name: "Aktien".to_string(),
                    total: 920.0,
                },
            ]),
            tolerance: 0.02,
        };
        let summary = vec![SummaryTotal {
            label: "Total Obligationen CHF".to_string(),
            amount: 199_080.0,
            line: 10,
        }];
        let rates = HashMap::new();
        let context = ReconcileContext {
            config: &config,
            expected: Some(&expected),
            summary_totals: &summary,
            conversion_rates: &rates,
            correction_rules: &[],
            statement_date: None,
        };
        let holdings = vec![holding("XS2530201644", Some(200_000.0), 0.9)];
        let (_, report) = reconcile(holdings, &context, Vec::new());

        assert_eq!(report.asset_class_deviations.len(), 2);
        assert_eq!(report.asset_class_deviations[0].deviation, 0.0);
        // Unmatched class reports full deviation.
        assert_eq!(report.asset_class_deviations[1].extracted, 0.0);
        assert_eq!(report.asset_class_deviations[1].deviation, 1.0);
    }

    #[test]
    fn test_reconciler_never_changes_count() {
        let config = PipelineConfig::default();
        let expected = ExpectedTotals {
            overall_total: 19_464_431.0,
            asset_class_totals: None,
            tolerance: 0.02,
        };
        let holdings = vec![
            holding("XS2530201644", Some(4_000_000.0), 0.8),
            holding("CH0038863350", Some(5_000_000.0), 0.7),
            holding("US0378331005", None, 0.2),
        ];
        let (result, report) = reconcile(holdings, &ctx(&config, Some(&expected)), Vec::new());
        assert_eq!(result.len(), 3);
        assert_eq!(report.holdings_count, 3);
    }
}
