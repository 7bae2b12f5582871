//! Pipeline orchestration.
//!
//! Runs the stages in order for one document: normalize, analyze structure,
//! extract entities, disambiguate numerics, score, reconcile. Documents are
//! independent; `run_batch` fans them out over a worker pool sized to the
//! available CPU cores while each document stays sequential inside.

use crate::config::PipelineConfig;
use crate::disambiguate;
use crate::error::PipelineError;
use crate::extract::{self, AnchorContext};
use crate::models::{DocumentInput, FieldKind, HoldingRecord, PipelineOutput};
use crate::normalize;
use crate::reconcile::{self, ReconcileContext};
use crate::scoring::{self, ScoredAnchor};
use crate::structure;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One configured extraction pipeline. Cheap to clone; holds no per-document
/// state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline on one document.
    ///
    /// Always returns a best-effort result plus diagnostics; the only failures
    /// are invalid input shapes.
    pub fn run(&self, input: &DocumentInput) -> Result<PipelineOutput, PipelineError> {
        validate_input(input)?;

        let document_id = input.document_id.as_deref().unwrap_or("<unnamed>");
        log::info!("processing document {}", document_id);

        let mut doc = normalize::normalize(&input.text);
        if doc.likely_non_financial {
            log::warn!("{}: likely non-financial input", document_id);
        }

        let regions = structure::analyze(&mut doc);
        let summary = structure::summary_totals(&doc);
        let expected_value = input.expected_totals.as_ref().map(|t| t.overall_total);

        let (anchors, mut unresolved) = extract::extract(&doc, &regions, &self.config);

        let mut holdings = Vec::with_capacity(anchors.len());
        for anchor in &anchors {
            let (mut candidates, ambiguous) =
                disambiguate::disambiguate(anchor, &self.config, expected_value);
            unresolved.extend(ambiguous);
            candidates.extend(anchor.candidates.iter().cloned());

            let (scored, out_of_range) = scoring::score(
                &anchor.identifier,
                anchor.anchor_line,
                candidates,
                &self.config,
                expected_value,
            );
            unresolved.extend(out_of_range);
            holdings.push(build_record(anchor, scored));
        }

        let ctx = ReconcileContext {
            config: &self.config,
            expected: input.expected_totals.as_ref(),
            summary_totals: &summary,
            conversion_rates: &input.conversion_rates,
            correction_rules: &input.correction_rules,
            statement_date: doc.statement_date,
        };
        let (holdings, validation) = reconcile::reconcile(holdings, &ctx, unresolved);

        log::info!(
            "{}: {} holdings, extracted total {:.2}",
            document_id,
            validation.holdings_count,
            validation.extracted_total
        );

        Ok(PipelineOutput {
            holdings,
            validation,
        })
    }
}

/// Process documents concurrently on a pool bounded to the CPU core count.
/// Results come back in input order.
pub async fn run_batch(
    config: &PipelineConfig,
    inputs: Vec<DocumentInput>,
) -> Vec<Result<PipelineOutput, PipelineError>> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let semaphore = Arc::new(Semaphore::new(workers));

    let mut handles = Vec::with_capacity(inputs.len());
    for input in inputs {
        let semaphore = semaphore.clone();
        let pipeline = Pipeline::new(config.clone());
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("batch semaphore closed");
            tokio::task::spawn_blocking(move || pipeline.run(&input))
                .await
                .expect("pipeline worker panicked")
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("batch task panicked"));
    }
    results
}

/// Fatal input-shape validation; everything else is recoverable.
fn validate_input(input: &DocumentInput) -> Result<(), PipelineError> {
    if let Some(expected) = &input.expected_totals {
        if expected.overall_total <= 0.0 {
            return Err(PipelineError::NonPositiveExpectedTotal(expected.overall_total));
        }
        if expected.tolerance <= 0.0 {
            return Err(PipelineError::NonPositiveTolerance(expected.tolerance));
        }
        if let Some(class_totals) = &expected.asset_class_totals {
            for class in class_totals {
                if class.total <= 0.0 {
                    return Err(PipelineError::NonPositiveAssetClassTotal {
                        name: class.name.clone(),
                        total: class.total,
                    });
                }
            }
        }
    }
    for (currency, rate) in &input.conversion_rates {
        if *rate <= 0.0 {
            return Err(PipelineError::NonPositiveConversionRate {
                currency: currency.clone(),
                rate: *rate,
            });
        }
    }
    for rule in &input.correction_rules {
        if rule.expected_value <= 0.0 {
            return Err(PipelineError::NonPositiveCorrectionValue {
                identifier: rule.identifier.clone(),
                value: rule.expected_value,
            });
        }
    }
    Ok(())
}

fn build_record(anchor: &AnchorContext, scored: ScoredAnchor) -> HoldingRecord {
    let mut winners = scored.winners;
    HoldingRecord {
        identifier: anchor.identifier.clone(),
        name: winners.remove(&FieldKind::Name).map(|c| c.raw),
        quantity: winners.remove(&FieldKind::Quantity).and_then(|c| c.value),
        price: winners.remove(&FieldKind::Price).and_then(|c| c.value),
        currency: winners.remove(&FieldKind::Currency).map(|c| c.raw),
        market_value: winners.remove(&FieldKind::MarketValue).and_then(|c| c.value),
        confidence: scored.overall,
        corrected: false,
        original_market_value: None,
    }
}
