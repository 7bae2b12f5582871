//! Fatal pipeline errors.
//!
//! Only invalid input shapes abort a run. Everything recoverable (malformed
//! identifiers, ambiguous numeric runs, out-of-range values) is recorded in the
//! ValidationReport instead of being thrown.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("expected totals invalid: overall total must be positive, got {0}")]
    NonPositiveExpectedTotal(f64),

    #[error("expected totals invalid: tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),

    #[error("expected totals invalid: asset class '{name}' total must be positive, got {total}")]
    NonPositiveAssetClassTotal { name: String, total: f64 },

    #[error("conversion rate for {currency} must be positive, got {rate}")]
    NonPositiveConversionRate { currency: String, rate: f64 },

    #[error("correction rule for {identifier} must carry a positive expected value, got {value}")]
    NonPositiveCorrectionValue { identifier: String, value: f64 },
}
