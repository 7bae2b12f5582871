//! Static pipeline configuration.
//!
//! Loaded once at process start and shared read-only across the worker pool;
//! nothing here is mutated after construction.

use serde::{Deserialize, Serialize};

/// Tunable knobs of the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Lines scanned around an identifier anchor.
    pub context_window_radius: usize,
    /// Relative deviation accepted before the reconciler intervenes.
    pub tolerance_band: f64,
    /// extracted/expected ratio band inside which proportional scaling is
    /// applied; outside it the run is flagged unreconciled instead.
    pub scaling_eligible_range: [f64; 2],
    /// Default plausible band for a single holding's market value, used when no
    /// expected total is available to derive tighter bounds.
    pub plausible_value_range: [f64; 2],
    /// Rough number of holdings a statement of this kind carries; sharpens the
    /// plausible band when an expected total is supplied.
    pub expected_holding_count: Option<usize>,
    /// Currency the reconciliation totals are expressed in.
    pub base_currency: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window_radius: 5,
            tolerance_band: 0.02,
            scaling_eligible_range: [0.3, 2.0],
            plausible_value_range: [0.01, 1_000_000_000.0],
            expected_holding_count: None,
            base_currency: None,
        }
    }
}

impl PipelineConfig {
    /// Plausible per-holding market value band.
    ///
    /// With an expected total and a holding count the band is two orders of
    /// magnitude around the average holding; otherwise the configured default.
    pub fn plausible_range(&self, expected_total: Option<f64>) -> [f64; 2] {
        match (expected_total, self.expected_holding_count) {
            (Some(total), Some(count)) if total > 0.0 && count > 0 => {
                let avg = total / count as f64;
                [avg / 100.0, avg * 100.0]
            }
            _ => self.plausible_value_range,
        }
    }

    pub fn is_plausible(&self, value: f64, expected_total: Option<f64>) -> bool {
        let [lo, hi] = self.plausible_range(expected_total);
        value >= lo && value <= hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.context_window_radius, 5);
        assert_eq!(cfg.tolerance_band, 0.02);
        assert_eq!(cfg.scaling_eligible_range, [0.3, 2.0]);
    }

    #[test]
    fn test_plausible_range_derived_from_expected_total() {
        let cfg = PipelineConfig {
            expected_holding_count: Some(20),
            ..Default::default()
        };
        // 20M portfolio / 20 holdings = 1M average, band 10k..100M
        let [lo, hi] = cfg.plausible_range(Some(20_000_000.0));
        assert_eq!(lo, 10_000.0);
        assert_eq!(hi, 100_000_000.0);
        assert!(cfg.is_plausible(199_080.0, Some(20_000_000.0)));
        assert!(!cfg.is_plausible(1.0, Some(20_000_000.0)));
    }

    #[test]
    fn test_plausible_range_falls_back_to_default() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.plausible_range(None), cfg.plausible_value_range);
        assert_eq!(cfg.plausible_range(Some(1_000_000.0)), cfg.plausible_value_range);
    }
}
