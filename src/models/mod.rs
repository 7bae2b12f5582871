//! Core data model for the extraction pipeline.
//!
//! Everything that crosses the output contract derives camelCase serde names;
//! intermediate pipeline types (line records, table regions, field candidates)
//! stay internal but serialize the same way for diagnostics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role assigned to a line by the structure analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Header,
    Row,
    Blank,
    Other,
}

/// One line of the normalized document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    pub index: usize,
    pub text: String,
    pub role: LineRole,
}

/// Normalized document: canonical text plus per-line records.
///
/// Immutable after normalization, except for the role tags the structure
/// analyzer assigns in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    pub lines: Vec<LineRecord>,
    /// Currency codes found inline: (line index, ISO code).
    pub currency_tags: Vec<(usize, String)>,
    /// Set when the text contains no numeric and no identifier-shaped token
    /// anywhere; the caller decides whether to abort.
    pub likely_non_financial: bool,
    /// Statement as-of date when the document carries one.
    pub statement_date: Option<NaiveDate>,
}

impl RawDocument {
    pub fn line(&self, index: usize) -> Option<&LineRecord> {
        self.lines.get(index)
    }
}

/// Classified type of a detected table region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Holdings,
    Summary,
    Unknown,
}

/// Semantic field a candidate can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Identifier,
    Name,
    Quantity,
    Price,
    MarketValue,
    Currency,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Name => "name",
            Self::Quantity => "quantity",
            Self::Price => "price",
            Self::MarketValue => "marketValue",
            Self::Currency => "currency",
        }
    }
}

/// Column-role hint discovered in a table header line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHint {
    pub field: FieldKind,
    /// The keyword that matched, lowercased.
    pub keyword: String,
    /// Character offset of the keyword in the header line; hints are ordered by
    /// this left-to-right position.
    pub position: usize,
}

/// A contiguous table-like line range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRegion {
    pub start_line: usize,
    pub end_line: usize,
    pub kind: TableKind,
    pub column_hints: Vec<ColumnHint>,
}

impl TableRegion {
    pub fn contains(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Column hints for numeric fields only, in left-to-right header order.
    pub fn numeric_hints(&self) -> Vec<FieldKind> {
        self.column_hints
            .iter()
            .filter(|h| {
                matches!(
                    h.field,
                    FieldKind::Quantity | FieldKind::Price | FieldKind::MarketValue
                )
            })
            .map(|h| h.field)
            .collect()
    }
}

/// A labeled total found in a summary region (e.g. "Total Bonds 4'570'000").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotal {
    pub label: String,
    pub amount: f64,
    pub line: usize,
}

/// Which rule produced a candidate, and from which line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub line: usize,
    pub rule: &'static str,
}

/// Strength class of the rule that produced a value; feeds the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    /// Exact format-template match.
    Template,
    /// Column-role hint from the governing header.
    ColumnHint,
    /// Fallback heuristic.
    Heuristic,
    /// Arithmetically derived, not extracted.
    Derived,
}

/// One proposed value for one semantic field of one anchor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCandidate {
    pub field: FieldKind,
    pub raw: String,
    pub value: Option<f64>,
    pub confidence: f64,
    pub strength: MatchStrength,
    pub provenance: Provenance,
    /// An explicit currency token sat on the same line.
    pub currency_corroborated: bool,
}

/// The resolved holding entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRecord {
    pub identifier: String,
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub market_value: Option<f64>,
    pub confidence: f64,
    pub corrected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_market_value: Option<f64>,
}

/// Expected per-asset-class subtotal, externally supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetClassTotal {
    pub name: String,
    pub total: f64,
}

/// Externally supplied aggregate totals the reconciler checks against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTotals {
    pub overall_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_class_totals: Option<Vec<AssetClassTotal>>,
    pub tolerance: f64,
}

/// Document-specific override: this identifier is known to carry this value.
/// Replaces the hardcoded per-document lookup tables of older extractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRule {
    pub identifier: String,
    pub expected_value: f64,
}

/// Why a holding (or the whole run) failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedReason {
    MalformedIdentifier,
    AmbiguousNumericRun,
    OutOfRangeValue,
    UnreconciledTotal,
    DuplicateIdentifier,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier => "malformedIdentifier",
            Self::AmbiguousNumericRun => "ambiguousNumericRun",
            Self::OutOfRangeValue => "outOfRangeValue",
            Self::UnreconciledTotal => "unreconciledTotal",
            Self::DuplicateIdentifier => "duplicateIdentifier",
        }
    }
}

/// One entry in the report's unresolved list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedEntry {
    /// Offending identifier; empty for document-level conditions.
    pub identifier: String,
    pub reason: UnresolvedReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One correction the reconciler applied, with the pre-correction value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionEntry {
    pub identifier: String,
    pub original: f64,
    pub corrected: f64,
    /// "proportionalScaling" or "externalRule".
    pub rule: String,
}

/// Deviation of a supplied asset-class total from the document's own summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetClassDeviation {
    pub name: String,
    pub expected: f64,
    pub extracted: f64,
    pub deviation: f64,
}

/// Per-run validation output. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub holdings_count: usize,
    pub extracted_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<f64>,
    pub corrections_applied: Vec<CorrectionEntry>,
    pub unresolved: Vec<UnresolvedEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub asset_class_deviations: Vec<AssetClassDeviation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_date: Option<NaiveDate>,
}

/// Full pipeline output: the §6 output contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub holdings: Vec<HoldingRecord>,
    pub validation: ValidationReport,
}

/// Everything the caller supplies for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub text: String,
    /// Used for logging only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_totals: Option<ExpectedTotals>,
    /// Currency -> rate into the reconciliation base currency.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub conversion_rates: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correction_rules: Vec<CorrectionRule>,
}

impl DocumentInput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}
