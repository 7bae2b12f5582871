//! Entity extraction.
//!
//! For each validated identifier anchor inside a holdings region, builds a
//! bounded context window of surrounding lines and collects raw field
//! candidates: a name segment, explicit currency codes, and every numeric
//! token tagged with its column-role hint where one is inferable.

pub mod isin;

use crate::config::PipelineConfig;
use crate::models::{
    FieldCandidate, FieldKind, LineRole, MatchStrength, Provenance, RawDocument, TableKind,
    TableRegion, UnresolvedEntry, UnresolvedReason,
};
use crate::structure;
use once_cell::sync::Lazy;
use regex::Regex;

/// Line fragments that disqualify a segment as a security name.
const NON_NAME_MARKERS: &[&str] = &[
    "isin",
    "valor",
    "valorennummer",
    "referenz",
    "reference",
    "kontonummer",
    "account",
    "depot",
    "seite",
    "page",
];

/// Window fragments suggesting the instrument is priced as percentage of par.
const BOND_MARKERS: &[&str] = &[
    "notes", "bond", "bonds", "obligation", "obligationen", "anleihe", "vrn", "frn", "reg-s", "%",
];

static RE_DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}\.\d{2,4}$").unwrap());

/// A numeric token awaiting field assignment by the disambiguator.
#[derive(Debug, Clone)]
pub struct NumericRun {
    pub raw: String,
    pub line: usize,
    pub hint: Option<FieldKind>,
    pub currency_on_line: bool,
}

/// One identifier anchor with everything gathered from its context window.
#[derive(Debug, Clone)]
pub struct AnchorContext {
    pub identifier: String,
    pub anchor_line: usize,
    pub window: (usize, usize),
    pub bond_context: bool,
    /// Name and currency candidates; numeric fields arrive via the
    /// disambiguator.
    pub candidates: Vec<FieldCandidate>,
    pub numeric_runs: Vec<NumericRun>,
}

/// Extract anchors and their raw candidates from all holdings regions.
pub fn extract(
    doc: &RawDocument,
    regions: &[TableRegion],
    config: &PipelineConfig,
) -> (Vec<AnchorContext>, Vec<UnresolvedEntry>) {
    let mut anchors = Vec::new();
    let mut unresolved = Vec::new();

    for region in regions {
        if region.kind != TableKind::Holdings {
            continue;
        }
        for line_index in region.start_line..=region.end_line {
            let Some(line) = doc.line(line_index) else {
                continue;
            };
            for (offset, token) in isin::identifier_shapes(&line.text) {
                if !isin::validate_checksum(&token) {
                    log::warn!("identifier {} fails checksum validation", token);
                    unresolved.push(UnresolvedEntry {
                        identifier: token,
                        reason: UnresolvedReason::MalformedIdentifier,
                        detail: Some(format!("checksum failed at line {}", line_index)),
                    });
                    continue;
                }
                anchors.push(build_anchor(doc, region, config, line_index, offset, token));
            }
        }
    }

    log::debug!("extract: {} anchors, {} malformed", anchors.len(), unresolved.len());
    (anchors, unresolved)
}

fn build_anchor(
    doc: &RawDocument,
    region: &TableRegion,
    config: &PipelineConfig,
    anchor_line: usize,
    anchor_offset: usize,
    identifier: String,
) -> AnchorContext {
    let radius = config.context_window_radius;
    let start = anchor_line.saturating_sub(radius);
    let end = (anchor_line + radius).min(doc.lines.len().saturating_sub(1));

    let mut candidates = Vec::new();
    let mut numeric_runs = Vec::new();
    let mut bond_context = false;

    if let Some(name) = name_candidate(doc, anchor_line, anchor_offset, start) {
        candidates.push(name);
    }

    let numeric_hints = region.numeric_hints();

    for line_index in start..=end {
        let Some(line) = doc.line(line_index) else {
            continue;
        };
        // Total/summary lines inside the window would leak aggregate amounts
        // into the per-holding candidate set.
        if structure::is_summary_line(&line.text) {
            continue;
        }
        let lower = line.text.to_lowercase();
        if BOND_MARKERS.iter().any(|m| lower.contains(m)) {
            bond_context = true;
        }

        let currency_on_line = doc
            .currency_tags
            .iter()
            .any(|(idx, _)| *idx == line_index);

        for (_, code) in doc.currency_tags.iter().filter(|(idx, _)| *idx == line_index) {
            candidates.push(FieldCandidate {
                field: FieldKind::Currency,
                raw: code.clone(),
                value: None,
                confidence: 0.0,
                strength: MatchStrength::Heuristic,
                provenance: Provenance {
                    line: line_index,
                    rule: "currency_code",
                },
                currency_corroborated: true,
            });
        }

        let tokens: Vec<&str> = line
            .text
            .split(' ')
            .filter(|t| structure::is_numeric_token(t) && !RE_DATE_TOKEN.is_match(t))
            .collect();

        // Positional correspondence is only inferable when the row has exactly
        // as many numeric tokens as the header has numeric columns.
        let positional = tokens.len() == numeric_hints.len() && !numeric_hints.is_empty();

        for (pos, token) in tokens.iter().enumerate() {
            numeric_runs.push(NumericRun {
                raw: (*token).to_string(),
                line: line_index,
                hint: if positional { Some(numeric_hints[pos]) } else { None },
                currency_on_line,
            });
        }
    }

    AnchorContext {
        identifier,
        anchor_line,
        window: (start, end),
        bond_context,
        candidates,
        numeric_runs,
    }
}

/// The longest segment preceding the identifier that is not numeric-only and
/// not a known non-name marker line.
fn name_candidate(
    doc: &RawDocument,
    anchor_line: usize,
    anchor_offset: usize,
    window_start: usize,
) -> Option<FieldCandidate> {
    let mut best: Option<(usize, String)> = None;

    for line_index in window_start..=anchor_line {
        let Some(line) = doc.line(line_index) else {
            continue;
        };
        if line.role == LineRole::Header || structure::is_summary_line(&line.text) {
            continue;
        }
        let segment = if line_index == anchor_line {
            line.text[..anchor_offset].trim()
        } else {
            line.text.as_str()
        };
        if segment.is_empty() || !is_name_like(segment) {
            continue;
        }
        let replace = match &best {
            Some((len, _)) => segment.len() > *len,
            None => true,
        };
        if replace {
            best = Some((segment.len(), segment.to_string()));
        }
    }

    best.map(|(_, raw)| {
        let line = raw_source_line(doc, &raw, window_start, anchor_line).unwrap_or(anchor_line);
        FieldCandidate {
            field: FieldKind::Name,
            raw,
            value: None,
            confidence: 0.0,
            strength: MatchStrength::Heuristic,
            provenance: Provenance {
                line,
                rule: "longest_preceding_segment",
            },
            currency_corroborated: false,
        }
    })
}

fn raw_source_line(
    doc: &RawDocument,
    raw: &str,
    start: usize,
    end: usize,
) -> Option<usize> {
    (start..=end).find(|&i| doc.line(i).map(|l| l.text.contains(raw)).unwrap_or(false))
}

fn is_name_like(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    if NON_NAME_MARKERS.iter().any(|m| lower.starts_with(m)) {
        return false;
    }
    // Numeric-only segments (numbers plus currency codes) are not names.
    segment.split(' ').any(|t| {
        !structure::is_numeric_token(t)
            && !crate::normalize::CURRENCY_CODES.contains(&t)
            && t.chars().any(|c| c.is_alphabetic())
    })
}
