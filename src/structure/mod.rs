//! Table structure analysis.
//!
//! Scans the normalized document for table-like regions: header lines matched
//! against declarative lexical signatures, row extents, and a coarse region
//! type (holdings vs. summary). Column-role hints recorded from header lines
//! drive field assignment downstream.

use crate::extract::isin;
use crate::models::{
    ColumnHint, FieldKind, LineRole, RawDocument, SummaryTotal, TableKind, TableRegion,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lexical header signatures per field, German and English. Longer keywords
/// win when matches overlap (e.g. "kurswert" over "kurs").
const HEADER_KEYWORDS: &[(FieldKind, &[&str])] = &[
    (
        FieldKind::Name,
        &["bezeichnung", "description", "wertpapier", "security", "instrument"],
    ),
    (FieldKind::Currency, &["währung", "whrg", "currency", "ccy"]),
    (
        FieldKind::Quantity,
        &["anzahl", "stück", "nominal", "quantity", "units", "menge"],
    ),
    (FieldKind::Price, &["kurs", "price", "preis"]),
    (
        FieldKind::MarketValue,
        &["kurswert", "marktwert", "market value", "valuation", "bewertung", "value"],
    ),
];

/// Keywords that mark a total/summary line and close the current region.
const TOTAL_KEYWORDS: &[&str] = &[
    "total", "summe", "gesamtwert", "gesamt", "subtotal", "zwischensumme", "übertrag",
];

/// Gap lines (wrapped text) tolerated inside a region before it closes.
const MAX_ROW_GAP: usize = 2;

static RE_NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d[\d.,']*$").unwrap());

/// A line carries at least one numeric token.
pub fn has_numeric_token(text: &str) -> bool {
    text.split(' ').any(|t| RE_NUMERIC_TOKEN.is_match(t))
}

pub fn is_numeric_token(token: &str) -> bool {
    RE_NUMERIC_TOKEN.is_match(token)
}

/// Match header keywords in a line; returns column hints ordered left to right.
fn detect_header(text: &str) -> Vec<ColumnHint> {
    let lower = text.to_lowercase();

    // Collect every keyword occurrence, then resolve overlaps by preferring
    // the longer keyword at the same span.
    let mut matches: Vec<(usize, usize, FieldKind, &str)> = Vec::new();
    for (field, keywords) in HEADER_KEYWORDS {
        for &kw in *keywords {
            let mut from = 0;
            while let Some(pos) = lower[from..].find(kw) {
                let start = from + pos;
                matches.push((start, kw.len(), *field, kw));
                from = start + 1;
            }
        }
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut hints: Vec<ColumnHint> = Vec::new();
    let mut covered_until = 0;
    for (start, len, field, kw) in matches {
        if start < covered_until {
            continue;
        }
        if hints.iter().any(|h| h.field == field) {
            continue;
        }
        hints.push(ColumnHint {
            field,
            keyword: kw.to_string(),
            position: start,
        });
        covered_until = start + len;
    }
    hints
}

/// A line carrying a total/summary signature.
pub fn is_summary_line(text: &str) -> bool {
    let lower = text.to_lowercase();
    TOTAL_KEYWORDS.iter().any(|kw| {
        lower
            .split(|c: char| !c.is_alphabetic())
            .any(|w| w == *kw)
    })
}

struct RegionBuilder {
    start: usize,
    last_row: usize,
    hints: Vec<ColumnHint>,
    row_count: usize,
    identifier_rows: usize,
    gap: usize,
    has_header: bool,
}

impl RegionBuilder {
    fn into_region(self) -> Option<TableRegion> {
        if self.row_count == 0 {
            return None;
        }
        let kind = if self.identifier_rows > 0 {
            TableKind::Holdings
        } else if self.has_header {
            TableKind::Summary
        } else {
            TableKind::Unknown
        };
        Some(TableRegion {
            start_line: self.start,
            end_line: self.last_row,
            kind,
            column_hints: self.hints,
        })
    }
}

/// Detect table regions and assign line roles in place.
///
/// A header starts a region; rows extend it; a blank line, a new header, or a
/// total/summary line ends it. Identifier rows encountered without a governing
/// header still open a (hint-less) region, so statements with unrecognized
/// header wording degrade instead of vanishing. Overlapping headers: the later
/// one wins and governs subsequent rows.
pub fn analyze(doc: &mut RawDocument) -> Vec<TableRegion> {
    let mut regions: Vec<TableRegion> = Vec::new();
    let mut current: Option<RegionBuilder> = None;

    let line_count = doc.lines.len();
    for i in 0..line_count {
        let text = doc.lines[i].text.clone();

        if text.is_empty() {
            doc.lines[i].role = LineRole::Blank;
            if let Some(b) = current.take() {
                regions.extend(b.into_region());
            }
            continue;
        }

        let hints = detect_header(&text);
        if hints.len() >= 2 && !has_numeric_token(&text) {
            doc.lines[i].role = LineRole::Header;
            if let Some(b) = current.take() {
                regions.extend(b.into_region());
            }
            current = Some(RegionBuilder {
                start: i,
                last_row: i,
                hints,
                row_count: 0,
                identifier_rows: 0,
                gap: 0,
                has_header: true,
            });
            continue;
        }

        if is_summary_line(&text) {
            // Total line: closes the region; the amount itself is picked up by
            // summary_totals().
            doc.lines[i].role = if has_numeric_token(&text) {
                LineRole::Row
            } else {
                LineRole::Other
            };
            if let Some(b) = current.take() {
                regions.extend(b.into_region());
            }
            continue;
        }

        if has_numeric_token(&text) {
            doc.lines[i].role = LineRole::Row;
            let has_identifier = isin::contains_identifier_shape(&text);
            match current.as_mut() {
                Some(b) => {
                    b.last_row = i;
                    b.row_count += 1;
                    b.gap = 0;
                    if has_identifier {
                        b.identifier_rows += 1;
                    }
                }
                None if has_identifier => {
                    // Headerless run: only an identifier row opens one, so
                    // stray numerals in prose don't spawn noise regions.
                    current = Some(RegionBuilder {
                        start: i,
                        last_row: i,
                        hints: Vec::new(),
                        row_count: 1,
                        identifier_rows: 1,
                        gap: 0,
                        has_header: false,
                    });
                }
                None => {}
            }
            continue;
        }

        doc.lines[i].role = LineRole::Other;
        let mut close_region = false;
        if let Some(b) = current.as_mut() {
            // Wrapped text between rows; identifiers on such lines still count
            // toward the region so multi-line entries classify correctly.
            if isin::contains_identifier_shape(&text) {
                b.identifier_rows += 1;
                b.last_row = i;
                b.gap = 0;
            } else {
                b.gap += 1;
                close_region = b.gap > MAX_ROW_GAP;
            }
        }
        if close_region {
            if let Some(b) = current.take() {
                regions.extend(b.into_region());
            }
        }
    }

    if let Some(b) = current.take() {
        regions.extend(b.into_region());
    }

    log::debug!(
        "structure: {} regions ({} holdings)",
        regions.len(),
        regions.iter().filter(|r| r.kind == TableKind::Holdings).count()
    );

    regions
}

/// Collect labeled totals from total/summary lines for expected-total fallback
/// and asset-class comparison.
pub fn summary_totals(doc: &RawDocument) -> Vec<SummaryTotal> {
    let mut totals = Vec::new();
    for line in &doc.lines {
        if !is_summary_line(&line.text) || !has_numeric_token(&line.text) {
            continue;
        }
        // Label = everything before the first numeric token; amount = the
        // largest numeric token on the line (totals dwarf percent columns).
        let mut label_parts = Vec::new();
        let mut amount: Option<f64> = None;
        for token in line.text.split(' ') {
            if is_numeric_token(token) {
                if let Ok(v) = token.parse::<f64>() {
                    amount = Some(amount.map_or(v, |a: f64| a.max(v)));
                }
            } else if amount.is_none() {
                label_parts.push(token);
            }
        }
        if let Some(amount) = amount {
            totals.push(SummaryTotal {
                label: label_parts.join(" "),
                amount,
                line: line.index,
            });
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    const STATEMENT: &str = "\
Vermögensausweis per 31.12.2023

Bezeichnung Währung Anzahl Kurs Kurswert
TORONTO DOMINION BANK NOTES CHF 200000 99.5400 199080
ISIN XS2530201644
NESTLE SA REG SHS CHF 100 102.50 10250
ISIN CH0038863350

Total Obligationen CHF 199080
";

    #[test]
    fn test_header_detection() {
        let hints = detect_header("Bezeichnung Währung Anzahl Kurs Kurswert");
        assert_eq!(hints.len(), 5);
        assert_eq!(hints[0].field, FieldKind::Name);
        assert_eq!(hints[1].field, FieldKind::Currency);
        assert_eq!(hints[2].field, FieldKind::Quantity);
        assert_eq!(hints[3].field, FieldKind::Price);
        assert_eq!(hints[4].field, FieldKind::MarketValue);
    }

    #[test]
    fn test_kurswert_not_shadowed_by_kurs() {
        let hints = detect_header("Kurswert Währung");
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].field, FieldKind::MarketValue);
        assert_eq!(hints[0].keyword, "kurswert");
    }

    #[test]
    fn test_region_detection() {
        let mut doc = normalize(STATEMENT);
        let regions = analyze(&mut doc);

        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.kind, TableKind::Holdings);
        assert_eq!(region.column_hints.len(), 5);
        assert!(region.contains(3));
        assert!(region.contains(6));
    }

    #[test]
    fn test_total_line_closes_region() {
        let mut doc = normalize(STATEMENT);
        let regions = analyze(&mut doc);
        // The total line sits outside the detected region.
        assert!(!regions[0].contains(8));
    }

    #[test]
    fn test_summary_region_without_identifiers() {
        let mut doc = normalize(
            "Bewertung Währung Value\nAktien CHF 5000\nObligationen CHF 7000\n",
        );
        let regions = analyze(&mut doc);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, TableKind::Summary);
    }

    #[test]
    fn test_headerless_rows_form_region() {
        let mut doc = normalize("XS2530201644 CHF 200000 99.5400 199080\n");
        let regions = analyze(&mut doc);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, TableKind::Holdings);
        assert!(regions[0].column_hints.is_empty());
    }

    #[test]
    fn test_later_header_governs() {
        let mut doc = normalize(
            "Bezeichnung Anzahl Kurs\nBezeichnung Währung Kurswert\nXS2530201644 CHF 199080\n",
        );
        let regions = analyze(&mut doc);
        assert_eq!(regions.len(), 1);
        assert!(regions[0]
            .column_hints
            .iter()
            .any(|h| h.field == FieldKind::MarketValue));
    }

    #[test]
    fn test_summary_totals() {
        let doc = normalize("Total Obligationen CHF 199'080\nTotal Portfolio CHF 19'464'431\n");
        let totals = summary_totals(&doc);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].label, "Total Obligationen CHF");
        assert_eq!(totals[0].amount, 199_080.0);
        assert_eq!(totals[1].amount, 19_464_431.0);
    }

    #[test]
    fn test_no_holdings_regions_in_prose() {
        let mut doc = normalize("Sehr geehrter Kunde\nbitte beachten Sie 3 Hinweise\n");
        let regions = analyze(&mut doc);
        assert!(regions.iter().all(|r| r.kind != TableKind::Holdings));
    }
}
