//! Text normalization.
//!
//! First pipeline stage: unifies line endings, collapses whitespace, rewrites
//! locale-grouped numerals (Swiss `200'000`, German `1.234,56`, US `1,234.56`)
//! into one canonical grouping-free form with a `.` decimal marker, and tags
//! inline currency codes. Pure transform, no side effects.

use crate::models::{LineRecord, LineRole, RawDocument};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Currency codes recognized inline. Statements outside this set still parse;
/// their values just lose the currency-corroboration bonus.
pub const CURRENCY_CODES: &[&str] = &[
    "CHF", "EUR", "USD", "GBP", "JPY", "CAD", "AUD", "SEK", "NOK", "DKK", "SGD", "HKD", "CNY",
    "PLN", "CZK", "HUF",
];

static RE_APOSTROPHE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)'(\d{3})\b").unwrap());
static RE_COMMA_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+$").unwrap());
static RE_US_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+\.\d{1,4}$").unwrap());
static RE_GERMAN_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+,\d{1,4}$").unwrap());
static RE_DOT_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3}){2,}$").unwrap());
static RE_COMMA_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+,\d{1,4}$").unwrap());
static RE_NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d[\d.,']*$").unwrap());
static RE_IDENTIFIER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}\d\b").unwrap());
static RE_STATEMENT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:per|stand(?:\s+per)?|as\s+of|stichtag|valuation\s+date)\s+(\d{1,2}\.\d{1,2}\.\d{4})")
        .unwrap()
});
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize raw statement text into a RawDocument.
pub fn normalize(text: &str) -> RawDocument {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines = Vec::new();
    let mut currency_tags = Vec::new();
    let mut has_financial_token = false;
    let mut statement_date = None;

    for (index, raw_line) in unified.split('\n').enumerate() {
        let collapsed = RE_WHITESPACE.replace_all(raw_line.trim(), " ").to_string();
        let canonical = canonicalize_line(&collapsed);

        for code in currency_codes_in(&canonical) {
            currency_tags.push((index, code));
        }

        if statement_date.is_none() {
            statement_date = capture_statement_date(&canonical);
        }

        if !has_financial_token {
            has_financial_token = canonical
                .split(' ')
                .any(|t| RE_NUMERIC_TOKEN.is_match(t))
                || RE_IDENTIFIER_SHAPE.is_match(&canonical);
        }

        lines.push(LineRecord {
            index,
            text: canonical,
            role: LineRole::Other,
        });
    }

    if !has_financial_token {
        log::warn!("no numeric or identifier tokens found, likely non-financial input");
        return RawDocument {
            lines: Vec::new(),
            currency_tags: Vec::new(),
            likely_non_financial: true,
            statement_date: None,
        };
    }

    RawDocument {
        lines,
        currency_tags,
        likely_non_financial: false,
        statement_date,
    }
}

/// Canonicalize every token of a line that parses as a single locale numeral.
/// Tokens that are not clean single numbers (fused digit runs, text, dates)
/// pass through with only apostrophe grouping stripped; the disambiguator
/// handles them later.
fn canonicalize_line(line: &str) -> String {
    line.split(' ')
        .map(canonicalize_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn canonicalize_token(token: &str) -> String {
    let stripped = strip_apostrophe_grouping(token);

    if RE_COMMA_GROUPS.is_match(&stripped) || RE_US_DECIMAL.is_match(&stripped) {
        return stripped.replace(',', "");
    }
    if RE_GERMAN_DECIMAL.is_match(&stripped) {
        return stripped.replace('.', "").replace(',', ".");
    }
    if RE_DOT_GROUPS.is_match(&stripped) {
        return stripped.replace('.', "");
    }
    if RE_COMMA_DECIMAL.is_match(&stripped) {
        return stripped.replace(',', ".");
    }

    stripped
}

/// Remove apostrophes acting as grouping marks (digit'ddd). Repeats until
/// stable so multi-group runs like `1'234'567` fully collapse.
fn strip_apostrophe_grouping(token: &str) -> String {
    let mut current = token.to_string();
    loop {
        let next = RE_APOSTROPHE_GROUP.replace_all(&current, "$1$2").to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn currency_codes_in(line: &str) -> Vec<String> {
    line.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| CURRENCY_CODES.contains(t))
        .map(String::from)
        .collect()
}

fn capture_statement_date(line: &str) -> Option<NaiveDate> {
    let caps = RE_STATEMENT_DATE.captures(line)?;
    parse_statement_date(&caps[1])
}

/// Parse the DD.MM.YYYY date format the covered statements use.
pub fn parse_statement_date(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let year: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swiss_apostrophe_grouping() {
        assert_eq!(canonicalize_token("200'000"), "200000");
        assert_eq!(canonicalize_token("1'234'567.89"), "1234567.89");
        assert_eq!(canonicalize_token("199'080"), "199080");
    }

    #[test]
    fn test_german_decimal() {
        assert_eq!(canonicalize_token("1.234,56"), "1234.56");
        assert_eq!(canonicalize_token("1234,56"), "1234.56");
        assert_eq!(canonicalize_token("0,01"), "0.01");
    }

    #[test]
    fn test_us_grouping() {
        assert_eq!(canonicalize_token("1,234,567"), "1234567");
        assert_eq!(canonicalize_token("27,270.00"), "27270.00");
        assert_eq!(canonicalize_token("1,234"), "1234");
    }

    #[test]
    fn test_plain_decimal_untouched() {
        assert_eq!(canonicalize_token("99.5400"), "99.5400");
        assert_eq!(canonicalize_token("0.01"), "0.01");
    }

    #[test]
    fn test_fused_run_only_loses_grouping() {
        // Multi-dot runs are left for the disambiguator's templates.
        assert_eq!(
            canonicalize_token("100.200099.6285200'288"),
            "100.200099.6285200288"
        );
    }

    #[test]
    fn test_non_numeric_tokens_untouched() {
        assert_eq!(canonicalize_token("23-23.02.27"), "23-23.02.27");
        assert_eq!(canonicalize_token("XS2530201644"), "XS2530201644");
        assert_eq!(canonicalize_token("NOTES"), "NOTES");
    }

    #[test]
    fn test_normalize_tags_currencies() {
        let doc = normalize("Position CHF 200'000\nTotal USD 1'000");
        assert_eq!(doc.currency_tags, vec![(0, "CHF".to_string()), (1, "USD".to_string())]);
        assert_eq!(doc.lines[0].text, "Position CHF 200000");
    }

    #[test]
    fn test_normalize_statement_date() {
        let doc = normalize("Vermögensausweis per 31.12.2023\nCHF 100");
        assert_eq!(
            doc.statement_date,
            Some(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
        );
    }

    #[test]
    fn test_non_financial_input_flagged() {
        let doc = normalize("Dear customer,\nplease find attached our terms.");
        assert!(doc.likely_non_financial);
        assert!(doc.lines.is_empty());
    }

    #[test]
    fn test_line_endings_unified() {
        let doc = normalize("EUR 100\r\nEUR  200\rEUR 300");
        assert_eq!(doc.lines.len(), 3);
        assert_eq!(doc.lines[1].text, "EUR 200");
    }
}
