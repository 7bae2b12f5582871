//! ISIN detection and validation.
//!
//! An ISIN is 12 characters: 2-letter country prefix, 9 alphanumeric, and a
//! check digit computed per ISO 6166 (digit expansion + Luhn).

use once_cell::sync::Lazy;
use regex::Regex;

static RE_ISIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{2}[A-Z0-9]{9}\d)\b").unwrap());

/// Whether the line contains an identifier-shaped token (valid or not).
pub fn contains_identifier_shape(text: &str) -> bool {
    RE_ISIN.is_match(text)
}

/// All identifier-shaped tokens in a line with their character offsets.
pub fn identifier_shapes(text: &str) -> Vec<(usize, String)> {
    RE_ISIN
        .captures_iter(text)
        .map(|c| {
            let m = c.get(1).unwrap();
            (m.start(), m.as_str().to_string())
        })
        .collect()
}

/// Validate the ISO 6166 check digit.
///
/// Letters expand to two digits (A=10 .. Z=35), then the Luhn checksum over
/// the expanded digit string must be 0.
pub fn validate_checksum(isin: &str) -> bool {
    if isin.len() != 12 || !isin.is_ascii() {
        return false;
    }

    let mut digits = Vec::with_capacity(24);
    for c in isin.chars() {
        if c.is_ascii_digit() {
            digits.push(c as u32 - '0' as u32);
        } else if c.is_ascii_uppercase() {
            let v = c as u32 - 'A' as u32 + 10;
            digits.push(v / 10);
            digits.push(v % 10);
        } else {
            return false;
        }
    }

    let mut sum = 0;
    let mut double = true;
    for &d in digits.iter().rev().skip(1) {
        let mut v = if double { d * 2 } else { d };
        if v > 9 {
            v -= 9;
        }
        sum += v;
        double = !double;
    }

    let check = (10 - sum % 10) % 10;
    check == *digits.last().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_checksums() {
        assert!(validate_checksum("XS2530201644"));
        assert!(validate_checksum("US0378331005"));
        assert!(validate_checksum("DE0005140008"));
        assert!(validate_checksum("CH0038863350"));
        assert!(validate_checksum("LU0950674175"));
    }

    #[test]
    fn test_invalid_checksums() {
        assert!(!validate_checksum("XS2530201645"));
        assert!(!validate_checksum("US0378331006"));
        assert!(!validate_checksum("AAAAAAAAAAAA"));
        assert!(!validate_checksum("short"));
    }

    #[test]
    fn test_identifier_shapes() {
        let shapes = identifier_shapes("ISIN XS2530201644 Valor 121573441");
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].1, "XS2530201644");

        assert!(identifier_shapes("no identifiers here 123").is_empty());
    }
}
