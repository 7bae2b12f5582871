//! Format template library.
//!
//! Each template is a data record describing how a fused digit run decomposes
//! into semantic sub-values: an anchored pattern whose capture groups map
//! one-to-one onto target fields (None = sub-value present in print but not
//! kept, e.g. an accrued-interest factor or a portfolio weight). Templates are
//! tried in declaration order, most specific first, and the first structural
//! match wins. The declaration order is the priority order.

use crate::models::FieldKind;
use once_cell::sync::Lazy;
use regex::Regex;

pub struct FormatTemplate {
    pub name: &'static str,
    /// Anchored pattern; every capture group is one sub-value.
    pub pattern: &'static str,
    /// Target field per capture group, in order.
    pub fields: &'static [Option<FieldKind>],
}

/// Ordered template library. Bond statements print price (percent of par,
/// four decimals), a secondary factor, and the grouped market value; equity
/// rows fuse price and value, or value and portfolio weight.
pub const TEMPLATES: &[FormatTemplate] = &[
    FormatTemplate {
        name: "price_factor_value",
        pattern: r"^(\d{1,3}\.\d{4})(\d{1,3}\.\d{4})(\d{3,12})$",
        fields: &[Some(FieldKind::Price), None, Some(FieldKind::MarketValue)],
    },
    // The embedded price keeps 2-3 integer digits (percent-of-par prints in
    // the 80-120 band); a wider class would let the greedy quantity group
    // steal digits from it.
    FormatTemplate {
        name: "quantity_price_value",
        pattern: r"^(\d{3,9})(\d{2,3}\.\d{4})(\d{3,12})$",
        fields: &[
            Some(FieldKind::Quantity),
            Some(FieldKind::Price),
            Some(FieldKind::MarketValue),
        ],
    },
    FormatTemplate {
        name: "price_value",
        pattern: r"^(\d{1,3}\.\d{4})(\d{3,12})$",
        fields: &[Some(FieldKind::Price), Some(FieldKind::MarketValue)],
    },
    FormatTemplate {
        name: "value_weight",
        pattern: r"^(\d{4,12}\.\d{2})(\d{1,2}\.\d{2})$",
        fields: &[Some(FieldKind::MarketValue), None],
    },
    FormatTemplate {
        name: "lone_price_four_decimals",
        pattern: r"^(\d{1,3}\.\d{4})$",
        fields: &[Some(FieldKind::Price)],
    },
];

static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|t| Regex::new(t.pattern).expect("valid template pattern"))
        .collect()
});

/// One successful template application.
pub struct TemplateMatch {
    pub template: &'static FormatTemplate,
    /// (field, raw sub-string, parsed value) per kept capture group.
    pub parts: Vec<(FieldKind, String, f64)>,
}

impl TemplateMatch {
    pub fn market_value(&self) -> Option<f64> {
        self.parts
            .iter()
            .find(|(f, _, _)| *f == FieldKind::MarketValue)
            .map(|(_, _, v)| *v)
    }
}

/// All templates structurally matching the run, in priority order.
pub fn matching_templates(run: &str) -> Vec<TemplateMatch> {
    let mut matches = Vec::new();
    for (template, re) in TEMPLATES.iter().zip(COMPILED.iter()) {
        let Some(caps) = re.captures(run) else {
            continue;
        };
        let mut parts = Vec::new();
        let mut ok = true;
        for (group, field) in template.fields.iter().enumerate() {
            let Some(field) = field else {
                continue;
            };
            let raw = caps.get(group + 1).map(|m| m.as_str()).unwrap_or("");
            match raw.parse::<f64>() {
                Ok(value) => parts.push((*field, raw.to_string(), value)),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            matches.push(TemplateMatch { template, parts });
        }
    }
    matches
}
