// Price parsing and normalization
//
// Source sites render prices for display, not for machines: currency symbols,
// narrow spaces and locale-dependent separators all end up in the same string.
// Everything here is pure and never fails; an unrecoverable price becomes
// `f64::INFINITY` so it drops out of the cheapest comparison.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Converts a display price into a comparable number.
///
/// Separator rules, applied to the string after every character other than a
/// digit, `,` or `.` has been removed:
/// - both `,` and `.`: whichever appears later is the decimal separator
/// - only `,`: decimal when it splits the string in exactly two groups,
///   otherwise a thousands separator
/// - only `.`: thousands separator when it splits the string in exactly two
///   groups and the second one has three digits, otherwise a decimal point
pub fn parse_price(raw: Option<&str>) -> f64 {
    let cleaned: String = match raw {
        Some(raw) => raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .collect(),
        None => return f64::INFINITY,
    };
    if cleaned.is_empty() {
        return f64::INFINITY;
    }

    let normalized = match (cleaned.find(','), cleaned.find('.')) {
        (Some(comma), Some(period)) if comma > period => {
            cleaned.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => {
            let groups: Vec<&str> = cleaned.split(',').collect();
            if groups.len() == 2 && groups[1].chars().all(|c| c.is_ascii_digit()) {
                format!("{}.{}", groups[0], groups[1])
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) => {
            let groups: Vec<&str> = cleaned.split('.').collect();
            if groups.len() == 2 && groups[1].len() == 3 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Engine-side price adjustment applied to every extracted price.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PricingPolicy {
    pub discount_factor: f64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            discount_factor: 0.85,
        }
    }
}

impl PricingPolicy {
    // Discount first, round second. Unparseable prices stay infinite.
    pub fn apply(&self, price: f64) -> f64 {
        if price.is_finite() {
            round_to_cents(price * self.discount_factor)
        } else {
            price
        }
    }
}

pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn currency_symbol(raw: &str) -> &'static str {
    if raw.contains('€') {
        "€"
    } else {
        "$"
    }
}

pub fn format_price(symbol: &str, amount: f64) -> String {
    format!("{}{:.2}", symbol, amount)
}

// First run of digits in a free-text tax note, e.g. "+€15 taxes and charges".
pub fn extract_tax_amount(text: Option<&str>) -> f64 {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").ok());
    text.zip(digits.as_ref())
        .and_then(|(text, digits)| digits.find(text))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}
