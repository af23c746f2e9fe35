//! Display formatting for headline metrics.

use crate::models::HeadlineMetrics;

/// Shown wherever a value is undefined (the NaN sentinel).
pub const UNDEFINED: &str = "n/a";

/// Insert `,` every three digits of a non-negative integer string.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `$1,234.56`, `-$12.00`
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return UNDEFINED.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// `1,234`
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

/// `12.34%`
pub fn format_percent(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}%", value)
    } else {
        UNDEFINED.to_string()
    }
}

/// Headline metrics as ordered (name, formatted value) pairs.
pub fn headline_metrics(headline: &HeadlineMetrics) -> Vec<(String, String)> {
    vec![
        ("Total Volume".to_string(), format_currency(headline.total_volume)),
        ("Total Transactions".to_string(), format_count(headline.total_transactions)),
        ("Average Transaction".to_string(), format_currency(headline.average_transaction)),
        ("Total Fees".to_string(), format_currency(headline.total_fees)),
    ]
}
