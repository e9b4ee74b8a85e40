// Utility helpers for tolerant parsing, basic statistics and
// locale-aware formatting.
//
// Everything that touches raw text or a possibly-zero denominator lives
// here so the aggregation and report code can assume clean `f64`s.
use num_format::{Locale, ToFormattedString};

const MONTHS_PT: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];
const MONTHS_EN: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces, text).
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (except an exponent).
/// - Accepts both `1,234.56` and `1.234,56`: when both marks appear the
///   last one is the decimal mark; a single lone comma is a decimal comma;
///   a mark repeated on its own is a thousands separator.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    let normalized = match (s.matches(',').count(), s.matches('.').count()) {
        (0, 0) | (0, 1) => s.to_string(),
        (0, _) => s.replace('.', ""),
        (1, 0) => s.replace(',', "."),
        (_, 0) => s.replace(',', ""),
        _ if s.rfind(',') > s.rfind('.') => s.replace('.', "").replace(',', "."),
        _ => s.replace(',', ""),
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

/// Coerce an amount field. Anything unparseable becomes `0.0`; the flag
/// tells the caller a substitution happened so it can be counted.
pub fn coerce_amount(s: Option<&str>) -> (f64, bool) {
    match parse_f64_safe(s) {
        Some(v) => (v, false),
        None => (0.0, true),
    }
}

/// `num / den`, or `0.0` whenever the result would not be finite.
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let r = num / den;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

pub fn safe_pct(num: f64, den: f64) -> f64 {
    safe_ratio(num, den) * 100.0
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Zero for fewer than two
/// values.
pub fn std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let mean = average(v);
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (v.len() - 1) as f64;
    var.sqrt()
}

/// Resolve a locale name such as `pt`, `pt_BR` or `en-US`. Unknown names
/// fall back to the bare language and finally to `en`.
pub fn resolve_locale(name: &str) -> Locale {
    let normalized = name.trim().replace('_', "-");
    if let Ok(locale) = Locale::from_name(normalized.as_str()) {
        return locale;
    }
    let lang = normalized.split('-').next().unwrap_or("en");
    match Locale::from_name(lang) {
        Ok(locale) => locale,
        Err(_) => {
            log::warn!("Unknown locale '{name}', falling back to 'en'");
            Locale::en
        }
    }
}

/// Abbreviated month label; Portuguese for `pt*` locales, English otherwise.
pub fn month_abbrev(month: u32, locale_name: &str) -> String {
    let table = if locale_name.trim().to_lowercase().starts_with("pt") {
        &MONTHS_PT
    } else {
        &MONTHS_EN
    };
    match month {
        1..=12 => table[(month - 1) as usize].to_string(),
        other => format!("M{other}"),
    }
}

pub fn format_number(n: f64, decimals: usize, locale: &Locale) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - the locale's thousands separator and decimal mark.
    let n = if n.is_finite() { n } else { 0.0 };
    let s = format!("{:.*}", decimals, n.abs());
    // Only keep the minus sign if something non-zero survived rounding.
    let neg = n < 0.0 && s.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(locale),
        Err(_) => group_thousands(int_part, locale.separator()),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push_str(locale.decimal());
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{res}")
    } else {
        res
    }
}

/// Plain groups of three, for digit strings too long for `u128`.
fn group_thousands(digits: &str, separator: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

/// `R$ 1.234,56` style currency string with two decimals.
pub fn format_currency(n: f64, locale: &Locale, symbol: &str) -> String {
    let body = format_number(n, 2, locale);
    if symbol.is_empty() {
        body
    } else {
        format!("{symbol} {body}")
    }
}

/// Percentage with an explicit sign and two decimals, e.g. `+12,50%`.
pub fn format_pct(n: f64, locale: &Locale) -> String {
    let body = format_number(n, 2, locale);
    if body.starts_with('-') {
        format!("{body}%")
    } else {
        format!("+{body}%")
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for integer-like values. This is used
    // for counts in console messages (e.g., `1,800 records written`).
    n.to_formatted_string(&Locale::en)
}
