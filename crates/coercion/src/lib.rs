//! Locale-tolerant field coercion for broker statement cells.
//!
//! Statement exports mix Russian and English number/date formatting, often
//! within one sheet, so everything here is heuristic. Number coercion is
//! total: any input produces a finite value, never an error.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

fn comma_grouped_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d{1,3}(,\d{3}){2,}$").expect("valid regex"))
}

fn dot_grouped_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d{1,3}(\.\d{3}){2,}$").expect("valid regex"))
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?)?")
            .expect("valid regex")
    })
}

fn short_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{2})$").expect("valid regex"))
}

fn isin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").expect("valid regex")
    })
}

// Ranked most specific first; the first hit wins.
fn reg_number_res() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // full: 1-02-65104-D, 4B02-368-01669-A etc.
            Regex::new(r"(?i)\b[0-9][0-9A-ZА-Я]{0,7}[-/][0-9A-ZА-Я/-]*\d[0-9A-ZА-Я/-]*\b")
                .expect("valid regex"),
            // short: 8 digits plus one letter
            Regex::new(r"(?i)\b\d{8}[A-Za-zА-Яа-я]\b").expect("valid regex"),
            // rare: two letters then 7-10 alphanumerics
            Regex::new(r"\b[A-Z]{2}[0-9A-Z]{7,10}\b").expect("valid regex"),
        ]
    })
}

/// Total number coercion. Unparsable or non-finite input yields 0.0.
///
/// Handles non-breaking spaces, Unicode minus variants, dot- and
/// space-grouped thousands, decimal comma and decimal dot:
/// `"1 234,56"` → 1234.56, `"1.234,56"` → 1234.56, `"1,234.56"` → 1234.56,
/// `"−5"` → -5.0, `""`/`"-"` → 0.0.
pub fn to_float_safe(raw: &str) -> f64 {
    let mut s: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            '\u{00A0}' | '\u{202F}' | '\u{2009}' | ' ' | '\t' => None,
            '\u{2212}' | '\u{2012}' | '\u{2013}' => Some('-'),
            _ => Some(c),
        })
        .collect();

    if s.is_empty() || s == "-" || s == "--" {
        return 0.0;
    }

    let has_dot = s.contains('.');
    let has_comma = s.contains(',');

    if has_dot && has_comma {
        // Whichever separator comes last is the decimal one.
        if s.rfind('.') > s.rfind(',') {
            s.retain(|c| c != ',');
        } else {
            s.retain(|c| c != '.');
            s = s.replace(',', ".");
        }
    } else if has_comma {
        if comma_grouped_re().is_match(&s) {
            s.retain(|c| c != ',');
        } else {
            s = s.replace(',', ".");
        }
    } else if has_dot && dot_grouped_re().is_match(&s) {
        s.retain(|c| c != '.');
    }

    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Best-effort date parsing for statement text cells.
///
/// Tries day.month.year with optional time (comma or slash as delimiter
/// variants), two-digit years, and ISO forms. Returns `None` rather than
/// guessing when nothing matches.
pub fn parse_date_flexible(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim().replace(',', ".").replace('/', ".");
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = datetime_re().captures(&s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        let hour: u32 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let minute: u32 = caps.get(5).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let second: u32 = caps.get(6).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        if let Some(dt) =
            NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(hour, minute, second))
        {
            return Some(dt);
        }
    }

    if let Some(caps) = short_year_re().captures(&s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = 2000 + caps[3].parse::<i32>().ok()?;
        if let Some(dt) = NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Some(dt);
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

/// Extracts the first ISIN-shaped token (2 letters, 9 alphanumerics, check
/// digit) from free text, uppercased. Empty string when absent.
pub fn extract_isin(text: &str) -> String {
    isin_re()
        .find(text)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default()
}

/// Like [`extract_isin`], but falls back to the trimmed input when the text
/// is non-empty and contains no ISIN. Used where the source column itself
/// is supposed to be an instrument code.
pub fn extract_isin_or_raw(text: &str) -> String {
    let found = extract_isin(text);
    if !found.is_empty() {
        return found;
    }
    text.trim().to_string()
}

/// First match among the ranked registration-number patterns, most specific
/// first. Empty string when none match.
pub fn extract_reg_number(text: &str) -> String {
    for re in reg_number_res() {
        if let Some(m) = re.find(text) {
            return m.as_str().to_string();
        }
    }
    String::new()
}

/// First whitespace/newline-separated token. Trade-id cells sometimes pack
/// several ids into one cell; only the first one is meaningful.
pub fn extract_first_value(text: &str) -> String {
    text.split_whitespace().next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn float_coercion_is_total() {
        assert_eq!(to_float_safe(""), 0.0);
        assert_eq!(to_float_safe("-"), 0.0);
        assert_eq!(to_float_safe("--"), 0.0);
        assert_eq!(to_float_safe("n/a"), 0.0);
        assert_eq!(to_float_safe("1e999"), 0.0);
    }

    #[test]
    fn float_locale_variants() {
        assert_eq!(to_float_safe("1 234,56"), 1234.56);
        assert_eq!(to_float_safe("1.234,56"), 1234.56);
        assert_eq!(to_float_safe("1,234.56"), 1234.56);
        assert_eq!(to_float_safe("1\u{00A0}234,56"), 1234.56);
        assert_eq!(to_float_safe("1.234.567"), 1234567.0);
        assert_eq!(to_float_safe("123,45"), 123.45);
        assert_eq!(to_float_safe("100"), 100.0);
        assert_eq!(to_float_safe("-10"), -10.0);
    }

    #[test]
    fn float_unicode_minus() {
        assert_eq!(to_float_safe("\u{2212}5"), -5.0);
        assert_eq!(to_float_safe("\u{2013}7,5"), -7.5);
    }

    #[test]
    fn plain_dot_decimal_is_not_grouping() {
        // A single dot group is ambiguous; decimal wins.
        assert_eq!(to_float_safe("1.234"), 1.234);
        assert_eq!(to_float_safe("100.5"), 100.5);
    }

    #[test]
    fn date_day_month_year_variants() {
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        assert_eq!(parse_date_flexible("15.03.2023"), d.and_hms_opt(0, 0, 0));
        assert_eq!(parse_date_flexible("15,03,2023"), d.and_hms_opt(0, 0, 0));
        assert_eq!(parse_date_flexible("15/03/2023"), d.and_hms_opt(0, 0, 0));
        assert_eq!(
            parse_date_flexible("15.10.2021 23:04:40"),
            NaiveDate::from_ymd_opt(2021, 10, 15)
                .unwrap()
                .and_hms_opt(23, 4, 40)
        );
        assert_eq!(
            parse_date_flexible("15.10.2021 23:04"),
            NaiveDate::from_ymd_opt(2021, 10, 15)
                .unwrap()
                .and_hms_opt(23, 4, 0)
        );
        assert_eq!(parse_date_flexible("15.03.23"), d.and_hms_opt(0, 0, 0));
    }

    #[test]
    fn date_iso_variants() {
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        assert_eq!(parse_date_flexible("2023-03-15"), d.and_hms_opt(0, 0, 0));
        assert_eq!(
            parse_date_flexible("2023-03-15T10:30:00"),
            d.and_hms_opt(10, 30, 0)
        );
    }

    #[test]
    fn date_rejects_garbage() {
        assert_eq!(parse_date_flexible(""), None);
        assert_eq!(parse_date_flexible("Итого"), None);
        assert_eq!(parse_date_flexible("32.13.2023"), None);
    }

    #[test]
    fn isin_extraction() {
        assert_eq!(
            extract_isin("Дивиденды по акциям ru0009029540 Сбербанк"),
            "RU0009029540"
        );
        assert_eq!(extract_isin("no identifiers here"), "");
        // Too short to be an ISIN.
        assert_eq!(extract_isin("RU00090295"), "");
    }

    #[test]
    fn isin_or_raw_falls_back() {
        assert_eq!(extract_isin_or_raw(" SBER "), "SBER");
        assert_eq!(extract_isin_or_raw("US0378331005"), "US0378331005");
    }

    #[test]
    fn reg_number_ranked_patterns() {
        // full pattern beats the others
        assert_eq!(extract_reg_number("гос.рег. 1-02-65104-D от 2007"), "1-02-65104-D");
        // short: 8 digits + letter
        assert_eq!(extract_reg_number("выпуск 12345678B"), "12345678B");
        assert_eq!(extract_reg_number("нет номера"), "");
    }

    #[test]
    fn first_value_of_packed_cell() {
        assert_eq!(extract_first_value("14533071091\r\n1280737003"), "14533071091");
        assert_eq!(extract_first_value(""), "");
        assert_eq!(extract_first_value("  one two"), "one");
    }
}
