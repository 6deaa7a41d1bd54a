//! Text and due-date normalisation.
//!
//! Due dates reach us in several textual shapes depending on the export batch:
//! ISO dates, slash/dash/dot delimited dates whose day/month order depends on
//! the exporting locale, and short "month day" forms written in English or
//! Arabic. Month names are first rewritten into canonical English
//! abbreviations from a closed table, then one generic parser handles the rest.

use chrono::{Duration, NaiveDate};

const DATE_SEPARATORS: [char; 3] = ['-', '/', '.'];

const YEAR_FIRST_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
// Two-digit years first: `%Y` would read "25" as the year 25.
const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%y", "%d-%m-%Y", "%d.%m.%y", "%d.%m.%Y",
];
const MONTH_FIRST_FORMATS: &[&str] = &[
    "%m/%d/%y", "%m/%d/%Y", "%m-%d-%y", "%m-%d-%Y", "%m.%d.%y", "%m.%d.%Y",
];

const SERIAL_2000_01_01: f64 = 36526.0;
const SERIAL_2100_01_01: f64 = 73051.0;

/// Month tokens recognised in due-date cells, mapped to their month number.
const MONTH_TOKENS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("sept", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Arabic month names substituted with English abbreviations before parsing.
const ARABIC_MONTHS: &[(&str, &str)] = &[
    ("يناير", "jan"),
    ("فبراير", "feb"),
    ("مارس", "mar"),
    ("أبريل", "apr"),
    ("ابريل", "apr"),
    ("مايو", "may"),
    ("يونيو", "jun"),
    ("يوليو", "jul"),
    ("أغسطس", "aug"),
    ("اغسطس", "aug"),
    ("سبتمبر", "sep"),
    ("أكتوبر", "oct"),
    ("اكتوبر", "oct"),
    ("نوفمبر", "nov"),
    ("ديسمبر", "dec"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOptions {
    /// Read `05/10/2025` as 5 October rather than May 10.
    pub day_first: bool,
    /// Year applied to dates written without one.
    pub default_year: i32,
}

/// Trims a display name and collapses internal runs of whitespace to one space.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for cells that carry no value: empty, whitespace, or a lone dash.
pub fn is_blank(raw: &str) -> bool {
    let t = raw.trim();
    t.is_empty() || t == "-"
}

pub fn parse_due_date(raw: &str, opts: &DateOptions) -> Option<NaiveDate> {
    if is_blank(raw) {
        return None;
    }
    let canonical = canonicalize(raw);
    let tokens: Vec<&str> = canonical
        .split_whitespace()
        .filter(|t| !is_time_token(t))
        .collect();

    // "31-oct-2025" carries the month inside a delimited token.
    let parts: Vec<&str> = tokens
        .iter()
        .flat_map(|t| t.split(DATE_SEPARATORS))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.iter().any(|p| month_number(p).is_some()) {
        return parse_month_name_form(&parts, opts);
    }

    let first = tokens.first()?;
    // Drop an attached time of day ("2025-10-05t08:00").
    let date_part = first.split('t').next().unwrap_or(first);
    parse_numeric_form(date_part, opts)
}

/// Days since 1899-12-30, the 1900 spreadsheet date system. Only serials
/// between 2000 and 2099 are accepted, so small scores are never read as dates.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(SERIAL_2000_01_01..SERIAL_2100_01_01).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn canonicalize(raw: &str) -> String {
    let mut text: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            ',' => ' ',
            _ => c,
        })
        .collect();
    for (arabic, english) in ARABIC_MONTHS {
        if text.contains(arabic) {
            text = text.replace(arabic, &format!(" {english} "));
        }
    }
    text.to_lowercase()
}

/// "11:59", "23:59:00", "11:59pm", or a lone "am"/"pm".
fn is_time_token(token: &str) -> bool {
    let bare = token
        .trim_end_matches('.')
        .trim_end_matches("am")
        .trim_end_matches("pm")
        .trim_end_matches("a.m")
        .trim_end_matches("p.m");
    if bare.is_empty() {
        return true;
    }
    bare.contains(':') && bare.chars().all(|c| c.is_ascii_digit() || c == ':')
}

fn month_number(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.');
    MONTH_TOKENS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, n)| *n)
}

fn parse_month_name_form(tokens: &[&str], opts: &DateOptions) -> Option<NaiveDate> {
    let mut month = None;
    let mut numbers = Vec::new();
    for token in tokens {
        if let Some(m) = month_number(token) {
            if month.replace(m).is_some() {
                return None;
            }
        } else {
            let digits = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            numbers.push(digits.parse::<i32>().ok()?);
        }
    }
    let month = month?;
    let (day, year) = match numbers.as_slice() {
        [day] => (*day, opts.default_year),
        [a, b] if *a > 31 => (*b, *a),
        [a, b] => (*a, expand_year(*b)),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, u32::try_from(day).ok()?)
}

fn parse_numeric_form(text: &str, opts: &DateOptions) -> Option<NaiveDate> {
    let leading = text.split(DATE_SEPARATORS).next()?;
    if leading.len() == 4 {
        return parse_with(text, YEAR_FIRST_FORMATS);
    }

    let separator = text.chars().find(|c| DATE_SEPARATORS.contains(c))?;
    let full = match text.matches(separator).count() {
        1 => format!("{text}{separator}{}", opts.default_year),
        2 => text.to_string(),
        _ => return None,
    };
    // The preferred order wins; the other one rescues dates like 13/02 read month-first.
    let (preferred, fallback) = if opts.day_first {
        (DAY_FIRST_FORMATS, MONTH_FIRST_FORMATS)
    } else {
        (MONTH_FIRST_FORMATS, DAY_FIRST_FORMATS)
    };
    parse_with(&full, preferred).or_else(|| parse_with(&full, fallback))
}

fn parse_with(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn expand_year(year: i32) -> i32 {
    if year < 100 {
        2000 + year
    } else {
        year
    }
}
